//! Orchestration core for a small indoor service-robot fleet: a priority
//! queue with aging, an atomic assignment engine, a per-run workflow
//! executor driving an external vendor navigation API, a resilient
//! vendor HTTP client, and a real-time event bus — composed by a single
//! orchestration tick (see `orchestrator::Orchestrator::tick`).
//!
//! The HTTP/WebSocket surface, auth, POI-name mapping, and the robot
//! state poller are external collaborators this crate only consumes
//! through traits (`store::Store`, `robots::RobotStateCache`,
//! `robots::PoiResolver`, `vendor::VendorClient`); they are not
//! implemented here.

pub mod assignment;
pub mod auto_confirm;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod planner;
pub mod priority;
pub mod queue;
pub mod robots;
pub mod service;
pub mod store;
pub mod tick;
pub mod vendor;
pub mod workflow;

pub use error::{OrchestratorError, Result};
pub use orchestrator::Orchestrator;
