//! Error taxonomy for the orchestration core.
//!
//! Mirrors the taxonomy in spec.md §7: transient I/O is retried inside the
//! vendor client and never surfaces here; policy rejections (ineligible
//! robot, raced claim, missing POI) are reported as data in an operation's
//! result type, not as an error; what's left is workflow failure, planning
//! failure, and invariant violations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("vendor call failed: {0}")]
    Vendor(String),

    #[error("workflow planning failed: {0}")]
    PlanningFailed(String),

    #[error("run {run_id} is not in a state that accepts this operation")]
    InvalidRunState { run_id: uuid::Uuid },

    #[error("task {task_id} is not in a state that accepts this operation")]
    InvalidTaskState { task_id: i64 },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
