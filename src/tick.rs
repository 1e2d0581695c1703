//! C11: the orchestration tick — the single composition point (spec
//! §4.8). Lives on `Orchestrator` itself; this module holds the
//! summary type and the pure composition logic so `orchestrator.rs`
//! stays a thin wiring layer.

use crate::assignment::AssignmentEngine;
use crate::events::{Event, EventBus};
use crate::queue::QueueManager;
use crate::workflow::Executor;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TickSummary {
    pub promoted: u64,
    pub assigned: u64,
    pub advanced: u64,
    pub finished: u64,
    pub failed: u64,
}

pub const DEFAULT_MAX_ASSIGNMENTS: usize = 5;

/// `promoted = queue.promote_due(); assigned = assign_next() up to
/// max_assignments times; wf_result = executor.tick_all()` (spec §4.8),
/// sequential and observable in that order (spec §5).
pub async fn run_tick(
    queue: &QueueManager,
    assignment: &AssignmentEngine,
    executor: &Executor,
    bus: &EventBus,
    max_assignments: usize,
    preferred_robot: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<TickSummary> {
    let promoted = queue.promote_due().await?;

    let mut assigned = 0u64;
    for _ in 0..max_assignments {
        let outcome = assignment.assign_next(preferred_robot).await?;
        if !outcome.assigned {
            break;
        }
        assigned += 1;
    }

    let advance = executor.tick_all().await?;

    bus.publish(
        Event::OrchestratorTicked {
            promoted,
            assigned,
            advanced: advance.progressed as u64,
        },
        "tick",
        now,
    );

    let changed = promoted > 0 || assigned > 0 || advance.progressed > 0 || advance.finished > 0 || advance.failed > 0;
    if changed {
        bus.publish(Event::SystemUpdated { reason: None }, "tick", now);
    }

    Ok(TickSummary {
        promoted,
        assigned,
        advanced: advance.progressed as u64,
        finished: advance.finished as u64,
        failed: advance.failed as u64,
    })
}
