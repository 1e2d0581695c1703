//! C10: the event bus (spec §4.7). Grounded on `kernel/stream_hub.rs`'s
//! `tokio::sync::broadcast`-backed `StreamHub`, collapsed to one
//! process-wide channel since spec.md's taxonomy is process-scoped rather
//! than per-entity-scoped like the teacher's topic-keyed hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TaskCreated { task_id: i64 },
    TaskUpdated { task_id: i64 },
    TaskCanceled { task_id: i64 },
    QueueTicked { promoted: u64 },
    QueueUpdated,
    AssignmentMade { task_id: i64, robot_id: String, run_id: Uuid },
    AssignmentFailed { reason: String },
    AssignmentUnassigned { task_id: i64 },
    WorkflowStarted { run_id: Uuid, task_id: i64, robot_id: String },
    WorkflowStepAdvanced { run_id: Uuid, step_index: i32 },
    WorkflowFinished { run_id: Uuid, task_id: i64 },
    WorkflowFailed { run_id: Uuid, error: String },
    WorkflowCanceled { run_id: Uuid },
    PoiCacheUpdated,
    PoiCacheError { message: String },
    SystemUpdated { reason: Option<String> },
    SystemReset,
    OrchestratorTicked { promoted: u64, assigned: u64, advanced: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: Event,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// Default channel capacity: generous enough that a slow sink doesn't lag
/// under normal tick cadence, but bounded (spec §4.7: "no persistence, no
/// replay" — a sink that falls this far behind is reaped, not caught up).
const DEFAULT_CAPACITY: usize = 1024;

/// In-process publish/subscribe over one implicit topic, "all orchestrator
/// events". `publish` is a plain (non-async) call: `broadcast::Sender::send`
/// never awaits, so it already serves both flavors spec §4.7 describes
/// ("blocking inside async contexts, fire-and-forget inside synchronous
/// ones") — there is nothing further to block on.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Fans out to every live subscriber. A send with zero receivers, or
    /// one whose receivers have all lagged/closed, is a silent no-op —
    /// the broadcast channel itself reaps dead sinks on the next attempt.
    pub fn publish(&self, event: Event, source: &str, timestamp: DateTime<Utc>) {
        let _ = self.tx.send(EventEnvelope {
            event,
            source: source.to_string(),
            timestamp,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
