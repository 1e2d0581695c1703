//! Entity models for the store (spec §3), `sqlx::FromRow` + `typed-builder`
//! construction in the same shape as the teacher's `kernel/jobs/job.rs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Ordering,
    Delivery,
    Cleanup,
    Billing,
    Navigate,
    Charging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Assigned,
    Done,
    Canceled,
}

impl TaskStatus {
    /// True for the two absorbing states in the DAG (spec §3 invariant ii).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Canceled)
    }
}

#[derive(Debug, Clone, sqlx::FromRow, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Task {
    pub id: i64,
    pub kind: TaskKind,
    pub title: String,
    pub target_kind: String,
    pub target_ref: String,
    #[builder(default, setter(strip_option))]
    pub release_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    #[builder(default, setter(strip_option))]
    pub assigned_robot_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub notes: Option<String>,
}

/// Fields a caller supplies to create a task; `id`/timestamps/status are
/// assigned by the store (mirrors `Job::immediate`/`Job::scheduled` style
/// convenience constructors in the teacher, minus the id since `Task.id`
/// is a `BIGSERIAL` the store assigns on insert).
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewTask {
    pub kind: TaskKind,
    pub title: String,
    pub target_kind: String,
    pub target_ref: String,
    #[builder(default, setter(strip_option))]
    pub release_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriorityOverride {
    pub task_id: i64,
    pub value: i64,
    pub updated_at: DateTime<Utc>,
}

/// Observation of a registered robot, as read from the external state
/// cache (spec §6 "Robot state cache"). The orchestration core never
/// writes this — it is owned by an external poller.
#[derive(Debug, Clone, Default)]
pub struct RobotObservation {
    pub online: Option<bool>,
    pub charging: Option<bool>,
    pub emergency_stop: Option<bool>,
    pub position: Option<Position>,
    pub fresh_as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub area_id: String,
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "run_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Done,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Failed | RunStatus::Canceled)
    }
}

#[derive(Debug, Clone, sqlx::FromRow, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct WorkflowRun {
    pub id: Uuid,
    pub task_id: i64,
    pub robot_id: String,
    pub status: RunStatus,
    #[builder(default = 0)]
    pub current_step_index: i32,
    pub total_steps: i32,
    #[builder(default, setter(strip_option))]
    pub current_vendor_task_id: Option<String>,
    #[builder(default, setter(strip_option))]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "step_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Navigate,
    Wait,
    ManualConfirm,
}

#[derive(Debug, Clone, sqlx::FromRow, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct WorkflowStep {
    pub run_id: Uuid,
    pub step_index: i32,
    pub kind: StepKind,
    pub code: String,
    #[builder(default = serde_json::Value::Null)]
    pub payload: serde_json::Value,
    /// For NAVIGATE/MANUAL_CONFIRM this is the actual completion timestamp.
    /// For WAIT, the first `advance_one` stamps it with the *deadline*
    /// (`now + wait_seconds`) per spec §4.5, reusing the field.
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub decision: Option<String>,
    #[builder(default, setter(strip_option))]
    pub decision_payload: Option<serde_json::Value>,
    #[builder(default, setter(strip_option))]
    pub label: Option<String>,
}

/// A fully-specified step, as produced by the planner (C7) before a run
/// exists to own it (so it has no `run_id` yet).
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewWorkflowStep {
    pub kind: StepKind,
    pub code: String,
    #[builder(default = serde_json::Value::Null)]
    pub payload: serde_json::Value,
    #[builder(default, setter(strip_option))]
    pub label: Option<String>,
}

#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewWorkflowRun {
    pub task_id: i64,
    pub robot_id: String,
}

/// `ready_queue()`'s output item: a task plus the effective priority it
/// was ranked by, so callers/tests can assert on ordering directly.
#[derive(Debug, Clone)]
pub struct RankedTask {
    pub task: Task,
    pub effective_priority: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub ready: i64,
    pub assigned: i64,
    pub done: i64,
    pub canceled: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.ready + self.assigned + self.done + self.canceled
    }
}
