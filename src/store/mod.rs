//! C2: the persistence store. One async trait, two implementations
//! (`postgres::PgStore` for production, `memory::MemoryStore` for tests),
//! following the teacher's `Record`-trait-plus-impl split in `kernel/jobs`.

pub mod memory;
pub mod models;
pub mod postgres;

pub use models::*;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait Store: Send + Sync {
    // ---- Task CRUD ----
    async fn insert_task(&self, task: NewTask, now: DateTime<Utc>) -> Result<Task>;
    async fn get_task(&self, id: i64) -> Result<Option<Task>>;
    async fn update_task(&self, task: &Task) -> Result<()>;
    async fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>>;

    /// Moves every PENDING task whose `release_at` is absent or `<= now`
    /// to READY. Returns the number of rows promoted. Idempotent.
    async fn promote_due(&self, now: DateTime<Utc>) -> Result<u64>;

    /// READY tasks with no `assigned_robot_id`, unordered — ranking by
    /// effective priority is `queue::QueueManager`'s job (C4), not the
    /// store's.
    async fn unassigned_ready_tasks(&self) -> Result<Vec<Task>>;

    async fn stats(&self) -> Result<QueueStats>;

    /// The sole concurrency barrier (spec §4.6 step 6): conditional
    /// `UPDATE ... WHERE status = READY AND assigned_robot_id IS NULL`.
    /// Returns `true` iff this call won the race.
    async fn claim_task(&self, task_id: i64, robot_id: &str, now: DateTime<Utc>) -> Result<bool>;

    async fn cancel_task(&self, task_id: i64, now: DateTime<Utc>) -> Result<bool>;

    /// ASSIGNED -> READY, clears `assigned_robot_id` (spec §6 "unassign").
    async fn unassign_task(&self, task_id: i64, now: DateTime<Utc>) -> Result<bool>;

    // ---- Priority overrides (C3) ----
    async fn get_override(&self, task_id: i64) -> Result<i64>;
    async fn set_override(&self, task_id: i64, value: i64, now: DateTime<Utc>) -> Result<()>;
    async fn clear_override(&self, task_id: i64) -> Result<bool>;

    // ---- Workflow runs + steps ----
    /// Persists a RUNNING run and its steps in one transaction (spec §4.6
    /// step 7).
    async fn insert_run_with_steps(
        &self,
        run: NewWorkflowRun,
        steps: Vec<NewWorkflowStep>,
        now: DateTime<Utc>,
    ) -> Result<(WorkflowRun, Vec<WorkflowStep>)>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>>;
    async fn get_run_for_task(&self, task_id: i64) -> Result<Option<WorkflowRun>>;

    /// All non-terminal runs, stable order by `id` (spec §4.8).
    async fn running_runs(&self) -> Result<Vec<WorkflowRun>>;

    async fn is_robot_busy(&self, robot_id: &str) -> Result<bool>;
    async fn update_run(&self, run: &WorkflowRun) -> Result<()>;

    async fn get_steps(&self, run_id: Uuid) -> Result<Vec<WorkflowStep>>;
    async fn get_step(&self, run_id: Uuid, step_index: i32) -> Result<Option<WorkflowStep>>;
    async fn update_step(&self, step: &WorkflowStep) -> Result<()>;
}
