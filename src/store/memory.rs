//! In-memory `Store` for unit/integration tests, modeled on the teacher's
//! `TestJobManager` (`kernel/jobs/manager.rs`): plain `RwLock<HashMap<...>>`
//! state behind the same trait production code uses, so tests never need a
//! live Postgres instance.

use super::models::*;
use super::Store;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Mirrors the `assigned_robot_requires_assigned_status` CHECK constraint
/// in `migrations/0001_init.sql`: a real Postgres store would reject this
/// write at the DB level, so the in-memory double panics instead of
/// silently accepting a row Postgres never would.
fn assert_robot_assignment_invariant(task: &Task) {
    assert!(
        task.assigned_robot_id.is_none() || task.status == TaskStatus::Assigned,
        "task {} violates assigned_robot_requires_assigned_status: status={:?} assigned_robot_id={:?}",
        task.id,
        task.status,
        task.assigned_robot_id,
    );
}

#[derive(Default)]
pub struct MemoryStore {
    next_task_id: AtomicI64,
    tasks: RwLock<HashMap<i64, Task>>,
    overrides: RwLock<HashMap<i64, i64>>,
    runs: RwLock<HashMap<Uuid, WorkflowRun>>,
    steps: RwLock<HashMap<Uuid, Vec<WorkflowStep>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_task_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    /// Test helper: was this task ever touched? (Mirrors
    /// `TestJobManager::was_scheduled`.)
    pub async fn contains_task(&self, id: i64) -> bool {
        self.tasks.read().await.contains_key(&id)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_task(&self, task: NewTask, now: DateTime<Utc>) -> Result<Task> {
        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let status = if task.release_at.map(|r| r <= now).unwrap_or(true) {
            TaskStatus::Ready
        } else {
            TaskStatus::Pending
        };
        let row = Task {
            id,
            kind: task.kind,
            title: task.title,
            target_kind: task.target_kind,
            target_ref: task.target_ref,
            release_at: task.release_at,
            status,
            assigned_robot_id: None,
            created_at: now,
            updated_at: now,
            notes: task.notes,
        };
        self.tasks.write().await.insert(id, row.clone());
        Ok(row)
    }

    async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        assert_robot_assignment_invariant(task);
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tasks = self.tasks.write().await;
        let mut count = 0u64;
        for task in tasks.values_mut() {
            if task.status == TaskStatus::Pending
                && task.release_at.map(|r| r <= now).unwrap_or(true)
            {
                task.status = TaskStatus::Ready;
                task.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn unassigned_ready_tasks(&self) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == TaskStatus::Ready && t.assigned_robot_id.is_none())
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let tasks = self.tasks.read().await;
        let mut stats = QueueStats::default();
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Ready => stats.ready += 1,
                TaskStatus::Assigned => stats.assigned += 1,
                TaskStatus::Done => stats.done += 1,
                TaskStatus::Canceled => stats.canceled += 1,
            }
        }
        Ok(stats)
    }

    async fn claim_task(&self, task_id: i64, robot_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&task_id) {
            if task.status == TaskStatus::Ready && task.assigned_robot_id.is_none() {
                task.status = TaskStatus::Assigned;
                task.assigned_robot_id = Some(robot_id.to_string());
                task.updated_at = now;
                assert_robot_assignment_invariant(task);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn cancel_task(&self, task_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&task_id) {
            if !task.status.is_terminal() {
                task.status = TaskStatus::Canceled;
                task.assigned_robot_id = None;
                task.updated_at = now;
                assert_robot_assignment_invariant(task);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn unassign_task(&self, task_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&task_id) {
            if task.status == TaskStatus::Assigned {
                task.status = TaskStatus::Ready;
                task.assigned_robot_id = None;
                task.updated_at = now;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn get_override(&self, task_id: i64) -> Result<i64> {
        Ok(self.overrides.read().await.get(&task_id).copied().unwrap_or(0))
    }

    async fn set_override(&self, task_id: i64, value: i64, _now: DateTime<Utc>) -> Result<()> {
        self.overrides.write().await.insert(task_id, value);
        Ok(())
    }

    async fn clear_override(&self, task_id: i64) -> Result<bool> {
        Ok(self.overrides.write().await.remove(&task_id).is_some())
    }

    async fn insert_run_with_steps(
        &self,
        run: NewWorkflowRun,
        steps: Vec<NewWorkflowStep>,
        now: DateTime<Utc>,
    ) -> Result<(WorkflowRun, Vec<WorkflowStep>)> {
        let run_id = Uuid::now_v7();
        let total_steps = steps.len() as i32;
        let persisted_run = WorkflowRun {
            id: run_id,
            task_id: run.task_id,
            robot_id: run.robot_id,
            status: RunStatus::Running,
            current_step_index: 0,
            total_steps,
            current_vendor_task_id: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        let persisted_steps: Vec<WorkflowStep> = steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| WorkflowStep {
                run_id,
                step_index: index as i32,
                kind: step.kind,
                code: step.code,
                payload: step.payload,
                completed_at: None,
                decision: None,
                decision_payload: None,
                label: step.label,
            })
            .collect();

        self.runs.write().await.insert(run_id, persisted_run.clone());
        self.steps.write().await.insert(run_id, persisted_steps.clone());
        Ok((persisted_run, persisted_steps))
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn get_run_for_task(&self, task_id: i64) -> Result<Option<WorkflowRun>> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .find(|r| r.task_id == task_id && r.status == RunStatus::Running)
            .cloned())
    }

    async fn running_runs(&self) -> Result<Vec<WorkflowRun>> {
        let mut runs: Vec<WorkflowRun> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.status == RunStatus::Running)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(runs)
    }

    async fn is_robot_busy(&self, robot_id: &str) -> Result<bool> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .any(|r| r.robot_id == robot_id && r.status == RunStatus::Running))
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<()> {
        self.runs.write().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_steps(&self, run_id: Uuid) -> Result<Vec<WorkflowStep>> {
        Ok(self.steps.read().await.get(&run_id).cloned().unwrap_or_default())
    }

    async fn get_step(&self, run_id: Uuid, step_index: i32) -> Result<Option<WorkflowStep>> {
        Ok(self
            .steps
            .read()
            .await
            .get(&run_id)
            .and_then(|steps| steps.iter().find(|s| s.step_index == step_index).cloned()))
    }

    async fn update_step(&self, step: &WorkflowStep) -> Result<()> {
        let mut all = self.steps.write().await;
        if let Some(steps) = all.get_mut(&step.run_id) {
            if let Some(existing) = steps.iter_mut().find(|s| s.step_index == step.step_index) {
                *existing = step.clone();
            }
        }
        Ok(())
    }
}
