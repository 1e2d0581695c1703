//! `PgStore`: the production `Store` impl, backed by `sqlx::PgPool`.
//! Grounded on `kernel/jobs/job.rs`'s `Job::claim_jobs`/`Record for Job`
//! query shapes — plain `query_as!`-style SQL, transactions via
//! `pool.begin()`/`tx.commit()`, no query builder.

use super::models::*;
use super::Store;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_task(&self, task: NewTask, now: DateTime<Utc>) -> Result<Task> {
        let status = if task.release_at.map(|r| r <= now).unwrap_or(true) {
            TaskStatus::Ready
        } else {
            TaskStatus::Pending
        };
        let row = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (kind, title, target_kind, target_ref, release_at, status, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING id, kind, title, target_kind, target_ref, release_at, status,
                      assigned_robot_id, created_at, updated_at, notes
            "#,
        )
        .bind(task.kind)
        .bind(task.title)
        .bind(task.target_kind)
        .bind(task.target_ref)
        .bind(task.release_at)
        .bind(status)
        .bind(task.notes)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, kind, title, target_kind, target_ref, release_at, status,
                   assigned_robot_id, created_at, updated_at, notes
            FROM tasks WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tasks SET kind=$2, title=$3, target_kind=$4, target_ref=$5, release_at=$6,
                             status=$7, assigned_robot_id=$8, updated_at=$9, notes=$10
            WHERE id=$1
            "#,
        )
        .bind(task.id)
        .bind(task.kind)
        .bind(&task.title)
        .bind(&task.target_kind)
        .bind(&task.target_ref)
        .bind(task.release_at)
        .bind(task.status)
        .bind(&task.assigned_robot_id)
        .bind(task.updated_at)
        .bind(&task.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, kind, title, target_kind, target_ref, release_at, status,
                   assigned_robot_id, created_at, updated_at, notes
            FROM tasks WHERE status = $1
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = 'ready', updated_at = $1
            WHERE status = 'pending' AND (release_at IS NULL OR release_at <= $1)
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn unassigned_ready_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, kind, title, target_kind, target_ref, release_at, status,
                   assigned_robot_id, created_at, updated_at, notes
            FROM tasks WHERE status = 'ready' AND assigned_robot_id IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                count(*) FILTER (WHERE status = 'pending'),
                count(*) FILTER (WHERE status = 'ready'),
                count(*) FILTER (WHERE status = 'assigned'),
                count(*) FILTER (WHERE status = 'done'),
                count(*) FILTER (WHERE status = 'canceled')
            FROM tasks
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(QueueStats {
            pending: row.0,
            ready: row.1,
            assigned: row.2,
            done: row.3,
            canceled: row.4,
        })
    }

    async fn claim_task(&self, task_id: i64, robot_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = 'assigned', assigned_robot_id = $2, updated_at = $3
            WHERE id = $1 AND status = 'ready' AND assigned_robot_id IS NULL
            "#,
        )
        .bind(task_id)
        .bind(robot_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn cancel_task(&self, task_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = 'canceled', assigned_robot_id = NULL, updated_at = $2
            WHERE id = $1 AND status NOT IN ('done', 'canceled')
            "#,
        )
        .bind(task_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn unassign_task(&self, task_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = 'ready', assigned_robot_id = NULL, updated_at = $2
            WHERE id = $1 AND status = 'assigned'
            "#,
        )
        .bind(task_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_override(&self, task_id: i64) -> Result<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT value FROM priority_overrides WHERE task_id = $1")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| v).unwrap_or(0))
    }

    async fn set_override(&self, task_id: i64, value: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO priority_overrides (task_id, value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (task_id) DO UPDATE SET value = $2, updated_at = $3
            "#,
        )
        .bind(task_id)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_override(&self, task_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM priority_overrides WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_run_with_steps(
        &self,
        run: NewWorkflowRun,
        steps: Vec<NewWorkflowStep>,
        now: DateTime<Utc>,
    ) -> Result<(WorkflowRun, Vec<WorkflowStep>)> {
        let mut tx = self.pool.begin().await?;
        let run_id = Uuid::now_v7();
        let total_steps = steps.len() as i32;

        let persisted_run = sqlx::query_as::<_, WorkflowRun>(
            r#"
            INSERT INTO workflow_runs (id, task_id, robot_id, status, current_step_index,
                                       total_steps, current_vendor_task_id, last_error,
                                       created_at, updated_at)
            VALUES ($1, $2, $3, 'running', 0, $4, NULL, NULL, $5, $5)
            RETURNING id, task_id, robot_id, status, current_step_index, total_steps,
                      current_vendor_task_id, last_error, created_at, updated_at
            "#,
        )
        .bind(run_id)
        .bind(run.task_id)
        .bind(&run.robot_id)
        .bind(total_steps)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut persisted_steps = Vec::with_capacity(steps.len());
        for (index, step) in steps.into_iter().enumerate() {
            let persisted = sqlx::query_as::<_, WorkflowStep>(
                r#"
                INSERT INTO workflow_steps (run_id, step_index, kind, code, payload, label)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING run_id, step_index, kind, code, payload, completed_at, decision,
                          decision_payload, label
                "#,
            )
            .bind(run_id)
            .bind(index as i32)
            .bind(step.kind)
            .bind(step.code)
            .bind(step.payload)
            .bind(step.label)
            .fetch_one(&mut *tx)
            .await?;
            persisted_steps.push(persisted);
        }

        tx.commit().await?;
        Ok((persisted_run, persisted_steps))
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>> {
        let row = sqlx::query_as::<_, WorkflowRun>(
            r#"
            SELECT id, task_id, robot_id, status, current_step_index, total_steps,
                   current_vendor_task_id, last_error, created_at, updated_at
            FROM workflow_runs WHERE id = $1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_run_for_task(&self, task_id: i64) -> Result<Option<WorkflowRun>> {
        let row = sqlx::query_as::<_, WorkflowRun>(
            r#"
            SELECT id, task_id, robot_id, status, current_step_index, total_steps,
                   current_vendor_task_id, last_error, created_at, updated_at
            FROM workflow_runs WHERE task_id = $1 AND status = 'running'
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn running_runs(&self) -> Result<Vec<WorkflowRun>> {
        let rows = sqlx::query_as::<_, WorkflowRun>(
            r#"
            SELECT id, task_id, robot_id, status, current_step_index, total_steps,
                   current_vendor_task_id, last_error, created_at, updated_at
            FROM workflow_runs WHERE status = 'running' ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn is_robot_busy(&self, robot_id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM workflow_runs WHERE robot_id = $1 AND status = 'running' LIMIT 1",
        )
        .bind(robot_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workflow_runs SET status=$2, current_step_index=$3, total_steps=$4,
                                     current_vendor_task_id=$5, last_error=$6, updated_at=$7
            WHERE id=$1
            "#,
        )
        .bind(run.id)
        .bind(run.status)
        .bind(run.current_step_index)
        .bind(run.total_steps)
        .bind(&run.current_vendor_task_id)
        .bind(&run.last_error)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_steps(&self, run_id: Uuid) -> Result<Vec<WorkflowStep>> {
        let rows = sqlx::query_as::<_, WorkflowStep>(
            r#"
            SELECT run_id, step_index, kind, code, payload, completed_at, decision,
                   decision_payload, label
            FROM workflow_steps WHERE run_id = $1 ORDER BY step_index
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_step(&self, run_id: Uuid, step_index: i32) -> Result<Option<WorkflowStep>> {
        let row = sqlx::query_as::<_, WorkflowStep>(
            r#"
            SELECT run_id, step_index, kind, code, payload, completed_at, decision,
                   decision_payload, label
            FROM workflow_steps WHERE run_id = $1 AND step_index = $2
            "#,
        )
        .bind(run_id)
        .bind(step_index)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_step(&self, step: &WorkflowStep) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workflow_steps SET completed_at=$3, decision=$4, decision_payload=$5
            WHERE run_id=$1 AND step_index=$2
            "#,
        )
        .bind(step.run_id)
        .bind(step.step_index)
        .bind(step.completed_at)
        .bind(&step.decision)
        .bind(&step.decision_payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
