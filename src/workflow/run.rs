//! `WorkflowRun`/`WorkflowStep` guard and transition helpers — the small
//! state-predicate methods the teacher attaches directly to its job model
//! (`Job::is_ready`, `kernel/jobs/job.rs`), kept separate from the
//! FSM-driving loop in `executor.rs`.

use crate::store::models::{RunStatus, WorkflowRun, WorkflowStep};
use chrono::{DateTime, Utc};

impl WorkflowRun {
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    pub fn is_finished(&self) -> bool {
        self.current_step_index >= self.total_steps
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = RunStatus::Failed;
        self.last_error = Some(error.into());
        self.updated_at = now;
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.status = RunStatus::Done;
        self.updated_at = now;
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = RunStatus::Canceled;
        self.updated_at = now;
    }

    pub fn advance_step(&mut self, now: DateTime<Utc>) {
        self.current_step_index += 1;
        self.current_vendor_task_id = None;
        self.updated_at = now;
    }
}

impl WorkflowStep {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::StepKind;
    use serde_json::Value;
    use uuid::Uuid;

    fn sample_run() -> WorkflowRun {
        let now = Utc::now();
        WorkflowRun {
            id: Uuid::now_v7(),
            task_id: 1,
            robot_id: "R1".into(),
            status: RunStatus::Running,
            current_step_index: 0,
            total_steps: 2,
            current_vendor_task_id: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn finished_when_index_reaches_total() {
        let mut run = sample_run();
        assert!(!run.is_finished());
        run.advance_step(Utc::now());
        assert!(!run.is_finished());
        run.advance_step(Utc::now());
        assert!(run.is_finished());
    }

    #[test]
    fn fail_records_last_error_and_status() {
        let mut run = sample_run();
        run.fail("vendor said no", Utc::now());
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.last_error.as_deref(), Some("vendor said no"));
    }

    #[test]
    fn step_builder_defaults_are_incomplete() {
        let step = crate::store::models::WorkflowStep {
            run_id: Uuid::now_v7(),
            step_index: 0,
            kind: StepKind::ManualConfirm,
            code: "ORDER_DECISION".into(),
            payload: Value::Null,
            completed_at: None,
            decision: None,
            decision_payload: None,
            label: None,
        };
        assert!(!step.is_complete());
    }
}
