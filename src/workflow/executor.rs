//! C8: the workflow executor. `advance_one` is the sole progression
//! primitive (spec §4.5); `tick_all` drives every RUNNING run by one
//! sub-step per orchestration tick, bounding each run to at most one
//! vendor call so a single slow call never blocks the others.

use crate::clock::Clock;
use crate::error::{OrchestratorError, Result};
use crate::events::{Event, EventBus};
use crate::store::models::{RunStatus, StepKind, TaskStatus, WorkflowRun, WorkflowStep};
use crate::store::Store;
use crate::vendor::{NavigateSpec, VendorClient, VendorTaskState};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Progressed,
    Waiting,
    Finished,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, Default)]
pub struct AdvanceAllSummary {
    pub runs_considered: usize,
    pub progressed: usize,
    pub finished: usize,
    pub failed: usize,
}

pub struct Executor {
    store: Arc<dyn Store>,
    vendor: Arc<dyn VendorClient>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
}

impl Executor {
    pub fn new(
        store: Arc<dyn Store>,
        vendor: Arc<dyn VendorClient>,
        clock: Arc<dyn Clock>,
        bus: EventBus,
    ) -> Self {
        Self { store, vendor, clock, bus }
    }

    /// Advances every RUNNING run by at most one sub-step, in stable
    /// order by id (spec §4.8).
    pub async fn tick_all(&self) -> Result<AdvanceAllSummary> {
        let runs = self.store.running_runs().await?;
        let mut summary = AdvanceAllSummary { runs_considered: runs.len(), ..Default::default() };
        for mut run in runs {
            match self.advance_one(&mut run).await {
                Ok(AdvanceOutcome::Progressed) => summary.progressed += 1,
                Ok(AdvanceOutcome::Finished) => summary.finished += 1,
                Ok(AdvanceOutcome::Failed) => summary.failed += 1,
                Ok(AdvanceOutcome::Waiting | AdvanceOutcome::Canceled) => {}
                Err(err) => {
                    warn!(run_id = %run.id, error = %err, "advance_one failed; skipping run this tick");
                }
            }
        }
        Ok(summary)
    }

    pub async fn advance_one(&self, run: &mut WorkflowRun) -> Result<AdvanceOutcome> {
        if !run.is_running() {
            return Ok(AdvanceOutcome::Waiting);
        }
        let now = self.clock.now();
        let step = self
            .store
            .get_step(run.id, run.current_step_index)
            .await?
            .ok_or_else(|| {
                OrchestratorError::InvariantViolation(format!(
                    "run {} has no step at index {}",
                    run.id, run.current_step_index
                ))
            })?;

        match step.kind {
            StepKind::Navigate => self.advance_navigate(run, step, now).await,
            StepKind::Wait => self.advance_wait(run, step, now).await,
            StepKind::ManualConfirm => Ok(AdvanceOutcome::Waiting),
        }
    }

    async fn advance_navigate(
        &self,
        run: &mut WorkflowRun,
        step: WorkflowStep,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<AdvanceOutcome> {
        if run.current_vendor_task_id.is_none() {
            let spec = navigate_spec_from_payload(&step.payload);
            return match self.vendor.create(&spec).await {
                Ok(vendor_task_id) => {
                    run.current_vendor_task_id = Some(vendor_task_id);
                    run.updated_at = now;
                    self.store.update_run(run).await?;
                    Ok(AdvanceOutcome::Waiting)
                }
                Err(reason) => {
                    self.fail_run(run, reason, now).await?;
                    Ok(AdvanceOutcome::Failed)
                }
            };
        }

        let vendor_task_id = run.current_vendor_task_id.clone().expect("checked above");
        match self.vendor.state(&vendor_task_id).await {
            Ok(status) => match status.state {
                VendorTaskState::Running => Ok(AdvanceOutcome::Waiting),
                VendorTaskState::Done => self.complete_step(run, step, now).await,
                VendorTaskState::Failed => {
                    let _ = self.vendor.cancel(&vendor_task_id).await;
                    let reason = status.reason.unwrap_or_else(|| "vendor task failed".to_string());
                    self.fail_run(run, reason, now).await?;
                    Ok(AdvanceOutcome::Failed)
                }
            },
            // Transient I/O exhausted inside the resilient client surfaces
            // as waiting to the tick, not as a run failure (spec §7).
            Err(_) => Ok(AdvanceOutcome::Waiting),
        }
    }

    async fn advance_wait(
        &self,
        run: &mut WorkflowRun,
        mut step: WorkflowStep,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<AdvanceOutcome> {
        if step.completed_at.is_none() {
            let wait_seconds = step
                .payload
                .get("wait_seconds")
                .and_then(|v| v.as_f64());
            let Some(wait_seconds) = wait_seconds else {
                // wait_seconds: null means "wait forever until externally
                // unparked" (spec §4.4, CHARGING's final step).
                return Ok(AdvanceOutcome::Waiting);
            };
            step.completed_at = Some(now + chrono::Duration::milliseconds((wait_seconds * 1000.0) as i64));
            self.store.update_step(&step).await?;
            return Ok(AdvanceOutcome::Waiting);
        }

        let deadline = step.completed_at.expect("checked above");
        if now < deadline {
            return Ok(AdvanceOutcome::Waiting);
        }
        self.complete_step(run, step, now).await
    }

    async fn complete_step(
        &self,
        run: &mut WorkflowRun,
        _step: WorkflowStep,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<AdvanceOutcome> {
        run.advance_step(now);
        if run.is_finished() {
            run.finish(now);
            self.store.update_run(run).await?;
            if let Some(mut task) = self.store.get_task(run.task_id).await? {
                task.status = TaskStatus::Done;
                task.assigned_robot_id = None;
                task.updated_at = now;
                self.store.update_task(&task).await?;
            }
            self.bus.publish(
                Event::WorkflowFinished { run_id: run.id, task_id: run.task_id },
                "executor",
                now,
            );
            info!(run_id = %run.id, task_id = run.task_id, "workflow finished");
            Ok(AdvanceOutcome::Finished)
        } else {
            self.store.update_run(run).await?;
            self.bus.publish(
                Event::WorkflowStepAdvanced { run_id: run.id, step_index: run.current_step_index },
                "executor",
                now,
            );
            Ok(AdvanceOutcome::Progressed)
        }
    }

    async fn fail_run(
        &self,
        run: &mut WorkflowRun,
        reason: String,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        run.fail(reason.clone(), now);
        self.store.update_run(run).await?;
        self.bus.publish(
            Event::WorkflowFailed { run_id: run.id, error: reason },
            "executor",
            now,
        );
        warn!(run_id = %run.id, task_id = run.task_id, "workflow failed");
        Ok(())
    }

    /// Writes an operator (or auto-confirm driver) decision for the run's
    /// current MANUAL_CONFIRM step and advances.
    pub async fn decide(
        &self,
        run_id: Uuid,
        decision: String,
        payload: Option<serde_json::Value>,
    ) -> Result<AdvanceOutcome> {
        let mut run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or(OrchestratorError::InvalidRunState { run_id })?;
        if !run.is_running() {
            return Err(OrchestratorError::InvalidRunState { run_id });
        }
        let mut step = self
            .store
            .get_step(run_id, run.current_step_index)
            .await?
            .ok_or_else(|| OrchestratorError::InvariantViolation(format!("run {run_id} missing current step")))?;
        if step.kind != StepKind::ManualConfirm {
            return Err(OrchestratorError::InvalidRunState { run_id });
        }

        let now = self.clock.now();
        step.completed_at = Some(now);
        step.decision = Some(decision);
        step.decision_payload = payload;
        self.store.update_step(&step).await?;

        self.complete_step(&mut run, step, now).await
    }

    /// External `cancel_run(run_id, reason)` (spec §4.5, §6). Best-effort
    /// vendor cancel if a NAVIGATE step is in flight, then CANCELED on
    /// both run and task.
    pub async fn cancel_run(&self, run_id: Uuid, reason: Option<String>) -> Result<bool> {
        let Some(mut run) = self.store.get_run(run_id).await? else {
            return Ok(false);
        };
        if run.status.is_terminal() {
            return Ok(false);
        }
        let now = self.clock.now();
        if let Some(vendor_task_id) = run.current_vendor_task_id.clone() {
            let _ = self.vendor.cancel(&vendor_task_id).await;
        }
        run.cancel(now);
        self.store.update_run(&run).await?;

        if let Some(mut task) = self.store.get_task(run.task_id).await? {
            if !task.status.is_terminal() {
                task.status = TaskStatus::Canceled;
                task.assigned_robot_id = None;
                task.updated_at = now;
                task.notes = reason.or(task.notes);
                self.store.update_task(&task).await?;
            }
        }

        self.bus.publish(Event::WorkflowCanceled { run_id }, "executor", now);
        Ok(true)
    }
}

fn navigate_spec_from_payload(payload: &serde_json::Value) -> NavigateSpec {
    NavigateSpec {
        area_id: payload.get("area_id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        x: payload.get("x").and_then(|v| v.as_f64()).unwrap_or_default(),
        y: payload.get("y").and_then(|v| v.as_f64()).unwrap_or_default(),
        yaw: payload.get("yaw").and_then(|v| v.as_f64()).unwrap_or_default(),
        stop_radius: payload.get("stop_radius").and_then(|v| v.as_f64()).unwrap_or(0.3),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::memory::MemoryStore;
    use crate::store::models::{NewWorkflowRun, NewWorkflowStep};
    use crate::vendor::{CancelOutcome, VendorTaskStatus};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedVendor {
        states: Mutex<Vec<VendorTaskStatus>>,
    }

    #[async_trait]
    impl VendorClient for ScriptedVendor {
        async fn create(&self, _spec: &NavigateSpec) -> std::result::Result<String, String> {
            Ok("vendor-1".to_string())
        }

        async fn state(&self, _vendor_task_id: &str) -> std::result::Result<VendorTaskStatus, String> {
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                Ok(states.remove(0))
            } else {
                Ok(states[0].clone())
            }
        }

        async fn cancel(&self, _vendor_task_id: &str) -> CancelOutcome {
            CancelOutcome { ok: true, note: None }
        }
    }

    async fn seed_navigate_run(store: &MemoryStore, now: chrono::DateTime<chrono::Utc>) -> WorkflowRun {
        let steps = vec![NewWorkflowStep::builder()
            .kind(StepKind::Navigate)
            .code("NAVIGATE")
            .payload(json!({"area_id": "A", "x": 1.0, "y": 1.0, "yaw": 0.0, "stop_radius": 0.3}))
            .build()];
        let (run, _) = store
            .insert_run_with_steps(
                NewWorkflowRun::builder().task_id(1).robot_id("R1").build(),
                steps,
                now,
            )
            .await
            .unwrap();
        run
    }

    #[tokio::test]
    async fn navigate_run_finishes_when_vendor_reports_done() {
        let store = Arc::new(MemoryStore::new());
        let now = chrono::Utc::now();
        store
            .insert_task(
                crate::store::NewTask::builder()
                    .kind(crate::store::TaskKind::Navigate)
                    .title("t")
                    .target_kind("AREA")
                    .target_ref("A")
                    .build(),
                now,
            )
            .await
            .unwrap();
        let mut run = seed_navigate_run(&store, now).await;

        let vendor = Arc::new(ScriptedVendor {
            states: Mutex::new(vec![VendorTaskStatus { state: VendorTaskState::Done, reason: None }]),
        });
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now));
        let executor = Executor::new(store.clone(), vendor, clock, EventBus::new());

        // First advance: create (no vendor_task_id yet) -> Waiting.
        let outcome = executor.advance_one(&mut run).await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Waiting);
        assert!(run.current_vendor_task_id.is_some());

        // Second advance: vendor reports DONE -> Finished (only step).
        let outcome = executor.advance_one(&mut run).await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Finished);
        assert_eq!(run.status, RunStatus::Done);
    }

    #[tokio::test]
    async fn vendor_failed_fails_the_run_and_retains_last_error() {
        let store = Arc::new(MemoryStore::new());
        let now = chrono::Utc::now();
        let mut run = seed_navigate_run(&store, now).await;

        let vendor = Arc::new(ScriptedVendor {
            states: Mutex::new(vec![VendorTaskStatus {
                state: VendorTaskState::Failed,
                reason: Some("stuck".to_string()),
            }]),
        });
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now));
        let executor = Executor::new(store.clone(), vendor, clock, EventBus::new());

        executor.advance_one(&mut run).await.unwrap();
        let outcome = executor.advance_one(&mut run).await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Failed);
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.last_error.as_deref(), Some("stuck"));
    }
}
