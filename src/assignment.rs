//! C9: the assignment engine. `assign_next` (spec §4.6), grounded on
//! `original_source/app/assignment_engine/service.py::assign_next` /
//! `_try_claim_task`.

use crate::clock::Clock;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::planner;
use crate::priority::effective_priority;
use crate::robots::{eligibility, PoiResolver, RobotStateCache};
use crate::store::models::NewWorkflowRun;
use crate::store::Store;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AssignmentOutcome {
    pub assigned: bool,
    pub task_id: Option<i64>,
    pub robot_id: Option<String>,
    pub run_id: Option<Uuid>,
    pub reason: Option<String>,
}

impl AssignmentOutcome {
    fn rejected(reason: impl Into<String>) -> Self {
        Self { assigned: false, task_id: None, robot_id: None, run_id: None, reason: Some(reason.into()) }
    }
}

pub struct AssignmentEngine {
    store: Arc<dyn Store>,
    robot_ids: Vec<String>,
    robot_cache: Arc<dyn RobotStateCache>,
    poi: Arc<dyn PoiResolver>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<dyn Store>,
        robot_ids: Vec<String>,
        robot_cache: Arc<dyn RobotStateCache>,
        poi: Arc<dyn PoiResolver>,
        clock: Arc<dyn Clock>,
        bus: EventBus,
    ) -> Self {
        Self { store, robot_ids, robot_cache, poi, clock, bus }
    }

    pub async fn assign_next(&self, preferred_robot: Option<&str>) -> Result<AssignmentOutcome> {
        if self.robot_ids.is_empty() {
            return Ok(AssignmentOutcome::rejected("no robots"));
        }

        let now = self.clock.now();
        let tasks = self.store.unassigned_ready_tasks().await?;
        if tasks.is_empty() {
            return Ok(AssignmentOutcome::rejected("no ready tasks"));
        }
        let mut ranked = Vec::with_capacity(tasks.len());
        for task in tasks {
            let override_value = self.store.get_override(task.id).await?;
            let priority = effective_priority(task.kind, override_value, task.created_at, now);
            ranked.push((priority, task));
        }
        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.created_at.cmp(&b.1.created_at))
        });
        let Some((_, top_task)) = ranked.into_iter().next() else {
            return Ok(AssignmentOutcome::rejected("no ready tasks"));
        };

        let candidates: Vec<String> = match preferred_robot {
            Some(r) if self.robot_ids.iter().any(|id| id == r) => vec![r.to_string()],
            _ => self.robot_ids.clone(),
        };

        let mut chosen: Option<String> = None;
        let mut last_reason: Option<String> = None;
        for candidate in &candidates {
            if self.store.is_robot_busy(candidate).await? {
                last_reason = Some(format!("{candidate} busy"));
                continue;
            }
            let lookup = self.robot_cache.get(candidate).await;
            let (eligible, reason) = eligibility(&lookup);
            if !eligible {
                last_reason = reason.or_else(|| Some(format!("{candidate} ineligible")));
                continue;
            }
            chosen = Some(candidate.clone());
            break;
        }

        let Some(robot_id) = chosen else {
            let reason = last_reason.unwrap_or_else(|| "no eligible robot".to_string());
            self.bus.publish(Event::AssignmentFailed { reason: reason.clone() }, "assignment", now);
            return Ok(AssignmentOutcome::rejected(reason));
        };

        if !self.store.claim_task(top_task.id, &robot_id, now).await? {
            self.bus.publish(Event::AssignmentFailed { reason: "raced".to_string() }, "assignment", now);
            return Ok(AssignmentOutcome::rejected("raced"));
        }

        let steps = match planner::plan(&top_task, self.poi.as_ref()).await {
            Ok(steps) => steps,
            Err(err) => {
                // Planning failed after the claim succeeded: no run exists
                // to own this task, so the claim is rolled back rather
                // than leaving an ASSIGNED task with nothing executing it.
                let _ = self.store.unassign_task(top_task.id, now).await?;
                let reason = format!("planning failed: {err}");
                self.bus.publish(Event::AssignmentFailed { reason: reason.clone() }, "assignment", now);
                return Ok(AssignmentOutcome::rejected(reason));
            }
        };

        let (run, _steps) = self
            .store
            .insert_run_with_steps(
                NewWorkflowRun::builder().task_id(top_task.id).robot_id(robot_id.clone()).build(),
                steps,
                now,
            )
            .await?;

        self.bus.publish(
            Event::AssignmentMade { task_id: top_task.id, robot_id: robot_id.clone(), run_id: run.id },
            "assignment",
            now,
        );
        self.bus.publish(
            Event::WorkflowStarted { run_id: run.id, task_id: top_task.id, robot_id: robot_id.clone() },
            "assignment",
            now,
        );
        info!(task_id = top_task.id, robot_id = %robot_id, run_id = %run.id, "assignment made");

        Ok(AssignmentOutcome {
            assigned: true,
            task_id: Some(top_task.id),
            robot_id: Some(robot_id),
            run_id: Some(run.id),
            reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::robots::RobotLookup;
    use crate::store::memory::MemoryStore;
    use crate::store::models::{NewTask, Position, TaskKind};
    use async_trait::async_trait;

    struct AlwaysOnline;

    #[async_trait]
    impl RobotStateCache for AlwaysOnline {
        async fn get(&self, _robot_id: &str) -> RobotLookup {
            RobotLookup::Known(crate::store::models::RobotObservation {
                online: Some(true),
                charging: Some(false),
                emergency_stop: Some(false),
                position: None,
                fresh_as_of: None,
            })
        }
    }

    struct FixedPoi;

    #[async_trait]
    impl PoiResolver for FixedPoi {
        async fn resolve(&self, _target_kind: &str, _target_ref: &str) -> Option<Position> {
            Some(Position { area_id: "DINING".into(), x: 1.0, y: 1.0, yaw: 0.0 })
        }
    }

    #[tokio::test]
    async fn assign_next_claims_plans_and_publishes() {
        let store = Arc::new(MemoryStore::new());
        let now = chrono::Utc::now();
        store
            .insert_task(
                NewTask::builder().kind(TaskKind::Ordering).title("t").target_kind("TABLE").target_ref("1").build(),
                now,
            )
            .await
            .unwrap();
        store.promote_due(now).await.unwrap();

        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now));
        let engine = AssignmentEngine::new(
            store.clone(),
            vec!["R1".to_string()],
            Arc::new(AlwaysOnline),
            Arc::new(FixedPoi),
            clock,
            EventBus::new(),
        );

        let outcome = engine.assign_next(None).await.unwrap();
        assert!(outcome.assigned);
        assert_eq!(outcome.robot_id.as_deref(), Some("R1"));
        assert!(outcome.run_id.is_some());
    }

    #[tokio::test]
    async fn no_robots_registered_rejects_immediately() {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(chrono::Utc::now()));
        let engine = AssignmentEngine::new(
            store,
            vec![],
            Arc::new(AlwaysOnline),
            Arc::new(FixedPoi),
            clock,
            EventBus::new(),
        );
        let outcome = engine.assign_next(None).await.unwrap();
        assert!(!outcome.assigned);
        assert_eq!(outcome.reason.as_deref(), Some("no robots"));
    }
}
