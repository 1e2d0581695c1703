//! `Orchestrator`: the facade wiring C1–C12 together, grounded on the
//! teacher's `ServerKernel` dependency-injection struct
//! (`kernel/server_kernel.rs`) — a plain struct of `Arc<dyn Trait>`
//! collaborators plus the concrete services built on top of them.

use crate::assignment::{AssignmentEngine, AssignmentOutcome};
use crate::clock::Clock;
use crate::events::{Event, EventBus, EventEnvelope};
use crate::priority::PriorityManager;
use crate::queue::QueueManager;
use crate::robots::{PoiResolver, RobotStateCache};
use crate::store::models::{QueueStats, RankedTask};
use crate::store::Store;
use crate::tick::{run_tick, TickSummary, DEFAULT_MAX_ASSIGNMENTS};
use crate::vendor::VendorClient;
use crate::workflow::{AdvanceOutcome, Executor};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct Orchestrator {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    queue: QueueManager,
    priority: PriorityManager,
    assignment: AssignmentEngine,
    executor: Arc<Executor>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        vendor: Arc<dyn VendorClient>,
        robot_ids: Vec<String>,
        robot_cache: Arc<dyn RobotStateCache>,
        poi: Arc<dyn PoiResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let bus = EventBus::new();
        let queue = QueueManager::new(store.clone(), clock.clone());
        let priority = PriorityManager::new(store.clone());
        let assignment = AssignmentEngine::new(
            store.clone(),
            robot_ids,
            robot_cache,
            poi,
            clock.clone(),
            bus.clone(),
        );
        let executor = Arc::new(Executor::new(store.clone(), vendor, clock.clone(), bus.clone()));
        Self { store, clock, bus, queue, priority, assignment, executor }
    }

    pub fn executor(&self) -> Arc<Executor> {
        self.executor.clone()
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub async fn tick(&self, max_assignments: Option<usize>, preferred_robot: Option<&str>) -> anyhow::Result<TickSummary> {
        run_tick(
            &self.queue,
            &self.assignment,
            &self.executor,
            &self.bus,
            max_assignments.unwrap_or(DEFAULT_MAX_ASSIGNMENTS),
            preferred_robot,
            self.clock.now(),
        )
        .await
    }

    pub async fn assign_next(&self, preferred_robot: Option<&str>) -> anyhow::Result<AssignmentOutcome> {
        Ok(self.assignment.assign_next(preferred_robot).await?)
    }

    pub async fn cancel_run(&self, run_id: Uuid, reason: Option<String>) -> anyhow::Result<bool> {
        Ok(self.executor.cancel_run(run_id, reason).await?)
    }

    pub async fn decide(
        &self,
        run_id: Uuid,
        decision: String,
        payload: Option<serde_json::Value>,
    ) -> anyhow::Result<AdvanceOutcome> {
        Ok(self.executor.decide(run_id, decision, payload).await?)
    }

    pub async fn cancel_task(&self, task_id: i64, reason: Option<String>) -> anyhow::Result<bool> {
        let now = self.clock.now();
        let ok = self.store.cancel_task(task_id, now).await?;
        if ok {
            self.bus.publish(Event::TaskCanceled { task_id }, "orchestrator", now);
            if reason.is_some() {
                if let Some(mut task) = self.store.get_task(task_id).await? {
                    task.notes = reason;
                    self.store.update_task(&task).await?;
                }
            }
        }
        Ok(ok)
    }

    pub async fn unassign(&self, task_id: i64, reason: Option<String>) -> anyhow::Result<bool> {
        let now = self.clock.now();
        let ok = self.store.unassign_task(task_id, now).await?;
        if ok {
            self.bus.publish(Event::AssignmentUnassigned { task_id }, "orchestrator", now);
            if reason.is_some() {
                if let Some(mut task) = self.store.get_task(task_id).await? {
                    task.notes = reason;
                    self.store.update_task(&task).await?;
                }
            }
        }
        Ok(ok)
    }

    pub async fn ready_queue(&self) -> anyhow::Result<Vec<RankedTask>> {
        Ok(self.queue.ready_queue().await?)
    }

    pub async fn stats(&self) -> anyhow::Result<QueueStats> {
        Ok(self.queue.stats().await?)
    }

    pub async fn set_priority_override(&self, task_id: i64, value: i64) -> anyhow::Result<()> {
        Ok(self.priority.set(task_id, value, self.clock.now()).await?)
    }

    pub async fn clear_priority_override(&self, task_id: i64) -> anyhow::Result<bool> {
        Ok(self.priority.clear(task_id).await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.bus.subscribe()
    }
}
