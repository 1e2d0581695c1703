//! C4: promotion, ranking, and stats over the store's READY set.
//! Grounded on `original_source/app/queue_manager/service.py` and the
//! teacher's `Job::find_ready_jobs` `ORDER BY` shape.

use crate::clock::Clock;
use crate::error::Result;
use crate::priority::effective_priority;
use crate::store::{QueueStats, RankedTask, Store};
use std::sync::Arc;

pub struct QueueManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl QueueManager {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Moves every due PENDING task to READY. Idempotent.
    pub async fn promote_due(&self) -> Result<u64> {
        self.store.promote_due(self.clock.now()).await
    }

    /// READY, unassigned tasks ordered by `(-effective_priority, created_at asc)`.
    pub async fn ready_queue(&self) -> Result<Vec<RankedTask>> {
        let now = self.clock.now();
        let tasks = self.store.unassigned_ready_tasks().await?;
        let mut ranked = Vec::with_capacity(tasks.len());
        for task in tasks {
            let override_value = self.store.get_override(task.id).await?;
            let effective_priority = effective_priority(task.kind, override_value, task.created_at, now);
            ranked.push(RankedTask { task, effective_priority });
        }

        ranked.sort_by(|a, b| {
            b.effective_priority
                .partial_cmp(&a.effective_priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.task.created_at.cmp(&b.task.created_at))
        });
        Ok(ranked)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::memory::MemoryStore;
    use crate::store::{NewTask, TaskKind};

    #[tokio::test]
    async fn ready_queue_orders_by_priority_then_age() {
        let store = Arc::new(MemoryStore::new());
        let now = chrono::Utc::now();

        let a = store
            .insert_task(
                NewTask::builder()
                    .kind(TaskKind::Cleanup)
                    .title("A")
                    .target_kind("TABLE")
                    .target_ref("1")
                    .build(),
                now - chrono::Duration::minutes(10),
            )
            .await
            .unwrap();
        let b = store
            .insert_task(
                NewTask::builder()
                    .kind(TaskKind::Navigate)
                    .title("B")
                    .target_kind("AREA")
                    .target_ref("DOCK")
                    .build(),
                now,
            )
            .await
            .unwrap();

        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now));
        let manager = QueueManager::new(store.clone(), clock.clone());
        manager.promote_due().await.unwrap();
        let ranked = manager.ready_queue().await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].task.id, b.id);
        assert_eq!(ranked[1].task.id, a.id);
    }
}
