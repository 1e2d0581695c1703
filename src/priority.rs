//! C3 (override get/set/clear) + C4's priority math (spec §4.1), grounded
//! on `original_source/app/priority_manager/service.py` and
//! `app/queue_manager/service.py::base_priority`/`aging_bonus_minutes`.

use crate::error::Result;
use crate::store::{Store, TaskKind};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub fn base_priority(kind: TaskKind) -> i64 {
    match kind {
        TaskKind::Delivery => 100,
        TaskKind::Billing => 80,
        TaskKind::Ordering => 60,
        TaskKind::Navigate => 30,
        TaskKind::Cleanup => 10,
        TaskKind::Charging => 5,
    }
}

/// One point per ten minutes waiting, floored.
pub fn aging_bonus(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let minutes = (now - created_at).num_minutes().max(0) as f64;
    (minutes / 10.0).floor()
}

pub fn effective_priority(kind: TaskKind, override_value: i64, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    base_priority(kind) as f64 + override_value as f64 + aging_bonus(created_at, now)
}

/// C3: per-task priority override lookup/mutation.
pub struct PriorityManager {
    store: Arc<dyn Store>,
}

impl PriorityManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self, task_id: i64) -> Result<i64> {
        self.store.get_override(task_id).await
    }

    pub async fn set(&self, task_id: i64, value: i64, now: DateTime<Utc>) -> Result<()> {
        self.store.set_override(task_id, value, now).await
    }

    pub async fn clear(&self, task_id: i64) -> Result<bool> {
        self.store.clear_override(task_id).await
    }
}
