//! C12: the auto-confirm driver — an optional background policy that
//! resolves MANUAL_CONFIRM steps without a human, calling the same
//! `decide` operation an operator would (spec §4.9, §9 "auto-confirm as
//! a client, not a privilege"). Decision table grounded on
//! `original_source/app/auto_confirm/runner.py::_decision_for`; lifecycle
//! grounded on `impl Service for JobWorker` in `kernel/jobs/worker.rs`.

use crate::service::Service;
use crate::store::models::StepKind;
use crate::store::Store;
use crate::workflow::Executor;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Decision table keyed by step `code`. `ORDER_DECISION` and the two
/// CLEANUP dishes-check codes have literal defaults; everything else
/// (including `DELIVERY_*`/`BILLING_*` confirmations) defaults to `CONFIRM`.
pub fn decision_for(code: &str) -> &'static str {
    match code {
        "ORDER_DECISION" => "COMPLETED",
        "CLEANUP_HAS_DISHES" => "YES",
        "CLEANUP_MORE_DISHES" => "NO",
        _ => "CONFIRM",
    }
}

pub struct AutoConfirmDriver {
    store: Arc<dyn Store>,
    executor: Arc<Executor>,
    interval: Duration,
}

impl AutoConfirmDriver {
    pub fn new(store: Arc<dyn Store>, executor: Arc<Executor>, interval: Duration) -> Self {
        Self { store, executor, interval }
    }

    /// One sweep: for every RUNNING run sitting on a MANUAL_CONFIRM step,
    /// apply the default decision. Returns the number of decisions made.
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let runs = self.store.running_runs().await?;
        let mut decided = 0;
        for run in runs {
            let Some(step) = self.store.get_step(run.id, run.current_step_index).await? else {
                continue;
            };
            if step.kind != StepKind::ManualConfirm {
                continue;
            }
            let decision = decision_for(&step.code);
            match self.executor.decide(run.id, decision.to_string(), None).await {
                Ok(_) => {
                    decided += 1;
                    debug!(run_id = %run.id, code = %step.code, decision, "auto-confirmed");
                }
                Err(err) => warn!(run_id = %run.id, error = %err, "auto-confirm decide failed"),
            }
        }
        Ok(decided)
    }
}

#[async_trait]
impl Service for AutoConfirmDriver {
    fn name(&self) -> &'static str {
        "auto-confirm"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(err) = self.sweep().await {
                        warn!(error = %err, "auto-confirm sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_table_matches_spec() {
        assert_eq!(decision_for("ORDER_DECISION"), "COMPLETED");
        assert_eq!(decision_for("CLEANUP_HAS_DISHES"), "YES");
        assert_eq!(decision_for("CLEANUP_MORE_DISHES"), "NO");
        assert_eq!(decision_for("DELIVERY_ARRIVED"), "CONFIRM");
        assert_eq!(decision_for("BILLING_PAID"), "CONFIRM");
        assert_eq!(decision_for("SOMETHING_ELSE"), "CONFIRM");
    }
}
