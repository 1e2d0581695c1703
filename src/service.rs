//! Background-driver lifecycle (spec §4.0/§4.10 ambient supplement),
//! grounded on `impl Service for JobWorker<S>` in `kernel/jobs/worker.rs`:
//! cooperative cancellation via `tokio_util::sync::CancellationToken`,
//! graceful stop bounded by a small timeout.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default graceful-stop budget before an in-flight background driver is
/// abandoned (spec §5: "bounds graceful stop to a small timeout (default 3 s)").
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

#[async_trait]
pub trait Service: Send {
    fn name(&self) -> &'static str;
    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()>;
}

/// Runs a `Service` until `shutdown` fires, then gives it `timeout` to
/// wind down gracefully before abandoning it (spec §5).
pub async fn run_with_shutdown(service: Box<dyn Service>, shutdown: CancellationToken, timeout: Duration) {
    let name = service.name();
    let mut handle = tokio::spawn(service.run(shutdown.clone()));

    tokio::select! {
        result = &mut handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(service = name, error = %err, "background service exited with error"),
                Err(join_err) => warn!(service = name, error = %join_err, "background service panicked"),
            }
        }
        _ = shutdown.cancelled() => {
            warn!(service = name, "shutdown requested; waiting for graceful stop");
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!(service = name, timeout_s = timeout.as_secs_f64(), "graceful stop timed out; abandoning");
                handle.abort();
            }
        }
    }
}
