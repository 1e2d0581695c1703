//! Process entrypoint: loads config, connects to Postgres, runs
//! migrations, wires the `Orchestrator`, and drives the tick/auto-confirm
//! loop. Grounded on the teacher's `server/main.rs`
//! (`tracing_subscriber` init, `PgPoolOptions`, `sqlx::migrate!`).

use clap::Parser;
use fleet_orchestrator::clock::SystemClock;
use fleet_orchestrator::config::Config;
use fleet_orchestrator::robots::pg::{PgPoiResolver, PgRobotStateCache};
use fleet_orchestrator::service::{run_with_shutdown, DEFAULT_SHUTDOWN_TIMEOUT};
use fleet_orchestrator::store::postgres::PgStore;
use fleet_orchestrator::vendor::{HttpVendorClient, ResilientVendorClient};
use fleet_orchestrator::Orchestrator;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "orchestratord", about = "Fleet orchestration core tick daemon")]
struct Cli {
    /// Run a single tick and exit, instead of the auto-tick/auto-confirm loop.
    #[arg(long)]
    once: bool,

    /// Vendor navigation API base URL.
    #[arg(long, env = "VENDOR_BASE_URL", default_value = "http://localhost:9000")]
    vendor_base_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,fleet_orchestrator=debug,sqlx=warn".into()))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let vendor_inner = HttpVendorClient::new(cli.vendor_base_url);
    let vendor = Arc::new(ResilientVendorClient::new(vendor_inner, config.vendor.clone(), config.safe_mode));
    let robot_cache = Arc::new(PgRobotStateCache::new(pool.clone(), config.robot_ids.clone()));
    let poi = Arc::new(PgPoiResolver::new(pool));
    let clock = Arc::new(SystemClock);

    let orchestrator = Arc::new(Orchestrator::new(
        store,
        vendor,
        config.robot_ids.clone(),
        robot_cache,
        poi,
        clock,
    ));

    if cli.once {
        let summary = orchestrator.tick(Some(config.auto_tick_max_assignments), None).await?;
        info!(?summary, "tick complete");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();

    if config.auto_tick_enabled {
        let orchestrator = orchestrator.clone();
        let interval = config.auto_tick_interval;
        let max_assignments = config.auto_tick_max_assignments;
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        match orchestrator.tick(Some(max_assignments), None).await {
                            Ok(summary) => info!(?summary, "auto-tick"),
                            Err(err) => tracing::warn!(error = %err, "auto-tick failed"),
                        }
                    }
                }
            }
        }));
    }

    if config.auto_confirm_enabled {
        use fleet_orchestrator::auto_confirm::AutoConfirmDriver;
        let driver = Box::new(AutoConfirmDriver::new(
            orchestrator.store(),
            orchestrator.executor(),
            config.auto_confirm_interval,
        ));
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            run_with_shutdown(driver, shutdown, DEFAULT_SHUTDOWN_TIMEOUT).await;
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
