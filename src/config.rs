//! Process configuration, loaded once at startup from the environment.
//!
//! Modeled on the teacher's `Config::from_env()`: `dotenvy` loads a local
//! `.env` if present, then every field is read with `env::var` and an
//! `anyhow::Context` explaining which variable failed, with `unwrap_or_else`
//! defaults matching `original_source/app/common/vendor_resilience.py`'s
//! `_cfg_from_env()` table.

use anyhow::Context;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VendorConfig {
    pub retries: u32,
    pub timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub jitter: bool,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: Duration::from_secs_f64(12.0),
            backoff_base: Duration::from_secs_f64(0.4),
            backoff_max: Duration::from_secs_f64(4.0),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub robot_ids: Vec<String>,
    pub vendor: VendorConfig,
    pub robot_poll_interval: Duration,
    pub auto_tick_enabled: bool,
    pub auto_tick_interval: Duration,
    pub auto_tick_max_assignments: usize,
    pub auto_confirm_enabled: bool,
    pub auto_confirm_interval: Duration,
    pub safe_mode: bool,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => !matches!(raw.as_str(), "0" | "false" | "False" | "FALSE" | ""),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let robot_ids: Vec<String> = env_or("ROBOT_IDS", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let vendor = VendorConfig {
            retries: parse_env("VENDOR_RETRIES", 3u32).context("VENDOR_RETRIES")?,
            timeout: Duration::from_secs_f64(
                parse_env("VENDOR_TIMEOUT_S", 12.0f64).context("VENDOR_TIMEOUT_S")?,
            ),
            backoff_base: Duration::from_secs_f64(
                parse_env("VENDOR_BACKOFF_BASE_S", 0.4f64).context("VENDOR_BACKOFF_BASE_S")?,
            ),
            backoff_max: Duration::from_secs_f64(
                parse_env("VENDOR_BACKOFF_MAX_S", 4.0f64).context("VENDOR_BACKOFF_MAX_S")?,
            ),
            jitter: parse_bool("VENDOR_BACKOFF_JITTER", true),
        };

        let robot_poll_interval = Duration::from_secs_f64(
            parse_env("ROBOT_POLL_INTERVAL_S", 2.0f64).context("ROBOT_POLL_INTERVAL_S")?,
        );

        let auto_tick_enabled = parse_bool("AUTO_TICK_ENABLED", false);
        let auto_tick_interval = Duration::from_secs_f64(
            parse_env("AUTO_TICK_INTERVAL_S", 1.0f64).context("AUTO_TICK_INTERVAL_S")?,
        );
        let auto_tick_max_assignments: usize =
            parse_env("AUTO_TICK_MAX_ASSIGNMENTS", 4usize).context("AUTO_TICK_MAX_ASSIGNMENTS")?;

        let auto_confirm_enabled = parse_bool("AUTO_CONFIRM_ENABLED", false);
        let auto_confirm_interval = Duration::from_secs_f64(
            parse_env("AUTO_CONFIRM_INTERVAL_S", 1.0f64).context("AUTO_CONFIRM_INTERVAL_S")?,
        );

        let safe_mode = parse_bool("SAFE_MODE", false);

        Ok(Self {
            database_url,
            robot_ids,
            vendor,
            robot_poll_interval,
            auto_tick_enabled,
            auto_tick_interval,
            auto_tick_max_assignments,
            auto_confirm_enabled,
            auto_confirm_interval,
            safe_mode,
        })
    }
}
