//! Runtime configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub store: StoreConfig,
    pub search: SearchConfig,
    pub queue: QueueConfig,
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    pub max_connections: usize,
    pub busy_timeout_ms: u64,
    pub checkout_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 8,
            busy_timeout_ms: 5_000,
            checkout_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_radius_meters: f64,
    pub result_limit: usize,
    pub suggestion_limit: usize,
    pub min_suggestion_prefix: usize,
    /// Distinct names pulled from storage before similarity ranking.
    pub suggestion_scan_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_radius_meters: 50_000.0,
            result_limit: 50,
            suggestion_limit: 10,
            min_suggestion_prefix: 2,
            suggestion_scan_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Admit a booking into the doctor's queue when it is confirmed.
    pub auto_admit_on_confirm: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            auto_admit_on_confirm: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub low_stock_threshold: u32,
    pub expiry_window_days: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: 10,
            expiry_window_days: 30,
        }
    }
}

impl CoreConfig {
    /// Build configuration from `MEDORYX_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = CoreConfig::default();

        let store = StoreConfig {
            path: env::var("MEDORYX_DB_PATH").ok().map(PathBuf::from),
            max_connections: env_or("MEDORYX_DB_MAX_CONNECTIONS", defaults.store.max_connections)?,
            busy_timeout_ms: env_or("MEDORYX_DB_BUSY_TIMEOUT_MS", defaults.store.busy_timeout_ms)?,
            checkout_timeout_ms: env_or(
                "MEDORYX_DB_CHECKOUT_TIMEOUT_MS",
                defaults.store.checkout_timeout_ms,
            )?,
        };

        let search = SearchConfig {
            default_radius_meters: env_or(
                "MEDORYX_SEARCH_RADIUS_METERS",
                defaults.search.default_radius_meters,
            )?,
            result_limit: env_or("MEDORYX_SEARCH_RESULT_LIMIT", defaults.search.result_limit)?,
            suggestion_limit: env_or(
                "MEDORYX_SUGGESTION_LIMIT",
                defaults.search.suggestion_limit,
            )?,
            min_suggestion_prefix: env_or(
                "MEDORYX_SUGGESTION_MIN_PREFIX",
                defaults.search.min_suggestion_prefix,
            )?,
            suggestion_scan_limit: defaults.search.suggestion_scan_limit,
        };

        let queue = QueueConfig {
            auto_admit_on_confirm: env_or(
                "MEDORYX_AUTO_ADMIT_ON_CONFIRM",
                defaults.queue.auto_admit_on_confirm,
            )?,
        };

        let alerts = AlertConfig {
            low_stock_threshold: env_or(
                "MEDORYX_LOW_STOCK_THRESHOLD",
                defaults.alerts.low_stock_threshold,
            )?,
            expiry_window_days: env_or(
                "MEDORYX_EXPIRY_WINDOW_DAYS",
                defaults.alerts.expiry_window_days,
            )?,
        };

        let config = CoreConfig {
            store,
            search,
            queue,
            alerts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make operations meaningless.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.store.max_connections > 0,
            "MEDORYX_DB_MAX_CONNECTIONS must be at least 1"
        );
        anyhow::ensure!(
            self.search.default_radius_meters.is_finite() && self.search.default_radius_meters > 0.0,
            "MEDORYX_SEARCH_RADIUS_METERS must be a positive number"
        );
        anyhow::ensure!(
            self.search.result_limit > 0,
            "MEDORYX_SEARCH_RESULT_LIMIT must be at least 1"
        );
        Ok(())
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}
