use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError};

use crate::services::health::HealthPolicy;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 10;
const DEFAULT_OVERSTOCK_REORDER_MULTIPLIER: i32 = 2;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_HISTORY_PAGE_SIZE: u64 = 20;
const DEFAULT_HISTORY_MAX_PAGE_SIZE: u64 = 200;
const DEFAULT_RECENT_ADJUSTMENTS_LIMIT: usize = 5;
const DEFAULT_ALERT_LIMIT: usize = 15;
const DEFAULT_SLOW_MOVING_DAYS: i64 = 90;
const DEFAULT_TURNOVER_WINDOW_DAYS: i64 = 30;

/// Engine configuration with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct EngineConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Threshold applied to variants that carry no threshold of their own
    #[serde(default = "default_low_stock_threshold")]
    #[validate(range(min = 0))]
    pub default_low_stock_threshold: i32,

    /// Absolute on-hand ceiling above which a variant is overstocked
    #[serde(default)]
    #[validate(range(min = 0))]
    pub overstock_ceiling: Option<i32>,

    /// Per-variant ceiling derived as `reorder_point * multiplier`
    #[serde(default = "default_overstock_reorder_multiplier")]
    #[validate(range(min = 1))]
    pub overstock_reorder_multiplier: i32,

    /// Capacity of the domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1, max = 100000))]
    pub event_channel_capacity: usize,

    /// Adjustment history pagination
    #[serde(default = "default_history_page_size")]
    #[validate(range(min = 1))]
    pub history_page_size: u64,
    #[serde(default = "default_history_max_page_size")]
    #[validate(range(min = 1))]
    pub history_max_page_size: u64,

    /// Number of ledger entries surfaced in the inventory overview
    #[serde(default = "default_recent_adjustments_limit")]
    pub recent_adjustments_limit: usize,

    /// Maximum entries per alert bucket
    #[serde(default = "default_alert_limit")]
    #[validate(range(min = 1))]
    pub alert_limit: usize,

    /// Age in days after which an untouched, stocked variant is slow moving
    #[serde(default = "default_slow_moving_days")]
    #[validate(range(min = 1))]
    pub slow_moving_days: i64,

    /// Window in days used for outbound velocity (turnover, days of supply)
    #[serde(default = "default_turnover_window_days")]
    #[validate(range(min = 1))]
    pub turnover_window_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            default_low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            overstock_ceiling: None,
            overstock_reorder_multiplier: DEFAULT_OVERSTOCK_REORDER_MULTIPLIER,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            history_max_page_size: DEFAULT_HISTORY_MAX_PAGE_SIZE,
            recent_adjustments_limit: DEFAULT_RECENT_ADJUSTMENTS_LIMIT,
            alert_limit: DEFAULT_ALERT_LIMIT,
            slow_moving_days: DEFAULT_SLOW_MOVING_DAYS,
            turnover_window_days: DEFAULT_TURNOVER_WINDOW_DAYS,
        }
    }
}

impl EngineConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Health classification policy derived from this configuration.
    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            default_low_stock_threshold: self.default_low_stock_threshold,
            overstock_ceiling: self.overstock_ceiling,
            reorder_multiplier: Some(self.overstock_reorder_multiplier),
        }
    }

    fn validate_additional_constraints(&self) -> Result<(), validator::ValidationErrors> {
        let mut errors = validator::ValidationErrors::new();
        if self.history_page_size > self.history_max_page_size {
            let mut err = ValidationError::new("history_page_size");
            err.message = Some("history_page_size must not exceed history_max_page_size".into());
            errors.add("history_page_size", err);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_low_stock_threshold() -> i32 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

fn default_overstock_reorder_multiplier() -> i32 {
    DEFAULT_OVERSTOCK_REORDER_MULTIPLIER
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_history_page_size() -> u64 {
    DEFAULT_HISTORY_PAGE_SIZE
}

fn default_history_max_page_size() -> u64 {
    DEFAULT_HISTORY_MAX_PAGE_SIZE
}

fn default_recent_adjustments_limit() -> usize {
    DEFAULT_RECENT_ADJUSTMENTS_LIMIT
}

fn default_alert_limit() -> usize {
    DEFAULT_ALERT_LIMIT
}

fn default_slow_moving_days() -> i64 {
    DEFAULT_SLOW_MOVING_DAYS
}

fn default_turnover_window_days() -> i64 {
    DEFAULT_TURNOVER_WINDOW_DAYS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Installs the global tracing subscriber on stderr. `RUST_LOG` takes
/// precedence over the configured level. Calling this more than once is a no-op.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
    };

    if result.is_ok() {
        info!(level = %level, json, "tracing initialized");
    }
}

/// Loads configuration from the following sources (later sources win):
/// 1. `config/default.toml`
/// 2. Environment-specific config (`config/{APP_ENV}.toml`)
/// 3. Environment variables (`APP__*`)
pub fn load_config() -> Result<EngineConfig, AppConfigError> {
    load_config_from(CONFIG_DIR)
}

/// Same as [`load_config`] but reading files from `config_dir`.
pub fn load_config_from(config_dir: &str) -> Result<EngineConfig, AppConfigError> {
    let run_env = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let config = Config::builder()
        .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
        .add_source(File::with_name(&format!("{}/{}", config_dir, run_env)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let engine_config: EngineConfig = config.try_deserialize()?;
    engine_config.validate()?;
    engine_config.validate_additional_constraints()?;

    info!(
        environment = %engine_config.environment,
        default_low_stock_threshold = engine_config.default_low_stock_threshold,
        "configuration loaded"
    );
    Ok(engine_config)
}
