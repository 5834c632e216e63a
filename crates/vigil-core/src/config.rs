use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

// Hashing bounds: the cost factor is log2 of the Argon2 memory in KiB, so
// MAX_COST caps a single hash at 64 MiB.
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 16;
pub const DEFAULT_COST: u32 = 10;
pub const DEFAULT_MAX_INPUT_BYTES: usize = 4096;

// Scheduler defaults
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000; // check loop cadence
pub const DEFAULT_HORIZON_YEARS: u32 = 5; // bounded recurrence search
pub const DEFAULT_MAX_LISTENERS: usize = 10; // per event kind, 0 = unlimited

/// Top-level config (vigil.toml + VIGIL_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VigilConfig {
    #[serde(default)]
    pub hash: HashConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Hashing engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashConfig {
    /// Cost factor used when callers don't pass one.
    #[serde(default = "default_cost")]
    pub default_cost: u32,
    /// Maximum number of hash/compare computations running at once on the
    /// blocking pool. Defaults to the number of available CPUs.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Inputs longer than this are rejected with `InvalidInput`.
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            default_cost: DEFAULT_COST,
            pool_size: default_pool_size(),
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Check loop period in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// How far ahead recurrence evaluation searches before giving up.
    #[serde(default = "default_horizon_years")]
    pub horizon_years: u32,
    /// Listener count per event kind above which a warning is logged.
    #[serde(default = "default_max_listeners")]
    pub max_listeners: usize,
    /// Jobs registered by `vigil run`.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            horizon_years: DEFAULT_HORIZON_YEARS,
            max_listeners: DEFAULT_MAX_LISTENERS,
            jobs: Vec::new(),
        }
    }
}

/// A job declared in the config file.
///
/// Exactly one of `cron` or `at` should be set; `cron` wins when both are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    /// Cron-like expression, 5 or 6 fields.
    pub cron: Option<String>,
    /// RFC 3339 instant for a one-shot job.
    pub at: Option<String>,
    /// Logged when the job fires.
    #[serde(default)]
    pub message: String,
}

fn default_cost() -> u32 {
    DEFAULT_COST
}
fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_max_input_bytes() -> usize {
    DEFAULT_MAX_INPUT_BYTES
}
fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}
fn default_horizon_years() -> u32 {
    DEFAULT_HORIZON_YEARS
}
fn default_max_listeners() -> usize {
    DEFAULT_MAX_LISTENERS
}

impl VigilConfig {
    /// Load config from a TOML file with VIGIL_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.vigil/vigil.toml
    ///
    /// A missing file is not an error; defaults fill every field.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading config");

        let config: VigilConfig = Figment::from(Serialized::defaults(VigilConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("VIGIL_").split("__"))
            .extract()
            .map_err(|e| crate::error::VigilError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the subsystems cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(MIN_COST..=MAX_COST).contains(&self.hash.default_cost) {
            return Err(crate::error::VigilError::Config(format!(
                "hash.default_cost {} outside {MIN_COST}..={MAX_COST}",
                self.hash.default_cost
            )));
        }
        if self.hash.pool_size == 0 {
            return Err(crate::error::VigilError::Config(
                "hash.pool_size must be at least 1".to_string(),
            ));
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(crate::error::VigilError::Config(
                "scheduler.tick_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.scheduler.horizon_years == 0 {
            return Err(crate::error::VigilError::Config(
                "scheduler.horizon_years must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vigil/vigil.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = VigilConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hash.default_cost, DEFAULT_COST);
        assert_eq!(config.scheduler.horizon_years, DEFAULT_HORIZON_YEARS);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = VigilConfig::load(Some("/nonexistent/vigil.toml")).unwrap();
        assert_eq!(config.scheduler.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
        assert!(config.scheduler.jobs.is_empty());
    }

    #[test]
    fn toml_sections_parse() {
        let toml = r#"
            [hash]
            default_cost = 12
            pool_size = 2

            [scheduler]
            tick_interval_ms = 250

            [[scheduler.jobs]]
            name = "heartbeat"
            cron = "*/5 * * * * *"
            message = "still here"
        "#;
        let config: VigilConfig = Figment::from(Serialized::defaults(VigilConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap();
        assert_eq!(config.hash.default_cost, 12);
        assert_eq!(config.hash.pool_size, 2);
        assert_eq!(config.hash.max_input_bytes, DEFAULT_MAX_INPUT_BYTES);
        assert_eq!(config.scheduler.tick_interval_ms, 250);
        assert_eq!(config.scheduler.jobs.len(), 1);
        assert_eq!(config.scheduler.jobs[0].cron.as_deref(), Some("*/5 * * * * *"));
    }

    #[test]
    fn out_of_range_cost_rejected() {
        let mut config = VigilConfig::default();
        config.hash.default_cost = MAX_COST + 1;
        assert!(config.validate().is_err());
        config.hash.default_cost = MIN_COST - 1;
        assert!(config.validate().is_err());
    }
}
