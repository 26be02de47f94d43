/*!
 * Configuration types for Slotline
 *
 * The whole bot is configured from one flat TOML file read once at startup.
 * The resulting [`BotConfig`] is immutable; each component receives its own
 * projection of it by value.
 */

use crate::error::{Result, SlotlineError};
use crate::priority::PriorityConfig;
use serde::{Deserialize, Serialize};
use slotline_core_resilience::{
    BackoffStrategy, CircuitBreakerConfig, HealthThresholds, RetryPolicy,
};
use slotline_sentinel::HealthPolicy;
use slotline_server::ServerConfig;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Keys that must be present (after environment overrides) for the bot to start
pub const REQUIRED_KEYS: &[&str] = &[
    "username",
    "password",
    "rate_limit_per_second",
    "check_interval",
    "max_retries",
    "retry_base_delay",
    "health_check_interval",
    "log_level",
];

/// Environment variables that override keys from the file
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("SLOTLINE_USERNAME", "username"),
    ("SLOTLINE_PASSWORD", "password"),
];

/// Main bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Portal account used for every session
    pub username: String,

    pub password: Secret,

    /// Ceiling on booking requests per second, shared by every attempt
    pub rate_limit_per_second: u32,

    /// Seconds between main-loop booking cycles
    pub check_interval: u64,

    /// Seconds between background slot polls
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,

    /// Deadline for one booking transaction, in seconds
    #[serde(default = "default_booking_timeout")]
    pub booking_timeout: u64,

    /// Attempts per guarded operation
    pub max_retries: u32,

    /// Base backoff delay in seconds
    pub retry_base_delay: u64,

    /// Upper bound on any backoff delay, in seconds
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay: u64,

    /// Deadline for one guarded attempt, in seconds
    #[serde(default = "default_retry_timeout")]
    pub retry_timeout: u64,

    #[serde(default = "default_retry_strategy")]
    pub retry_strategy: BackoffStrategy,

    /// Jitter drawn from `[0, retry_jitter * delay]`
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: f64,

    #[serde(default = "default_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,

    /// Seconds an open breaker waits before admitting a probe
    #[serde(default = "default_reset_timeout")]
    pub circuit_breaker_reset_timeout: u64,

    /// Seconds between health check cycles
    pub health_check_interval: u64,

    /// Deadline for one health probe, in seconds
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout: u64,

    /// Component name to probe URL
    #[serde(default)]
    pub health_endpoints: BTreeMap<String, String>,

    #[serde(default)]
    pub network_check_url: Option<String>,

    #[serde(default = "default_resource_threshold")]
    pub cpu_threshold: f64,

    #[serde(default = "default_resource_threshold")]
    pub memory_threshold: f64,

    #[serde(default = "default_resource_threshold")]
    pub disk_threshold: f64,

    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,

    /// Consecutive failed probes before a component is Critical
    #[serde(default = "default_failure_threshold")]
    pub component_failure_threshold: u32,

    #[serde(default = "default_recovery_max_retries")]
    pub recovery_max_retries: u32,

    #[serde(default = "default_recovery_base_delay")]
    pub recovery_base_delay: u64,

    #[serde(default = "default_health_history_dir")]
    pub health_history_dir: PathBuf,

    /// Ranking strategy name (`angola_to_portugal_standard` or `earliest_first`)
    #[serde(default = "default_priority_strategy")]
    pub priority_strategy: String,

    #[serde(default = "default_prioritization_history_file")]
    pub prioritization_history_file: PathBuf,

    /// Prioritization events older than this are pruned at startup
    #[serde(default = "default_history_retention_days")]
    pub history_retention_days: u32,

    #[serde(default = "default_booking_stats_file")]
    pub booking_stats_file: PathBuf,

    /// JSON list of slots discovered on the portal
    #[serde(default = "default_slot_feed_file")]
    pub slot_feed_file: PathBuf,

    /// JSON list of applicants and their booking status
    #[serde(default = "default_user_data_file")]
    pub user_data_file: PathBuf,

    /// Restart the bot when the health monitor reports a critical warning
    #[serde(default = "default_true")]
    pub restart_on_critical: bool,

    /// Restarts the supervisor allows before giving up
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Seconds in-flight work may take to finish after shutdown is requested
    #[serde(default = "default_graceful_shutdown_timeout")]
    pub graceful_shutdown_timeout: u64,

    #[serde(default = "default_true")]
    pub http_enabled: bool,

    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Log level for diagnostic output
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// A string that never shows up in logs or debug output
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Settings the booking orchestrator needs
#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub username: String,
    pub password: Secret,
    pub rate_limit_per_second: u32,
    pub booking_timeout: Duration,
    pub stats_file: Option<PathBuf>,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: Secret::new(""),
            rate_limit_per_second: default_rate_limit(),
            booking_timeout: Duration::from_secs(default_booking_timeout()),
            stats_file: None,
        }
    }
}

/// Settings for the bot runtime loops
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub check_interval: Duration,
    pub polling_interval: Duration,
    pub graceful_shutdown_timeout: Duration,
    pub restart_on_critical: bool,
    pub max_restarts: u32,
    pub http: Option<ServerConfig>,
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_rate_limit() -> u32 {
    5
}

fn default_polling_interval() -> u64 {
    300
}

fn default_booking_timeout() -> u64 {
    240
}

fn default_retry_max_delay() -> u64 {
    60
}

fn default_retry_timeout() -> u64 {
    300
}

fn default_retry_strategy() -> BackoffStrategy {
    BackoffStrategy::Exponential
}

fn default_retry_jitter() -> f64 {
    0.1
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout() -> u64 {
    30
}

fn default_health_check_timeout() -> u64 {
    30
}

fn default_resource_threshold() -> f64 {
    0.9
}

fn default_error_rate_threshold() -> f64 {
    0.1
}

fn default_recovery_max_retries() -> u32 {
    5
}

fn default_recovery_base_delay() -> u64 {
    5
}

fn default_health_history_dir() -> PathBuf {
    PathBuf::from("data/health_history")
}

fn default_priority_strategy() -> String {
    crate::priority::STANDARD_STRATEGY.to_string()
}

fn default_prioritization_history_file() -> PathBuf {
    PathBuf::from("data/prioritization_history.json")
}

fn default_history_retention_days() -> u32 {
    30
}

fn default_booking_stats_file() -> PathBuf {
    PathBuf::from("data/booking_stats.json")
}

fn default_slot_feed_file() -> PathBuf {
    PathBuf::from("data/slots.json")
}

fn default_user_data_file() -> PathBuf {
    PathBuf::from("data/users.json")
}

fn default_max_restarts() -> u32 {
    5
}

fn default_graceful_shutdown_timeout() -> u64 {
    30
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    5000
}

impl BotConfig {
    /// Load configuration from a TOML file, applying environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| SlotlineError::io(path, e))?;
        Self::from_toml_str(&contents, |name| std::env::var(name).ok())
    }

    /// Parse configuration from TOML text
    ///
    /// `env` resolves the variables listed in [`ENV_OVERRIDES`]; a value it
    /// returns replaces the corresponding key from the file.
    pub fn from_toml_str<E>(contents: &str, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let mut table: toml::Table = contents.parse()?;

        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = env(var) {
                table.insert((*key).to_string(), toml::Value::String(value));
            }
        }

        if let Some(missing) = REQUIRED_KEYS.iter().find(|key| !table.contains_key(**key)) {
            return Err(SlotlineError::Config(format!(
                "Missing required configuration key: {}",
                missing
            )));
        }

        let config: BotConfig = toml::Value::Table(table).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| SlotlineError::Serialization(e.to_string()))?;
        std::fs::write(path, contents).map_err(|e| SlotlineError::io(path, e))
    }

    /// Reject values no component could run with
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(SlotlineError::Config("username must not be empty".into()));
        }
        if self.password.expose().is_empty() {
            return Err(SlotlineError::Config("password must not be empty".into()));
        }
        if self.rate_limit_per_second == 0 {
            return Err(SlotlineError::Config(
                "rate_limit_per_second must be a positive integer".into(),
            ));
        }
        for (key, value) in [
            ("check_interval", self.check_interval),
            ("polling_interval", self.polling_interval),
            ("health_check_interval", self.health_check_interval),
            ("health_check_timeout", self.health_check_timeout),
            ("booking_timeout", self.booking_timeout),
        ] {
            if value == 0 {
                return Err(SlotlineError::Config(format!(
                    "{} must be a positive integer",
                    key
                )));
            }
        }
        if !crate::priority::is_known_strategy(&self.priority_strategy) {
            return Err(SlotlineError::Config(format!(
                "Unknown priority_strategy '{}'",
                self.priority_strategy
            )));
        }

        // a scheduled booking retry runs inside the retry deadline
        if self.booking_timeout >= self.retry_timeout {
            return Err(SlotlineError::Config(format!(
                "booking_timeout ({}s) must be shorter than retry_timeout ({}s)",
                self.booking_timeout, self.retry_timeout
            )));
        }

        self.retry_policy()
            .validate()
            .map_err(|e| SlotlineError::Config(e.to_string()))?;
        self.health_policy().validate().map_err(SlotlineError::Config)?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            timeout: Duration::from_secs(self.retry_timeout),
            strategy: self.retry_strategy,
            base_delay: Duration::from_secs(self.retry_base_delay),
            max_delay: Duration::from_secs(self.retry_max_delay),
            jitter_factor: self.retry_jitter,
        }
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_failure_threshold,
            reset_timeout: Duration::from_secs(self.circuit_breaker_reset_timeout),
        }
    }

    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            check_interval_s: self.health_check_interval,
            probe_timeout_s: self.health_check_timeout,
            endpoints: self.health_endpoints.clone(),
            network_check_url: self.network_check_url.clone(),
            thresholds: HealthThresholds {
                cpu_usage: self.cpu_threshold,
                memory_usage: self.memory_threshold,
                disk_usage: self.disk_threshold,
                error_rate: self.error_rate_threshold,
                component_failure_threshold: self.component_failure_threshold,
            },
            recovery_max_retries: self.recovery_max_retries,
            recovery_base_delay_s: self.recovery_base_delay,
            history_dir: Some(self.health_history_dir.clone()),
        }
    }

    pub fn priority_config(&self) -> PriorityConfig {
        PriorityConfig {
            strategy: self.priority_strategy.clone(),
            history_file: Some(self.prioritization_history_file.clone()),
            retention_days: self.history_retention_days,
        }
    }

    pub fn booking_config(&self) -> BookingConfig {
        BookingConfig {
            username: self.username.clone(),
            password: self.password.clone(),
            rate_limit_per_second: self.rate_limit_per_second,
            booking_timeout: Duration::from_secs(self.booking_timeout),
            stats_file: Some(self.booking_stats_file.clone()),
        }
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            check_interval: Duration::from_secs(self.check_interval),
            polling_interval: Duration::from_secs(self.polling_interval),
            graceful_shutdown_timeout: Duration::from_secs(self.graceful_shutdown_timeout),
            restart_on_critical: self.restart_on_critical,
            max_restarts: self.max_restarts,
            http: self.http_enabled.then(|| ServerConfig {
                host: self.http_host.clone(),
                port: self.http_port,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        username = "agent@example.com"
        password = "hunter2"
        rate_limit_per_second = 5
        check_interval = 300
        max_retries = 5
        retry_base_delay = 5
        health_check_interval = 600
        log_level = "info"
    "#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = BotConfig::from_toml_str(MINIMAL, no_env).unwrap();
        assert_eq!(config.polling_interval, 300);
        assert_eq!(config.retry_max_delay, 60);
        assert_eq!(config.retry_strategy, BackoffStrategy::Exponential);
        assert_eq!(config.circuit_breaker_failure_threshold, 5);
        assert_eq!(config.circuit_breaker_reset_timeout, 30);
        assert_eq!(config.priority_strategy, "angola_to_portugal_standard");
        assert_eq!(
            config.booking_stats_file,
            PathBuf::from("data/booking_stats.json")
        );
        assert!(config.restart_on_critical);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_missing_required_key_is_fatal() {
        let without_interval = MINIMAL.replace("check_interval = 300", "");
        let err = BotConfig::from_toml_str(&without_interval, no_env).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required configuration key: check_interval"
        );
    }

    #[test]
    fn test_env_supplies_credentials() {
        let without_password = MINIMAL.replace("password = \"hunter2\"", "");
        assert!(BotConfig::from_toml_str(&without_password, no_env).is_err());

        let config = BotConfig::from_toml_str(&without_password, |name| {
            (name == "SLOTLINE_PASSWORD").then(|| "from-env".to_string())
        })
        .unwrap();
        assert_eq!(config.password.expose(), "from-env");
        assert_eq!(config.username, "agent@example.com");
    }

    #[test]
    fn test_rejects_zero_rate_limit() {
        let zero = MINIMAL.replace("rate_limit_per_second = 5", "rate_limit_per_second = 0");
        let err = BotConfig::from_toml_str(&zero, no_env).unwrap_err();
        assert!(err.to_string().contains("rate_limit_per_second"));
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        let toml = format!("{}\npriority_strategy = \"random\"", MINIMAL);
        assert!(BotConfig::from_toml_str(&toml, no_env).is_err());

        let toml = format!("{}\nretry_strategy = \"quadratic\"", MINIMAL);
        assert!(BotConfig::from_toml_str(&toml, no_env).is_err());
    }

    #[test]
    fn test_booking_timeout_must_fit_inside_retry_timeout() {
        let config = BotConfig::from_toml_str(MINIMAL, no_env).unwrap();
        assert!(config.booking_timeout < config.retry_timeout);

        let toml = format!("{}\nbooking_timeout = 300\nretry_timeout = 300", MINIMAL);
        let err = BotConfig::from_toml_str(&toml, no_env).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("booking_timeout"));

        let toml = format!("{}\nbooking_timeout = 60\nretry_timeout = 90", MINIMAL);
        assert!(BotConfig::from_toml_str(&toml, no_env).is_ok());
    }

    #[test]
    fn test_projections() {
        let config = BotConfig::from_toml_str(MINIMAL, no_env).unwrap();

        let retry = config.retry_policy();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.base_delay, Duration::from_secs(5));
        assert_eq!(retry.max_delay, Duration::from_secs(60));

        let health = config.health_policy();
        assert_eq!(health.check_interval_s, 600);
        assert_eq!(health.thresholds.error_rate, 0.1);
        assert_eq!(
            health.history_dir,
            Some(PathBuf::from("data/health_history"))
        );

        let runtime = config.runtime_config();
        assert_eq!(runtime.check_interval, Duration::from_secs(300));
        assert_eq!(runtime.http.unwrap().port, 5000);
    }

    #[test]
    fn test_password_is_redacted() {
        let config = BotConfig::from_toml_str(MINIMAL, no_env).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("Secret(***)"));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Info.to_tracing_level(), tracing::Level::INFO);
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("slotline.toml");
        let config = BotConfig::from_toml_str(MINIMAL, no_env).unwrap();

        config.to_file(&path).unwrap();
        let loaded = BotConfig::from_toml_str(
            &std::fs::read_to_string(&path).unwrap(),
            no_env,
        )
        .unwrap();
        assert_eq!(loaded.username, config.username);
        assert_eq!(loaded.password, config.password);
    }
}
