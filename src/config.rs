use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading configuration. All of them are fatal at
/// startup: the daemon cannot run without a valid whitelist, time window
/// and brute-force threshold.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Configuration for the detection and response daemons.
///
/// Loaded once at startup and treated as immutable for the rest of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source IPs that never produce alerts.
    pub ip_whitelist: HashSet<String>,
    /// Usernames that never produce alerts.
    pub user_whitelist: HashSet<String>,
    /// Daily clock window inside which successful logins are expected.
    pub time_window: TimeWindow,
    /// Sliding-window brute-force threshold.
    pub brute_force_threshold: BruteForceThreshold,
    /// Log file and offset paths.
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// Alert store location.
    #[serde(default)]
    pub store: StoreConfig,
    /// Anomaly scorer artifact and retraining history.
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    /// Ingestion loop tuning.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Response loop tuning.
    #[serde(default)]
    pub response: ResponseConfig,
}

/// Working-hours window as daily clock times ("HH:MM" in the file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BruteForceThreshold {
    /// Failed attempts from one IP that trigger a critical alert.
    pub attempts: u32,
    /// Trailing window the attempts are counted over.
    pub time_span_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub log_path: PathBuf,
    pub offset_path: PathBuf,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            log_path: PathBuf::from("/var/log/secure"),
            offset_path: PathBuf::from("data/secure_offset.txt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            db_path: PathBuf::from("data/alerts.db"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Serialized model artifact written by the offline retraining job.
    /// When absent the daemon runs rule-based detection only.
    pub model_path: Option<PathBuf>,
    /// Event history appended for the retraining job to consume.
    pub history_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub poll_interval_seconds: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            poll_interval_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    pub poll_interval_seconds: u64,
    /// Alerts at or above this severity get their source IP blocked.
    pub critical_severity_threshold: u8,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        ResponseConfig {
            poll_interval_seconds: 10,
            critical_severity_threshold: 9,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. Any failure is fatal.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.brute_force_threshold.attempts == 0 {
            return Err(ConfigError::Invalid(
                "brute_force_threshold.attempts must be at least 1".to_string(),
            ));
        }
        if self.brute_force_threshold.time_span_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "brute_force_threshold.time_span_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde adapter for "HH:MM" clock times.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}
