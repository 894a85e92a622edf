//! Application configuration loaded from TOML.
//!
//! # Responsibility
//! - Parse the optional config file into typed settings with defaults.
//! - Reject settings the scheduler or store cannot honor.
//!
//! # Invariants
//! - Every field has a default, so an empty file is a valid config.

use crate::db::StoreOptions;
use crate::engine::urgency::UrgencyPolicy;
use crate::job::scheduler::{Schedule, SchedulerConfig};
use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted interval schedule: 31 days.
const MAX_INTERVAL_SECS: u64 = 31 * 24 * 60 * 60;

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse config `{}`: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("taskmatrix.sqlite3"),
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files; stderr when absent.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrgencyConfig {
    /// Deadlines within this many hours of now count as urgent.
    pub window_hours: u32,
}

impl Default for UrgencyConfig {
    fn default() -> Self {
        Self { window_hours: 24 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecalcConfig {
    pub schedule: Schedule,
    pub poll_interval_secs: u64,
}

impl Default for RecalcConfig {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            poll_interval_secs: 60,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub urgency: UrgencyConfig,
    pub recalc: RecalcConfig,
}

impl AppConfig {
    /// Loads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.recalc.schedule {
            Schedule::Interval { secs } if secs == 0 || secs > MAX_INTERVAL_SECS => {
                return Err(ConfigError::Invalid(format!(
                    "recalc.schedule interval must be between 1 and {MAX_INTERVAL_SECS} seconds, got {secs}"
                )))
            }
            Schedule::Daily { hour, min } if hour > 23 || min > 59 => {
                return Err(ConfigError::Invalid(format!(
                    "recalc.schedule daily time {hour:02}:{min:02} is out of range"
                )))
            }
            _ => {}
        }
        if self.recalc.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "recalc.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.database.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "database.busy_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.database.busy_timeout_ms),
        }
    }

    pub fn urgency_policy(&self) -> UrgencyPolicy {
        UrgencyPolicy::with_window_hours(self.urgency.window_hours)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            db_path: self.database.path.clone(),
            store: self.store_options(),
            policy: self.urgency_policy(),
            schedule: self.recalc.schedule,
            poll_interval: Duration::from_secs(self.recalc.poll_interval_secs),
        }
    }
}
