//! Planner configuration file.
//!
//! # Responsibility
//! - Load `weekplan.json` (`schema: 1`) with defaults for missing fields.
//! - Resolve the reference timezone used for "today" and "now".
//! - Apply `WEEKPLAN_DB_PATH` / `WEEKPLAN_TIMEZONE` overrides.
//!
//! # Invariants
//! - Files without `schema` or with another schema version are rejected.
//! - `timezone` must be a valid IANA name.

use crate::maintenance::PurgeScope;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u64 = 1;
pub const DEFAULT_TIMEZONE: &str = "Asia/Jakarta";
pub const ENV_DB_PATH: &str = "WEEKPLAN_DB_PATH";
pub const ENV_TIMEZONE: &str = "WEEKPLAN_TIMEZONE";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Json(serde_json::Error),
    MissingSchema,
    UnsupportedSchema(u64),
    InvalidTimezone(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot access `{}`: {source}", path.display()),
            Self::Json(err) => write!(f, "invalid config JSON: {err}"),
            Self::MissingSchema => write!(f, "config is missing `schema`"),
            Self::UnsupportedSchema(version) => write!(
                f,
                "unsupported config schema {version}; expected {CONFIG_SCHEMA_VERSION}"
            ),
            Self::InvalidTimezone(name) => write!(f, "unknown timezone `{name}`"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Planner settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeekplanConfig {
    pub schema: u64,
    /// IANA timezone name used to resolve the user's wall clock.
    pub timezone: String,
    pub db_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub purge_scope: PurgeScope,
}

impl Default for WeekplanConfig {
    fn default() -> Self {
        Self {
            schema: CONFIG_SCHEMA_VERSION,
            timezone: DEFAULT_TIMEZONE.to_string(),
            db_path: None,
            log_level: None,
            log_dir: None,
            purge_scope: PurgeScope::default(),
        }
    }
}

impl WeekplanConfig {
    /// Parses a config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let parsed: Value = serde_json::from_str(raw)?;
        let schema = parsed
            .get("schema")
            .and_then(Value::as_u64)
            .ok_or(ConfigError::MissingSchema)?;
        if schema != CONFIG_SCHEMA_VERSION {
            return Err(ConfigError::UnsupportedSchema(schema));
        }

        let config: Self = serde_json::from_value(parsed)?;
        config.reference_timezone()?;
        Ok(config)
    }

    /// Reads and parses the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Writes the default config to `path` unless a file already exists.
    pub fn ensure_default_file(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        let formatted = serde_json::to_string_pretty(&Self::default())?;
        fs::write(path, format!("{formatted}\n")).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides read through `lookup`; blank values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(db_path) = non_blank(ENV_DB_PATH) {
            self.db_path = Some(PathBuf::from(db_path));
        }
        if let Some(timezone) = non_blank(ENV_TIMEZONE) {
            self.timezone = timezone;
            self.reference_timezone()?;
        }
        Ok(self)
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn reference_timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }
}
