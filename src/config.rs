//! Process configuration, read once at startup.
//!
//! All knobs come from environment variables. The only hard requirement is
//! `REDIS_URL` when eager mode is disabled: a deferred deployment without a
//! broker is a misconfiguration the process must refuse to start under,
//! not something to discover on the first submission.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::dispatch::ExecutionMode;

/// Default hard limit for one deferred task execution.
const DEFAULT_TASK_TIME_LIMIT_SECS: u64 = 660;

/// Configuration failures detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Deferred mode needs a broker connection string.
    #[error("REDIS_URL must be set when TASKS_EAGER is disabled")]
    MissingRedisUrl,

    /// An environment variable held a value of the wrong shape.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue {
        /// The offending environment variable.
        name: &'static str,
        /// Its raw value.
        value: String,
    },
}

/// Runtime configuration for the server and worker processes.
#[derive(Debug, Clone)]
pub struct Config {
    /// Execution mode for submissions.
    pub mode: ExecutionMode,
    /// Broker connection string; `None` only in eager mode.
    pub redis_url: Option<String>,
    /// Hard wall-clock limit for one deferred task execution.
    pub task_time_limit: Duration,
    /// HTTP listen address.
    pub bind_addr: String,
    /// Base URL of the OSRM routing service.
    pub osrm_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Deferred,
            redis_url: None,
            task_time_limit: Duration::from_secs(DEFAULT_TASK_TIME_LIMIT_SECS),
            bind_addr: "127.0.0.1:8000".to_string(),
            osrm_base_url: "https://router.project-osrm.org".to_string(),
        }
    }
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// Recognized variables:
    ///
    /// | Variable | Meaning | Default |
    /// |----------|---------|---------|
    /// | `TASKS_EAGER` | run bodies inline (`1`/`true`/`yes`) | `false` |
    /// | `REDIS_URL` | broker connection string | required unless eager |
    /// | `TASK_TIME_LIMIT_SECS` | deferred execution hard limit | `660` |
    /// | `BIND_ADDR` | HTTP listen address | `127.0.0.1:8000` |
    /// | `OSRM_BASE_URL` | routing service base URL | public OSRM |
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRedisUrl`] in deferred mode without a
    /// broker, or [`ConfigError::InvalidValue`] for malformed values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let eager = match env::var("TASKS_EAGER") {
            Ok(raw) => parse_bool("TASKS_EAGER", &raw)?,
            Err(_) => false,
        };
        let mode = if eager {
            ExecutionMode::Eager
        } else {
            ExecutionMode::Deferred
        };

        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.is_empty());
        if mode == ExecutionMode::Deferred && redis_url.is_none() {
            return Err(ConfigError::MissingRedisUrl);
        }

        let task_time_limit = match env::var("TASK_TIME_LIMIT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    name: "TASK_TIME_LIMIT_SECS",
                    value: raw.clone(),
                })?;
                Duration::from_secs(secs)
            },
            Err(_) => defaults.task_time_limit,
        };

        Ok(Self {
            mode,
            redis_url,
            task_time_limit,
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            osrm_base_url: env::var("OSRM_BASE_URL").unwrap_or(defaults.osrm_base_url),
        })
    }
}

/// Parses the usual truthy/falsy spellings of a boolean flag.
fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_flag_spellings() {
        for truthy in ["1", "true", "TRUE", "yes", "on"] {
            assert!(parse_bool("TASKS_EAGER", truthy).unwrap());
        }
        for falsy in ["0", "false", "no", "off", ""] {
            assert!(!parse_bool("TASKS_EAGER", falsy).unwrap());
        }
        assert!(parse_bool("TASKS_EAGER", "maybe").is_err());
    }

    #[test]
    fn defaults_are_deferred_with_public_osrm() {
        let config = Config::default();
        assert_eq!(config.mode, ExecutionMode::Deferred);
        assert_eq!(config.task_time_limit, Duration::from_secs(660));
        assert_eq!(config.bind_addr, "127.0.0.1:8000");
        assert!(config.osrm_base_url.contains("project-osrm"));
    }
}
