//! Runtime configuration read from `RECYCLING_*` environment variables.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::observability::LogFormat;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// A configuration variable was present but unusable.
#[error("{name}: {message}")]
pub struct ConfigError {
    /// Variable name.
    pub name: &'static str,
    /// What was wrong with it.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Delivery settings for the message broker.
pub struct BrokerConfig {
    /// Messages buffered per subscription before publishers wait.
    pub queue_capacity: usize,
    /// How many times a retryable failure is redelivered.
    pub max_redeliveries: u32,
    /// Pause before each redelivery.
    pub redelivery_delay: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_redeliveries: 5,
            redelivery_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Settings shared by both services and the front end.
pub struct RecyclingConfig {
    /// Log output format.
    pub log_format: LogFormat,
    /// Log destination; stderr when unset.
    pub log_file: Option<PathBuf>,
    /// Directory for durable state snapshots; in-memory state when unset.
    pub data_dir: Option<PathBuf>,
    /// Fixture file loaded into empty services at start-up.
    pub seed_path: Option<PathBuf>,
    /// Optimistic commit attempts per request.
    pub commit_attempts: u32,
    /// Broker delivery settings.
    pub broker: BrokerConfig,
}

impl Default for RecyclingConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_file: None,
            data_dir: None,
            seed_path: None,
            commit_attempts: 5,
            broker: BrokerConfig::default(),
        }
    }
}

impl RecyclingConfig {
    /// Load configuration from the environment on top of the defaults.
    ///
    /// Supported variables:
    /// - `RECYCLING_LOG_FORMAT` (`pretty` or `json`)
    /// - `RECYCLING_LOG_FILE`
    /// - `RECYCLING_DATA_DIR`
    /// - `RECYCLING_SEED_PATH`
    /// - `RECYCLING_COMMIT_ATTEMPTS` (at least 1)
    /// - `RECYCLING_QUEUE_CAPACITY` (at least 1)
    /// - `RECYCLING_MAX_REDELIVERIES`
    /// - `RECYCLING_REDELIVERY_DELAY_MS`
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`RecyclingConfig::from_env`] with an injectable lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a variable is set but cannot be parsed.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name).and_then(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            })
        };

        let mut config = Self::default();

        if let Some(format) = var("RECYCLING_LOG_FORMAT") {
            config.log_format = match format.to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                other => {
                    return Err(ConfigError {
                        name: "RECYCLING_LOG_FORMAT",
                        message: format!("expected pretty or json, got {other:?}"),
                    });
                }
            };
        }
        config.log_file = var("RECYCLING_LOG_FILE").map(PathBuf::from);
        config.data_dir = var("RECYCLING_DATA_DIR").map(PathBuf::from);
        config.seed_path = var("RECYCLING_SEED_PATH").map(PathBuf::from);

        if let Some(attempts) = parse::<u32>("RECYCLING_COMMIT_ATTEMPTS", var("RECYCLING_COMMIT_ATTEMPTS"))? {
            config.commit_attempts = at_least_one("RECYCLING_COMMIT_ATTEMPTS", attempts)?;
        }
        if let Some(capacity) = parse::<usize>("RECYCLING_QUEUE_CAPACITY", var("RECYCLING_QUEUE_CAPACITY"))? {
            config.broker.queue_capacity = at_least_one("RECYCLING_QUEUE_CAPACITY", capacity)?;
        }
        if let Some(redeliveries) = parse::<u32>("RECYCLING_MAX_REDELIVERIES", var("RECYCLING_MAX_REDELIVERIES"))? {
            config.broker.max_redeliveries = redeliveries;
        }
        if let Some(delay) = parse::<u64>("RECYCLING_REDELIVERY_DELAY_MS", var("RECYCLING_REDELIVERY_DELAY_MS"))? {
            config.broker.redelivery_delay = Duration::from_millis(delay);
        }

        Ok(config)
    }
}

fn parse<T>(name: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .map(|raw| {
            raw.parse::<T>().map_err(|err| ConfigError {
                name,
                message: format!("cannot parse {raw:?}: {err}"),
            })
        })
        .transpose()
}

fn at_least_one<T>(name: &'static str, value: T) -> Result<T, ConfigError>
where
    T: PartialOrd + From<u8>,
{
    if value < T::from(1) {
        return Err(ConfigError {
            name,
            message: "must be at least 1".to_owned(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<RecyclingConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        RecyclingConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(config_from(&[]).unwrap(), RecyclingConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = config_from(&[
            ("RECYCLING_LOG_FORMAT", "JSON"),
            ("RECYCLING_LOG_FILE", "/tmp/recycling.log"),
            ("RECYCLING_DATA_DIR", "/var/lib/recycling"),
            ("RECYCLING_SEED_PATH", "seed.json"),
            ("RECYCLING_COMMIT_ATTEMPTS", "9"),
            ("RECYCLING_QUEUE_CAPACITY", "16"),
            ("RECYCLING_MAX_REDELIVERIES", "0"),
            ("RECYCLING_REDELIVERY_DELAY_MS", "50"),
        ])
        .unwrap();

        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/recycling.log")));
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/recycling")));
        assert_eq!(config.seed_path, Some(PathBuf::from("seed.json")));
        assert_eq!(config.commit_attempts, 9);
        assert_eq!(config.broker.queue_capacity, 16);
        assert_eq!(config.broker.max_redeliveries, 0);
        assert_eq!(config.broker.redelivery_delay, Duration::from_millis(50));
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = config_from(&[("RECYCLING_DATA_DIR", "   ")]).unwrap();
        assert_eq!(config.data_dir, None);
    }

    #[test]
    fn rejects_unparseable_values() {
        let err = config_from(&[("RECYCLING_QUEUE_CAPACITY", "lots")]).unwrap_err();
        assert_eq!(err.name, "RECYCLING_QUEUE_CAPACITY");

        let err = config_from(&[("RECYCLING_COMMIT_ATTEMPTS", "0")]).unwrap_err();
        assert_eq!(err.message, "must be at least 1");

        assert!(config_from(&[("RECYCLING_LOG_FORMAT", "xml")]).is_err());
    }
}
