//! Exchange configuration.

use std::time::Duration;

use derive_more::derive::From;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::Backing;

#[derive(Debug, From)]
pub enum ConfigError {
    #[from(ignore)]
    IOError(std::io::Error),

    #[from(ignore)]
    DeserializationFailed(toml::de::Error),

    /// A value that parses but cannot drive an exchange.
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::DeserializationFailed(value)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Everything the orchestrator needs to wire one producer to one consumer.
///
/// Durations are milliseconds in TOML:
///
/// ```toml
/// count = 4
/// producer_delay_ms = 1000
/// consumer_delay_ms = 2000
/// close_on_finish = true
///
/// [backing]
/// kind = "manual"
/// capacity = 1
/// ```
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangeConfig {
    backing: Backing,

    /// Last value of the sequence, also the consumer's terminal value.
    count: u64,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "producer_delay_ms")]
    producer_delay: Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "consumer_delay_ms")]
    consumer_delay: Duration,

    /// Bounded wait for every take; `None` waits indefinitely.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(rename = "patience_ms")]
    patience: Option<Duration>,

    /// Producer closes the store after its last value.
    close_on_finish: bool,
}

impl ExchangeConfig {
    /// Creates the reference configuration.
    ///
    /// Defaults:
    /// - `backing`: manual, capacity 1
    /// - `count`: 4
    /// - `producer_delay`: 1s
    /// - `consumer_delay`: 2s
    /// - `patience`: None
    /// - `close_on_finish`: true
    #[must_use]
    pub const fn new() -> Self {
        Self {
            backing: Backing::Manual { capacity: 1 },
            count: 4,
            producer_delay: Duration::from_secs(1),
            consumer_delay: Duration::from_secs(2),
            patience: None,
            close_on_finish: true,
        }
    }

    /// Reference configuration without any pacing, for tests and benches.
    #[must_use]
    pub const fn unpaced() -> Self {
        Self::new()
            .producer_delay(Duration::ZERO)
            .consumer_delay(Duration::ZERO)
    }

    #[must_use]
    pub const fn backing(mut self, backing: Backing) -> Self {
        self.backing = backing;
        self
    }

    #[must_use]
    pub const fn count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    #[must_use]
    pub const fn producer_delay(mut self, delay: Duration) -> Self {
        self.producer_delay = delay;
        self
    }

    #[must_use]
    pub const fn consumer_delay(mut self, delay: Duration) -> Self {
        self.consumer_delay = delay;
        self
    }

    #[must_use]
    pub const fn patience(mut self, patience: Option<Duration>) -> Self {
        self.patience = patience;
        self
    }

    #[must_use]
    pub const fn close_on_finish(mut self, close: bool) -> Self {
        self.close_on_finish = close;
        self
    }

    #[must_use]
    pub const fn get_backing(&self) -> Backing {
        self.backing
    }

    #[must_use]
    pub const fn get_count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub const fn get_producer_delay(&self) -> Duration {
        self.producer_delay
    }

    #[must_use]
    pub const fn get_consumer_delay(&self) -> Duration {
        self.consumer_delay
    }

    #[must_use]
    pub const fn get_patience(&self) -> Option<Duration> {
        self.patience
    }

    #[must_use]
    pub const fn get_close_on_finish(&self) -> bool {
        self.close_on_finish
    }

    /// Rejects values that would leave the consumer waiting forever or
    /// ask for a store without room.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.count == 0 {
            return Err(ConfigError::Invalid(String::from(
                "count must be at least 1",
            )));
        }

        match self.backing {
            Backing::Manual { capacity: 0 }
            | Backing::Queue {
                capacity: Some(0),
            } => Err(ConfigError::Invalid(String::from(
                "backing.capacity must be at least 1",
            ))),
            _ => Ok(()),
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DeserializationFailed`] or [`ConfigError::Invalid`].
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the TOML file at `target`.
    ///
    /// # Errors
    ///
    /// Adds [`ConfigError::IOError`] to the errors of [`Self::from_toml`].
    pub fn from_path<V: Into<std::path::PathBuf>>(target: V) -> ConfigResult<Self> {
        let target_path = target.into();
        let content = std::fs::read_to_string(target_path)?;
        Self::from_toml(&content)
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self::new()
    }
}
