//! Serializable dispatch configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatcher::Dispatcher;
use crate::endpoint::Endpoint;
use crate::error::ConfigError;
use crate::policy::{DelayGrowth, RetryPolicy, Strategy};

/// Shape of the backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthKind {
    #[default]
    Multiplicative,
    Additive,
}

/// Retry settings in config-file units (milliseconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per endpoint; 0 and 1 both mean a single try
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default)]
    pub initial_delay_ms: u64,
    #[serde(default)]
    pub growth: GrowthKind,
    /// Used when `growth` is multiplicative
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
    /// Used when `growth` is additive
    #[serde(default)]
    pub growth_step_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_growth_factor() -> f64 { 2.0 }
fn default_max_delay_ms() -> u64 { 30_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 0,
            growth: GrowthKind::Multiplicative,
            growth_factor: default_growth_factor(),
            growth_step_ms: 0,
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Convert into a validated [`RetryPolicy`].
    pub fn to_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let delay_growth = match self.growth {
            GrowthKind::Multiplicative => DelayGrowth::Multiplicative(self.growth_factor),
            GrowthKind::Additive => DelayGrowth::Additive(Duration::from_millis(self.growth_step_ms)),
        };
        let policy = RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            delay_growth,
            max_delay: Duration::from_millis(self.max_delay_ms),
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Top-level configuration: the fallback chain and how to walk it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Ordered fallback chain, primary first
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-attempt timeout; unset means attempts are unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_ms: Option<u64>,
    #[serde(default)]
    pub strategy: Strategy,
}

impl DispatchConfig {
    /// Sequential fallback over `endpoints` with default retry settings.
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            endpoints: crate::endpoint::endpoints(endpoints),
            retry: RetryConfig::default(),
            attempt_timeout_ms: None,
            strategy: Strategy::Sequential,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatcher()?.validate(&self.endpoints)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    pub fn dispatcher(&self) -> Result<Dispatcher, ConfigError> {
        let mut dispatcher = Dispatcher::new(self.retry.to_policy()?);
        if let Some(timeout) = self.attempt_timeout() {
            dispatcher = dispatcher.with_attempt_timeout(timeout);
        }
        Ok(dispatcher)
    }
}
