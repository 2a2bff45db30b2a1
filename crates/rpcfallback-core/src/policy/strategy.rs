//! Named dispatch strategies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a concurrent fan-out combines one attempt per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutStrategy {
    /// Settle on the first attempt to finish, success or failure.
    ///
    /// A fast failing endpoint fails the whole call even when a slower one
    /// would have succeeded. Callers picking this accept that.
    RaceFirst,
    /// Settle on the first success; fail only when every attempt failed.
    FirstSuccess,
    /// Wait for every attempt and hand back all outcomes.
    WaitAll,
}

/// Top-level choice between sequential fallback and a concurrent fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Endpoints one at a time, retrying each per the retry policy.
    #[default]
    Sequential,
    RaceFirst,
    FirstSuccess,
    WaitAll,
}

impl Strategy {
    /// The fan-out flavour, or `None` for sequential fallback.
    pub fn fan_out(self) -> Option<FanOutStrategy> {
        match self {
            Self::Sequential => None,
            Self::RaceFirst => Some(FanOutStrategy::RaceFirst),
            Self::FirstSuccess => Some(FanOutStrategy::FirstSuccess),
            Self::WaitAll => Some(FanOutStrategy::WaitAll),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::RaceFirst => "race_first",
            Self::FirstSuccess => "first_success",
            Self::WaitAll => "wait_all",
        }
    }
}

impl From<FanOutStrategy> for Strategy {
    fn from(s: FanOutStrategy) -> Self {
        match s {
            FanOutStrategy::RaceFirst => Self::RaceFirst,
            FanOutStrategy::FirstSuccess => Self::FirstSuccess,
            FanOutStrategy::WaitAll => Self::WaitAll,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for FanOutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Strategy::from(*self), f)
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    /// Accepts snake_case or kebab-case names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('-', "_").to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "race_first" | "race" => Ok(Self::RaceFirst),
            "first_success" | "any" => Ok(Self::FirstSuccess),
            "wait_all" | "all" => Ok(Self::WaitAll),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}
