//! Tracing subscriber setup
//!
//! Library code only emits events; binaries and tests call
//! [`init_tracing`] once to install a subscriber.

use crate::config::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};
use ulid::Ulid;

/// Identifier of one pipeline run, recorded on its span
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Ulid);

impl RunId {
    /// Fresh, time-ordered id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s.strip_prefix("run-").unwrap_or(s)).map(Self)
    }
}

/// Filter honoring `RUST_LOG`, falling back to the configured level
#[must_use]
pub fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber
///
/// Returns `false` when a subscriber was already installed (for example by
/// an earlier test), which is not an error.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(config));
    let installed = if config.json {
        registry
            .with(
                tracing_fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_fmt::layer().with_target(true))
            .try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_round_trip_through_display() {
        let id = RunId::new();
        let text = id.to_string();
        assert!(text.starts_with("run-"));
        assert_eq!(text.parse::<RunId>().unwrap(), id);
    }

    #[test]
    fn second_init_is_harmless() {
        let config = TelemetryConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
