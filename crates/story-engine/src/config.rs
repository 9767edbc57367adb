//! Engine configuration
//!
//! Loaded from TOML; every key is optional and falls back to its default.
//!
//! ```toml
//! [refinement]
//! approval_threshold = 3.5
//! rewrite_enabled = true
//!
//! [consistency]
//! auto_apply_confidence = 0.75
//! extraction_concurrency = 4
//! require_links = true
//!
//! [telemetry]
//! level = "info"
//! json = false
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Refinement loop settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Judge score needed to approve (0..=5)
    pub approval_threshold: f64,
    /// When false a low first score is flagged without a rewrite
    pub rewrite_enabled: bool,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            approval_threshold: 3.5,
            rewrite_enabled: true,
        }
    }
}

/// Cross-story consistency settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Minimum fix confidence for auto-apply (0..=1)
    pub auto_apply_confidence: f64,
    /// Concurrent interconnection extractions
    pub extraction_concurrency: usize,
    /// Enforce "no orphan stories"
    pub require_links: bool,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            auto_apply_confidence: 0.75,
            extraction_concurrency: 4,
            require_links: true,
        }
    }
}

/// Subscriber defaults used by [`crate::telemetry::init_tracing`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub refinement: RefinementConfig,
    pub consistency: ConsistencyConfig,
    pub telemetry: TelemetryConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With approval threshold
    #[inline]
    #[must_use]
    pub fn with_approval_threshold(mut self, threshold: f64) -> Self {
        self.refinement.approval_threshold = threshold;
        self
    }

    /// With rewrite enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_rewrite(mut self, enabled: bool) -> Self {
        self.refinement.rewrite_enabled = enabled;
        self
    }

    /// With auto-apply confidence
    #[inline]
    #[must_use]
    pub fn with_auto_apply_confidence(mut self, confidence: f64) -> Self {
        self.consistency.auto_apply_confidence = confidence;
        self
    }

    /// With extraction concurrency
    #[inline]
    #[must_use]
    pub fn with_extraction_concurrency(mut self, concurrency: usize) -> Self {
        self.consistency.extraction_concurrency = concurrency;
        self
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns error on malformed TOML or out-of-range values
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns error when the file cannot be read or is invalid
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns the first out-of-range field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.refinement.approval_threshold;
        if !(0.0..=5.0).contains(&threshold) {
            return Err(ConfigError::Invalid {
                field: "refinement.approval_threshold",
                message: format!("must be within 0..=5, got {threshold}"),
            });
        }
        let confidence = self.consistency.auto_apply_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ConfigError::Invalid {
                field: "consistency.auto_apply_confidence",
                message: format!("must be within 0..=1, got {confidence}"),
            });
        }
        if self.consistency.extraction_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "consistency.extraction_concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = EngineConfig::new();
        assert!((config.refinement.approval_threshold - 3.5).abs() < f64::EPSILON);
        assert!(config.refinement.rewrite_enabled);
        assert!((config.consistency.auto_apply_confidence - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.consistency.extraction_concurrency, 4);
        assert_eq!(config.telemetry.level, "info");
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str(
            "[refinement]\napproval_threshold = 4.0\n\n[telemetry]\njson = true\n",
        )
        .unwrap();
        assert!((config.refinement.approval_threshold - 4.0).abs() < f64::EPSILON);
        assert!(config.refinement.rewrite_enabled);
        assert!(config.telemetry.json);
        assert_eq!(config.consistency, ConsistencyConfig::default());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = EngineConfig::from_toml_str("[consistency]\nauto_apply_confidence = 1.5\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "consistency.auto_apply_confidence",
                ..
            }
        ));

        let err = EngineConfig::from_toml_str("[refinement]\napproval_threshold = -1.0\n")
            .unwrap_err();
        assert!(err.to_string().starts_with("refinement.approval_threshold must be within"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("[refinement\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[refinement]\nrewrite_enabled = false").unwrap();
        let config = EngineConfig::from_toml_file(file.path()).unwrap();
        assert!(!config.refinement.rewrite_enabled);

        let missing = EngineConfig::from_toml_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
