//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "labref_core=info"
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// How per-test confidence contributions vary.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScoreVariation {
    /// Fixed midpoints; identical inputs give identical scores
    #[default]
    Deterministic,
    /// Jitter drawn from an RNG seeded fresh for every batch
    Seeded { seed: u64 },
}

/// Confidence scorer tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Scores at or above this are HIGH
    pub high_threshold: f64,
    /// Scores at or above this are MEDIUM
    pub medium_threshold: f64,
    /// Contribution of an unmatched test
    pub unmatched_floor: f64,
    /// Minimum score of a batch with at least one match
    pub baseline: f64,
    /// Score of a non-empty batch with no matches
    pub no_match_score: f64,
    pub variation: ScoreVariation,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            high_threshold: 0.70,
            medium_threshold: 0.50,
            unmatched_floor: 0.225,
            baseline: 0.225,
            no_match_score: 0.45,
            variation: ScoreVariation::Deterministic,
        }
    }
}

impl ConfidenceConfig {
    fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("high_threshold", self.high_threshold),
            ("medium_threshold", self.medium_threshold),
            ("unmatched_floor", self.unmatched_floor),
            ("baseline", self.baseline),
            ("no_match_score", self.no_match_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.medium_threshold > self.high_threshold {
            return Err(ConfigError::Invalid(format!(
                "medium_threshold ({}) exceeds high_threshold ({})",
                self.medium_threshold, self.high_threshold
            )));
        }
        Ok(())
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub confidence: ConfidenceConfig,
    /// Worker threads for batch resolution; 0 or 1 resolves sequentially
    pub worker_threads: usize,
}

impl EngineConfig {
    /// Parse and validate a config from JSON text.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.confidence.validate()
    }

    /// Whether batches run on a worker pool.
    pub fn is_parallel(&self) -> bool {
        self.worker_threads > 1
    }
}

/// Install a global fmt subscriber filtered by `RUST_LOG`.
///
/// Falls back to `filter`, then to [`default_log_filter`]. Calling this more
/// than once keeps the first subscriber.
pub fn init_logging(filter: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(default_log_filter())));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.confidence.high_threshold, 0.70);
        assert_eq!(config.confidence.medium_threshold, 0.50);
        assert_eq!(config.confidence.variation, ScoreVariation::Deterministic);
        assert!(!config.is_parallel());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_is_default() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(
            r#"{"worker_threads": 4, "confidence": {"variation": {"mode": "seeded", "seed": 7}}}"#,
        )
        .unwrap();

        assert_eq!(config.worker_threads, 4);
        assert!(config.is_parallel());
        assert_eq!(config.confidence.variation, ScoreVariation::Seeded { seed: 7 });
        assert_eq!(config.confidence.baseline, 0.225);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let result = EngineConfig::from_json(r#"{"confidence": {"high_threshold": 1.5}}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let result = EngineConfig::from_json(
            r#"{"confidence": {"high_threshold": 0.4, "medium_threshold": 0.6}}"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"worker_threads": 2}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.worker_threads, 2);

        assert!(matches!(
            EngineConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging(Some("labref_core=debug"));
        init_logging(None);
    }
}
