//! Configuration loading and management.
//!
//! This module provides the configuration structs for the layout matrixizer,
//! the heuristic cache, and the optional extraction oracle, plus loaders for
//! TOML and JSON config files.

use crate::error::{PrefillError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Layout matrixization parameters.
///
/// The defaults match the behaviour the cache was trained against: boxes
/// whose vertical centers fall within 20 layout units of a row anchor join
/// that row, and fuzzy whole-row lookup tolerates a 15% normalized edit
/// distance for rows longer than 10 characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Vertical distance from a row anchor within which a box joins the row
    #[serde(default = "default_row_tolerance")]
    pub row_tolerance: f64,

    /// Normalized edit-distance ratio below which a whole row matches a query
    #[serde(default = "default_fuzzy_ratio")]
    pub fuzzy_ratio: f64,

    /// Minimum joined-row length (chars) before fuzzy row matching applies
    #[serde(default = "default_fuzzy_min_row_len")]
    pub fuzzy_min_row_len: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            row_tolerance: default_row_tolerance(),
            fuzzy_ratio: default_fuzzy_ratio(),
            fuzzy_min_row_len: default_fuzzy_min_row_len(),
        }
    }
}

/// Heuristic cache capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum ranked heuristics retained per field key (must be >= 1)
    #[serde(default = "default_max_heuristics")]
    pub max_heuristics_per_key: usize,

    /// Maximum confirmed example values retained per field key
    #[serde(default = "default_max_examples")]
    pub max_examples_per_key: usize,

    /// Consecutive type mismatches tolerated before the expected type flips
    #[serde(default = "default_type_flip_threshold")]
    pub type_flip_threshold: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_heuristics_per_key: default_max_heuristics(),
            max_examples_per_key: default_max_examples(),
            type_flip_threshold: default_type_flip_threshold(),
        }
    }
}

impl CacheConfig {
    /// Validate capacity parameters.
    ///
    /// A zero heuristics-per-key capacity would make every lookup a miss
    /// while still accepting updates, so it is rejected up front.
    pub fn validate(&self) -> Result<()> {
        if self.max_heuristics_per_key == 0 {
            return Err(PrefillError::validation(
                "max_heuristics_per_key must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Connection settings for an OpenAI-compatible extraction oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Top-level configuration.
///
/// # Example
///
/// ```rust
/// use prefill::config::PrefillConfig;
///
/// let config = PrefillConfig::default();
/// assert_eq!(config.cache.max_heuristics_per_key, 5);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrefillConfig {
    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Oracle connection settings (None = offline, cache only)
    #[serde(default)]
    pub oracle: Option<OracleConfig>,
}

impl PrefillConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PrefillError::validation(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            PrefillError::validation(format!("Invalid TOML in {}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PrefillError::validation(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            PrefillError::validation(format!("Invalid JSON in {}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, dispatching on the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            other => Err(PrefillError::validation(format!(
                "Unsupported config extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        if !(0.0..=1.0).contains(&self.layout.fuzzy_ratio) {
            return Err(PrefillError::validation(format!(
                "fuzzy_ratio must be within [0, 1], got {}",
                self.layout.fuzzy_ratio
            )));
        }
        if self.layout.row_tolerance <= 0.0 || !self.layout.row_tolerance.is_finite() {
            return Err(PrefillError::validation(format!(
                "row_tolerance must be a positive finite number, got {}",
                self.layout.row_tolerance
            )));
        }
        Ok(())
    }
}

fn default_row_tolerance() -> f64 {
    20.0
}

fn default_fuzzy_ratio() -> f64 {
    0.15
}

fn default_fuzzy_min_row_len() -> usize {
    10
}

fn default_max_heuristics() -> usize {
    5
}

fn default_max_examples() -> usize {
    5
}

fn default_type_flip_threshold() -> u32 {
    5
}

fn default_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = PrefillConfig::default();
        assert_eq!(config.layout.row_tolerance, 20.0);
        assert_eq!(config.layout.fuzzy_ratio, 0.15);
        assert_eq!(config.layout.fuzzy_min_row_len, 10);
        assert_eq!(config.cache.max_heuristics_per_key, 5);
        assert_eq!(config.cache.max_examples_per_key, 5);
        assert_eq!(config.cache.type_flip_threshold, 5);
        assert!(config.oracle.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefill.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[layout]
row_tolerance = 12.5

[cache]
max_heuristics_per_key = 3

[oracle]
model = "gpt-test"
"#
        )
        .unwrap();

        let config = PrefillConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.layout.row_tolerance, 12.5);
        assert_eq!(config.layout.fuzzy_ratio, 0.15);
        assert_eq!(config.cache.max_heuristics_per_key, 3);
        assert_eq!(config.oracle.unwrap().model, "gpt-test");
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefill.json");
        std::fs::write(&path, r#"{"cache": {"max_examples_per_key": 2}}"#).unwrap();

        let config = PrefillConfig::from_json_file(&path).unwrap();
        assert_eq!(config.cache.max_examples_per_key, 2);
        assert_eq!(config.cache.max_heuristics_per_key, 5);
    }

    #[test]
    fn test_from_file_dispatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefill.yaml");
        std::fs::write(&path, "layout: {}").unwrap();

        let result = PrefillConfig::from_file(&path);
        assert!(matches!(result, Err(PrefillError::Validation { .. })));
    }

    #[test]
    fn test_zero_heuristic_capacity_rejected() {
        let config = PrefillConfig {
            cache: CacheConfig {
                max_heuristics_per_key: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PrefillError::Validation { .. })));
    }

    #[test]
    fn test_invalid_fuzzy_ratio_rejected() {
        let config = PrefillConfig {
            layout: LayoutConfig {
                fuzzy_ratio: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
