//! Analytics Configuration
//!
//! Config file: $PERFWATCH_CONFIG, ~/.config/perfwatch/config.toml or
//! /etc/perfwatch/config.toml. Every field has a default, so an empty file
//! (or no file at all) yields a working configuration.
//!
//! ```toml
//! anomaly_threshold = 2.5
//! trend_min_points = 10
//! forecast_horizon_days = 30
//!
//! [stages]
//! forecast = false
//!
//! [metrics.throughput]
//! polarity = "higher_is_better"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AnalyticsError, Result};

/// Whether growth of a metric is bad or good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Latency, CPU, memory, error counts
    #[default]
    HigherIsWorse,
    /// Throughput, success rate
    HigherIsBetter,
}

/// Per-stage enable flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageToggles {
    #[serde(default = "enabled")]
    pub trend: bool,
    #[serde(default = "enabled")]
    pub anomaly: bool,
    #[serde(default = "enabled")]
    pub forecast: bool,
    #[serde(default = "enabled")]
    pub insight: bool,
}

fn enabled() -> bool {
    true
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            trend: true,
            anomaly: true,
            forecast: true,
            insight: true,
        }
    }
}

/// Per-metric overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSettings {
    #[serde(default)]
    pub polarity: Polarity,
}

/// Main analytics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Z-score / moving-average deviation threshold
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,

    /// Minimum samples for a trend fit
    #[serde(default = "default_trend_min_points")]
    pub trend_min_points: usize,

    /// Horizon used when the caller does not pass one
    #[serde(default = "default_forecast_horizon_days")]
    pub forecast_horizon_days: usize,

    /// History window fetched for forecasting
    #[serde(default = "default_forecast_history_days")]
    pub forecast_history_days: u32,

    #[serde(default)]
    pub stages: StageToggles,

    #[serde(default)]
    pub metrics: BTreeMap<String, MetricSettings>,
}

fn default_anomaly_threshold() -> f64 {
    2.5
}

fn default_trend_min_points() -> usize {
    10
}

fn default_forecast_horizon_days() -> usize {
    30
}

fn default_forecast_history_days() -> u32 {
    90
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: default_anomaly_threshold(),
            trend_min_points: default_trend_min_points(),
            forecast_horizon_days: default_forecast_horizon_days(),
            forecast_history_days: default_forecast_history_days(),
            stages: StageToggles::default(),
            metrics: BTreeMap::new(),
        }
    }
}

impl AnalyticsConfig {
    /// Get default user config path: ~/.config/perfwatch/config.toml
    pub fn user_config_path() -> Option<PathBuf> {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return Some(Path::new(&xdg).join("perfwatch").join("config.toml"));
        }
        std::env::var("HOME")
            .ok()
            .map(|home| Path::new(&home).join(".config").join("perfwatch").join("config.toml"))
    }

    /// Get system config path: /etc/perfwatch/config.toml
    pub fn system_config_path() -> PathBuf {
        PathBuf::from("/etc/perfwatch/config.toml")
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AnalyticsConfig =
            toml::from_str(contents).map_err(|e| AnalyticsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| AnalyticsError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
            .map_err(|e| AnalyticsError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load configuration
    ///
    /// Priority:
    /// 1. $PERFWATCH_CONFIG
    /// 2. User config (~/.config/perfwatch/config.toml)
    /// 3. System config (/etc/perfwatch/config.toml)
    /// 4. Defaults
    pub fn load() -> Result<Self> {
        if let Ok(explicit) = std::env::var("PERFWATCH_CONFIG") {
            return Self::load_from(Path::new(&explicit));
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                return Self::load_from(&user_path);
            }
        }

        let system_path = Self::system_config_path();
        if system_path.exists() {
            return Self::load_from(&system_path);
        }

        Ok(Self::default())
    }

    /// Reject values the analyzers cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.anomaly_threshold.is_finite() || self.anomaly_threshold <= 0.0 {
            return Err(AnalyticsError::Config(format!(
                "anomaly_threshold must be a positive number, got {}",
                self.anomaly_threshold
            )));
        }
        if self.trend_min_points < 3 {
            return Err(AnalyticsError::Config(format!(
                "trend_min_points must be at least 3, got {}",
                self.trend_min_points
            )));
        }
        if self.forecast_horizon_days == 0 {
            return Err(AnalyticsError::Config(
                "forecast_horizon_days must be at least 1".to_string(),
            ));
        }
        if self.forecast_history_days == 0 {
            return Err(AnalyticsError::Config(
                "forecast_history_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn polarity_for(&self, metric: &str) -> Polarity {
        self.metrics
            .get(metric)
            .map(|m| m.polarity)
            .unwrap_or_default()
    }

    pub fn with_polarity(mut self, metric: impl Into<String>, polarity: Polarity) -> Self {
        self.metrics.insert(metric.into(), MetricSettings { polarity });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.anomaly_threshold, 2.5);
        assert_eq!(config.trend_min_points, 10);
        assert_eq!(config.forecast_horizon_days, 30);
        assert!(config.stages.trend && config.stages.anomaly);
        assert!(config.stages.forecast && config.stages.insight);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AnalyticsConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalyticsConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = AnalyticsConfig::from_toml_str(
            r#"
anomaly_threshold = 3.0

[stages]
forecast = false

[metrics.throughput]
polarity = "higher_is_better"
"#,
        )
        .unwrap();

        assert_eq!(config.anomaly_threshold, 3.0);
        assert_eq!(config.trend_min_points, 10);
        assert!(!config.stages.forecast);
        assert!(config.stages.trend);
        assert_eq!(config.polarity_for("throughput"), Polarity::HigherIsBetter);
        assert_eq!(config.polarity_for("cpu_usage"), Polarity::HigherIsWorse);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(AnalyticsConfig::from_toml_str("anomaly_threshold = 0.0").is_err());
        assert!(AnalyticsConfig::from_toml_str("trend_min_points = 2").is_err());
        assert!(AnalyticsConfig::from_toml_str("forecast_horizon_days = 0").is_err());
        assert!(AnalyticsConfig::from_toml_str("anomaly_threshold = \"high\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "trend_min_points = 12\n").unwrap();

        let config = AnalyticsConfig::load_from(&path).unwrap();
        assert_eq!(config.trend_min_points, 12);

        let missing = AnalyticsConfig::load_from(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(AnalyticsError::Config(_))));
    }
}
