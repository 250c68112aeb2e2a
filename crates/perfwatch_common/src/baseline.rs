//! Baseline Store
//!
//! Per-metric reference statistics. Baselines only normalize severity;
//! a missing baseline falls back to a unit standard deviation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{AnalyticsError, Result};

/// Standard deviation assumed when no usable baseline exists
pub const DEFAULT_BASELINE_STD: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub std: f64,
    pub p95: f64,
}

impl Baseline {
    pub fn new(mean: f64, std: f64, p95: f64) -> Self {
        Self { mean, std, p95 }
    }
}

/// Standard deviation used for normalization
///
/// Absent, zero, negative or non-finite values fall back to
/// [`DEFAULT_BASELINE_STD`].
pub fn effective_std(baseline: Option<&Baseline>) -> f64 {
    match baseline {
        Some(b) if b.std.is_finite() && b.std > 0.0 => b.std,
        _ => DEFAULT_BASELINE_STD,
    }
}

pub trait BaselineStore: Send + Sync {
    fn baseline(&self, metric: &str) -> Result<Option<Baseline>>;
}

/// Baselines held in memory, loadable from a JSON object file
///
/// File format: `{"cpu_usage": {"mean": 40.0, "std": 5.0, "p95": 60.0}, ...}`
#[derive(Debug, Clone, Default)]
pub struct InMemoryBaselines {
    baselines: BTreeMap<String, Baseline>,
    failures: BTreeMap<String, String>,
}

impl InMemoryBaselines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metric: impl Into<String>, baseline: Baseline) {
        self.baselines.insert(metric.into(), baseline);
    }

    /// Make every lookup of `metric` fail
    pub fn fail_metric(&mut self, metric: impl Into<String>, reason: impl Into<String>) {
        self.failures.insert(metric.into(), reason.into());
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| AnalyticsError::BaselineUnavailable {
            metric: "*".to_string(),
            reason: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let baselines: BTreeMap<String, Baseline> =
            serde_json::from_str(&contents).map_err(|e| AnalyticsError::BaselineUnavailable {
                metric: "*".to_string(),
                reason: format!("Failed to parse {}: {}", path.display(), e),
            })?;
        Ok(Self {
            baselines,
            failures: BTreeMap::new(),
        })
    }
}

impl BaselineStore for InMemoryBaselines {
    fn baseline(&self, metric: &str) -> Result<Option<Baseline>> {
        if let Some(reason) = self.failures.get(metric) {
            return Err(AnalyticsError::BaselineUnavailable {
                metric: metric.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self.baselines.get(metric).copied())
    }
}
