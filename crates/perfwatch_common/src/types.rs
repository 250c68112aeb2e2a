//! Core data model for trend, anomaly, forecast and insight outputs
//!
//! Every output is created fresh per call and is read-only afterwards.
//! Enum labels serialize the way downstream dashboards expect them
//! (`DEGRADING`, `spike`, `VERY_HIGH`, `capacity`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::Polarity;
use crate::period::TimePeriod;

// ============================================================================
// SAMPLES
// ============================================================================

/// A sample exactly as a history provider delivered it
///
/// The timestamp is an RFC3339 string and the value may be non-finite.
/// Use [`crate::history::sanitize`] to turn these into [`MetricSample`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: String,
    pub value: f64,
}

impl RawSample {
    pub fn new(timestamp: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            value,
        }
    }
}

/// A validated observation: finite value, parsed timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

// ============================================================================
// SEVERITY
// ============================================================================

/// Qualitative magnitude bucket shared by trends and anomalies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Bucket a score using the given threshold table
    pub fn from_score(score: f64, table: &SeverityTable) -> Self {
        if score < table.medium {
            Severity::Low
        } else if score < table.high {
            Severity::Medium
        } else if score < table.critical {
            Severity::High
        } else {
            Severity::Critical
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower bounds (inclusive) of the MEDIUM, HIGH and CRITICAL buckets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityTable {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

/// Trend severity from `normalized_slope * confidence`
pub const TREND_SEVERITY: SeverityTable = SeverityTable {
    medium: 0.1,
    high: 0.3,
    critical: 0.6,
};

/// Anomaly severity from the deviation score
pub const ANOMALY_SEVERITY: SeverityTable = SeverityTable {
    medium: 2.0,
    high: 3.0,
    critical: 4.0,
};

// ============================================================================
// TRENDS
// ============================================================================

/// Qualitative movement of a metric over a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    Improving,
    Degrading,
    Stable,
    Volatile,
    Unknown,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "IMPROVING",
            TrendDirection::Degrading => "DEGRADING",
            TrendDirection::Stable => "STABLE",
            TrendDirection::Volatile => "VOLATILE",
            TrendDirection::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supporting statistics for a trend classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendContext {
    pub intercept: f64,
    pub autocorrelation_lag1: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub baseline_std: f64,
    pub baseline_present: bool,
    pub normalized_slope: f64,
    pub severity_score: f64,
    pub polarity: Polarity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub metric_name: String,
    pub time_period: TimePeriod,
    pub direction: TrendDirection,
    pub severity: Severity,
    pub confidence: f64,
    pub slope: f64,
    /// Coefficient of determination (r²) of the linear fit
    pub correlation: f64,
    pub data_points: usize,
    pub start_value: f64,
    pub end_value: f64,
    pub change_percent: f64,
    pub volatility: f64,
    pub trend_strength: f64,
    pub timestamp: DateTime<Utc>,
    pub context: TrendContext,
}

// ============================================================================
// ANOMALIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyType {
    Spike,
    Drop,
    Outlier,
    Drift,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Spike => "spike",
            AnomalyType::Drop => "drop",
            AnomalyType::Outlier => "outlier",
            AnomalyType::Drift => "drift",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ZScore,
    Iqr,
    MovingAverage,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::ZScore => "z_score",
            DetectionMethod::Iqr => "iqr",
            DetectionMethod::MovingAverage => "moving_average",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyDetection {
    pub metric_name: String,
    pub anomaly_timestamp: DateTime<Utc>,
    pub anomaly_value: f64,
    pub expected_value: f64,
    pub deviation_score: f64,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub detection_method: DetectionMethod,
    pub confidence: f64,
    /// Position of the sample inside the analyzed window
    pub sample_index: usize,
    pub detected_at: DateTime<Utc>,
}

// ============================================================================
// FORECASTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForecastConfidence {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ForecastConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastConfidence::Low => "LOW",
            ForecastConfidence::Medium => "MEDIUM",
            ForecastConfidence::High => "HIGH",
            ForecastConfidence::VeryHigh => "VERY_HIGH",
        }
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, ForecastConfidence::High | ForecastConfidence::VeryHigh)
    }
}

impl fmt::Display for ForecastConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceForecast {
    pub metric_name: String,
    /// Horizon in days; one predicted value per day
    pub horizon: usize,
    pub predicted_values: Vec<f64>,
    /// `(lower, upper)` per predicted value
    pub confidence_intervals: Vec<(f64, f64)>,
    pub forecast_confidence: ForecastConfidence,
    pub methodology: String,
    pub assumptions: Vec<String>,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub history_points: usize,
    pub generated_at: DateTime<Utc>,
}

impl PerformanceForecast {
    /// Highest predicted value, if any
    pub fn peak(&self) -> Option<f64> {
        self.predicted_values.iter().copied().reduce(f64::max)
    }

    /// First horizon index whose prediction exceeds `threshold`
    pub fn first_index_above(&self, threshold: f64) -> Option<usize> {
        self.predicted_values.iter().position(|v| *v > threshold)
    }
}

// ============================================================================
// INSIGHTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    Optimization,
    Capacity,
    Reliability,
    Efficiency,
}

impl InsightCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightCategory::Optimization => "optimization",
            InsightCategory::Capacity => "capacity",
            InsightCategory::Reliability => "reliability",
            InsightCategory::Efficiency => "efficiency",
        }
    }

    /// Fixed sort rank (higher sorts first among equal priorities)
    pub fn rank(&self) -> u8 {
        match self {
            InsightCategory::Capacity => 4,
            InsightCategory::Reliability => 3,
            InsightCategory::Optimization => 2,
            InsightCategory::Efficiency => 1,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "optimization" => Some(InsightCategory::Optimization),
            "capacity" => Some(InsightCategory::Capacity),
            "reliability" => Some(InsightCategory::Reliability),
            "efficiency" => Some(InsightCategory::Efficiency),
            _ => None,
        }
    }
}

impl fmt::Display for InsightCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Fixed sort rank (higher sorts first)
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }
}

impl From<Severity> for Priority {
    fn from(s: Severity) -> Self {
        match s {
            Severity::Low => Priority::Low,
            Severity::Medium => Priority::Medium,
            Severity::High => Priority::High,
            Severity::Critical => Priority::Critical,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImplementationEffort {
    Low,
    Medium,
    High,
}

/// Evidence backing an insight
///
/// Only the fields relevant to the originating rule are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightEvidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_direction: Option<TrendDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_type: Option<AnomalyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_deviation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_peak: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_to_threshold: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_confidence: Option<ForecastConfidence>,
    /// Residual open map for consumers that need extra keys
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceInsight {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: InsightCategory,
    pub priority: Priority,
    pub affected_metrics: Vec<String>,
    pub evidence: InsightEvidence,
    pub recommendations: Vec<String>,
    pub estimated_impact: String,
    pub implementation_effort: ImplementationEffort,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_buckets_are_monotonic() {
        let scores = [0.0, 0.05, 0.1, 0.29, 0.3, 0.59, 0.6, 5.0];
        let buckets: Vec<_> = scores
            .iter()
            .map(|s| Severity::from_score(*s, &TREND_SEVERITY))
            .collect();
        assert!(buckets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(buckets[0], Severity::Low);
        assert_eq!(buckets[2], Severity::Medium);
        assert_eq!(buckets[4], Severity::High);
        assert_eq!(buckets[6], Severity::Critical);
    }

    #[test]
    fn test_anomaly_severity_table() {
        assert_eq!(Severity::from_score(1.9, &ANOMALY_SEVERITY), Severity::Low);
        assert_eq!(Severity::from_score(2.5, &ANOMALY_SEVERITY), Severity::Medium);
        assert_eq!(Severity::from_score(3.5, &ANOMALY_SEVERITY), Severity::High);
        assert_eq!(Severity::from_score(4.0, &ANOMALY_SEVERITY), Severity::Critical);
    }

    #[test]
    fn test_enum_labels_serialize() {
        assert_eq!(serde_json::to_string(&TrendDirection::Degrading).unwrap(), "\"DEGRADING\"");
        assert_eq!(serde_json::to_string(&AnomalyType::Spike).unwrap(), "\"spike\"");
        assert_eq!(
            serde_json::to_string(&ForecastConfidence::VeryHigh).unwrap(),
            "\"VERY_HIGH\""
        );
        assert_eq!(serde_json::to_string(&DetectionMethod::ZScore).unwrap(), "\"z_score\"");
        assert_eq!(serde_json::to_string(&InsightCategory::Capacity).unwrap(), "\"capacity\"");
    }

    #[test]
    fn test_rank_tables() {
        assert!(Priority::Critical.rank() > Priority::High.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
        assert!(InsightCategory::Capacity.rank() > InsightCategory::Efficiency.rank());
        assert_eq!(Priority::from(Severity::High), Priority::High);
    }

    #[test]
    fn test_empty_evidence_serializes_compactly() {
        let json = serde_json::to_string(&InsightEvidence::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
