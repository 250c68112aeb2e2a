//! Metric History Provider
//!
//! Providers return raw `(timestamp, value)` pairs in ascending order for a
//! lookback window. They never fill gaps. Everything leaving this module
//! through [`sanitize`] is finite and chronologically ordered.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{AnalyticsError, Result};
use crate::period::TimePeriod;
use crate::types::{MetricSample, RawSample};

/// Source of historical observations
pub trait MetricHistory: Send + Sync {
    /// All metrics the provider knows about, in a stable order
    fn metric_names(&self) -> Result<Vec<String>>;

    /// Samples for `metric` inside `period`, oldest first
    fn fetch(&self, metric: &str, period: TimePeriod) -> Result<Vec<RawSample>>;
}

/// Drop malformed samples
///
/// A sample is dropped when its value is not finite, its timestamp does not
/// parse as RFC3339, or its timestamp goes backwards relative to the last
/// kept sample. The rest of the series is kept.
pub fn sanitize(metric: &str, raw: &[RawSample]) -> Vec<MetricSample> {
    let mut samples: Vec<MetricSample> = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;

    for (idx, sample) in raw.iter().enumerate() {
        if !sample.value.is_finite() {
            debug!("{}: dropping sample {} with non-finite value", metric, idx);
            dropped += 1;
            continue;
        }

        let timestamp = match DateTime::parse_from_rfc3339(&sample.timestamp) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                debug!(
                    "{}: dropping sample {} with bad timestamp '{}': {}",
                    metric, idx, sample.timestamp, e
                );
                dropped += 1;
                continue;
            }
        };

        if let Some(last) = samples.last() {
            if timestamp < last.timestamp {
                debug!("{}: dropping out-of-order sample {} at {}", metric, idx, timestamp);
                dropped += 1;
                continue;
            }
        }

        samples.push(MetricSample {
            timestamp,
            value: sample.value,
        });
    }

    if dropped > 0 {
        debug!("{}: dropped {} of {} samples", metric, dropped, raw.len());
    }

    samples
}

// ============================================================================
// IN-MEMORY PROVIDER
// ============================================================================

/// In-memory history, also used as the test double
///
/// Windows are measured back from `as_of`. Without an explicit `as_of`,
/// each series is windowed relative to its own newest sample.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    series: BTreeMap<String, Vec<RawSample>>,
    failures: BTreeMap<String, String>,
    as_of: Option<DateTime<Utc>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn insert(&mut self, metric: impl Into<String>, samples: Vec<RawSample>) {
        self.series.insert(metric.into(), samples);
    }

    /// Insert evenly spaced values starting at `start`
    pub fn insert_values(
        &mut self,
        metric: impl Into<String>,
        start: DateTime<Utc>,
        step: Duration,
        values: &[f64],
    ) {
        let samples = values
            .iter()
            .enumerate()
            .map(|(i, v)| RawSample::new((start + step * i as i32).to_rfc3339(), *v))
            .collect();
        self.insert(metric, samples);
    }

    /// Make every fetch of `metric` fail
    pub fn fail_metric(&mut self, metric: impl Into<String>, reason: impl Into<String>) {
        let metric = metric.into();
        self.series.entry(metric.clone()).or_default();
        self.failures.insert(metric, reason.into());
    }

    /// Load a JSONL sample file
    ///
    /// Each line: `{"metric": "cpu_usage", "timestamp": "<RFC3339>", "value": 42.0}`.
    /// `value` may also be a string such as `"NaN"`; such samples are kept
    /// here and dropped later by [`sanitize`]. Unreadable lines are skipped.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| AnalyticsError::HistoryUnavailable {
            metric: "*".to_string(),
            reason: format!("Failed to open {}: {}", path.display(), e),
        })?;

        let mut history = Self::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("History: Skipping unreadable line {}: {}", line_num + 1, e);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<SampleLine>(&line) {
                Ok(entry) => match entry.value_f64() {
                    Some(value) => history
                        .series
                        .entry(entry.metric)
                        .or_default()
                        .push(RawSample::new(entry.timestamp, value)),
                    None => warn!("History: Skipping line {} with non-numeric value", line_num + 1),
                },
                Err(e) => {
                    warn!("History: Skipping unparseable line {}: {}", line_num + 1, e);
                }
            }
        }

        debug!(
            "History: Loaded {} metrics from {}",
            history.series.len(),
            path.display()
        );
        Ok(history)
    }
}

#[derive(Debug, Deserialize)]
struct SampleLine {
    metric: String,
    timestamp: String,
    value: serde_json::Value,
}

impl SampleLine {
    fn value_f64(&self) -> Option<f64> {
        match &self.value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

fn parse_ts(raw: &RawSample) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw.timestamp)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

impl MetricHistory for InMemoryHistory {
    fn metric_names(&self) -> Result<Vec<String>> {
        Ok(self.series.keys().cloned().collect())
    }

    fn fetch(&self, metric: &str, period: TimePeriod) -> Result<Vec<RawSample>> {
        if let Some(reason) = self.failures.get(metric) {
            return Err(AnalyticsError::HistoryUnavailable {
                metric: metric.to_string(),
                reason: reason.clone(),
            });
        }

        let Some(series) = self.series.get(metric) else {
            return Ok(Vec::new());
        };

        let reference = self
            .as_of
            .or_else(|| series.iter().filter_map(parse_ts).max());
        let Some(end) = reference else {
            return Ok(series.clone());
        };
        let start = end - period.duration();

        // Unparseable timestamps pass through so sanitize can account for them
        Ok(series
            .iter()
            .filter(|s| match parse_ts(s) {
                Some(ts) => ts >= start && ts <= end,
                None => true,
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_sanitize_drops_malformed_samples() {
        let raw = vec![
            RawSample::new("2025-01-01T00:00:00Z", 1.0),
            RawSample::new("2025-01-01T01:00:00Z", f64::NAN),
            RawSample::new("not a time", 2.0),
            RawSample::new("2025-01-01T02:00:00Z", f64::INFINITY),
            RawSample::new("2025-01-01T03:00:00Z", 3.0),
            RawSample::new("2024-12-31T00:00:00Z", 4.0),
            RawSample::new("2025-01-01T04:00:00+01:00", 5.0),
            RawSample::new("2025-01-01T05:00:00Z", 6.0),
        ];

        let samples = sanitize("cpu", &raw);
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        // 04:00+01:00 is 03:00Z, equal to the previous sample, so it is kept
        assert_eq!(values, vec![1.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn test_fetch_windows_relative_to_newest_sample() {
        let mut history = InMemoryHistory::new();
        let values: Vec<f64> = (0..48).map(|i| i as f64).collect();
        history.insert_values("cpu", t0(), Duration::hours(1), &values);

        let last_day = history.fetch("cpu", TimePeriod::hours(24)).unwrap();
        assert_eq!(last_day.len(), 25);
        assert_eq!(last_day.last().unwrap().value, 47.0);
    }

    #[test]
    fn test_fetch_with_explicit_as_of() {
        let mut history = InMemoryHistory::new().with_as_of(t0() + Duration::hours(10));
        let values: Vec<f64> = (0..48).map(|i| i as f64).collect();
        history.insert_values("cpu", t0(), Duration::hours(1), &values);

        let window = history.fetch("cpu", TimePeriod::hours(5)).unwrap();
        let values: Vec<f64> = window.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_unknown_metric_is_empty_and_failures_surface() {
        let mut history = InMemoryHistory::new();
        assert!(history.fetch("nope", TimePeriod::days(1)).unwrap().is_empty());

        history.fail_metric("disk_io", "provider timeout");
        let err = history.fetch("disk_io", TimePeriod::days(1)).unwrap_err();
        assert!(matches!(err, AnalyticsError::HistoryUnavailable { .. }));
        assert_eq!(history.metric_names().unwrap(), vec!["disk_io".to_string()]);
    }

    #[test]
    fn test_load_jsonl_samples() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"metric":"cpu","timestamp":"2025-01-01T00:00:00Z","value":10.5}}"#).unwrap();
        writeln!(file, r#"{{"metric":"cpu","timestamp":"2025-01-01T01:00:00Z","value":"NaN"}}"#).unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"metric":"mem","timestamp":"2025-01-01T00:00:00Z","value":null}}"#).unwrap();
        writeln!(file, r#"{{"metric":"mem","timestamp":"2025-01-01T01:00:00Z","value":55}}"#).unwrap();

        let history = InMemoryHistory::from_jsonl(file.path()).unwrap();
        assert_eq!(history.metric_names().unwrap(), vec!["cpu", "mem"]);

        let cpu = history.fetch("cpu", TimePeriod::days(1)).unwrap();
        assert_eq!(cpu.len(), 2);
        assert!(cpu[1].value.is_nan());
        assert_eq!(sanitize("cpu", &cpu).len(), 1);

        let mem = history.fetch("mem", TimePeriod::days(1)).unwrap();
        assert_eq!(mem.len(), 1);
        assert_eq!(mem[0].value, 55.0);
    }
}
