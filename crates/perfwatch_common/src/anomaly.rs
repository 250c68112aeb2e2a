//! Anomaly Detector
//!
//! Three independent statistical tests run over each metric's window:
//!
//! 1. Z-score against the window mean/std (spike or drop)
//! 2. Tukey IQR fences (outlier)
//! 3. Trailing moving average (drift)
//!
//! Findings are unioned without merging, so one sample may be reported by
//! several methods. Each record names its method for traceability.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::context::{AnalysisBatch, AnalysisContext, HistoryCache};
use crate::error::{AnalyticsError, Result};
use crate::period::TimePeriod;
use crate::sink::AnalysisRecord;
use crate::stats;
use crate::types::{
    AnomalyDetection, AnomalyType, DetectionMethod, MetricSample, Severity, ANOMALY_SEVERITY,
};

/// Minimum points for the z-score and IQR tests
pub const MIN_POINTS: usize = 10;
/// Largest moving-average window
const MAX_WINDOW: usize = 10;
/// Smallest usable moving-average window
const MIN_WINDOW: usize = 3;
/// Below this no method can run and the metric is reported as skipped
pub const MIN_DETECTABLE_POINTS: usize = 3 * MIN_WINDOW;
/// Tukey fence multiplier
const IQR_FENCE: f64 = 1.5;

/// Detect anomalies over the last `lookback_hours`
pub fn detect(
    ctx: &AnalysisContext,
    metric_names: Option<&[String]>,
    lookback_hours: u32,
) -> Result<AnalysisBatch<AnomalyDetection>> {
    let mut cache = HistoryCache::new();
    detect_with_cache(ctx, &mut cache, metric_names, TimePeriod::hours(lookback_hours))
}

pub(crate) fn detect_with_cache(
    ctx: &AnalysisContext,
    cache: &mut HistoryCache,
    metric_names: Option<&[String]>,
    period: TimePeriod,
) -> Result<AnalysisBatch<AnomalyDetection>> {
    let mut batch = AnalysisBatch::default();
    if !ctx.config().stages.anomaly {
        debug!("Anomaly stage disabled, skipping detection");
        return Ok(batch);
    }

    let threshold = ctx.config().anomaly_threshold;
    let now = ctx.now();
    let metrics = ctx.resolve_metrics(metric_names)?;

    for metric in &metrics {
        let samples = match cache.samples(ctx, metric, period) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Anomaly: Skipping {}: {}", metric, e);
                batch.skip(metric, e);
                continue;
            }
        };

        if samples.len() < MIN_DETECTABLE_POINTS {
            let e = AnalyticsError::InsufficientData {
                metric: metric.to_string(),
                required: MIN_DETECTABLE_POINTS,
                available: samples.len(),
            };
            debug!("Anomaly: {}", e);
            batch.skip(metric, e);
            continue;
        }

        for anomaly in detect_in_samples(metric, samples, threshold, now) {
            ctx.record(AnalysisRecord::Anomaly(anomaly.clone()));
            batch.items.push(anomaly);
        }
    }

    info!(
        "Anomaly detection over {}: {} anomalies across {} metrics, {} skipped",
        period,
        batch.items.len(),
        metrics.len(),
        batch.skipped.len()
    );
    Ok(batch)
}

/// Run all three methods over one series
pub fn detect_in_samples(
    metric: &str,
    samples: &[MetricSample],
    threshold: f64,
    now: DateTime<Utc>,
) -> Vec<AnomalyDetection> {
    let mut found = z_score_anomalies(metric, samples, threshold, now);
    found.extend(iqr_anomalies(metric, samples, now));
    found.extend(moving_average_anomalies(metric, samples, threshold, now));
    found
}

struct Finding {
    index: usize,
    expected: f64,
    score: f64,
    anomaly_type: AnomalyType,
    confidence: f64,
}

fn build(
    metric: &str,
    samples: &[MetricSample],
    method: DetectionMethod,
    finding: Finding,
    now: DateTime<Utc>,
) -> AnomalyDetection {
    let sample = samples[finding.index];
    AnomalyDetection {
        metric_name: metric.to_string(),
        anomaly_timestamp: sample.timestamp,
        anomaly_value: sample.value,
        expected_value: finding.expected,
        deviation_score: finding.score,
        anomaly_type: finding.anomaly_type,
        severity: Severity::from_score(finding.score, &ANOMALY_SEVERITY),
        detection_method: method,
        confidence: finding.confidence.clamp(0.0, 1.0),
        sample_index: finding.index,
        detected_at: now,
    }
}

fn values_of(samples: &[MetricSample]) -> Vec<f64> {
    samples.iter().map(|s| s.value).collect()
}

/// Points more than `threshold` standard deviations from the window mean
pub fn z_score_anomalies(
    metric: &str,
    samples: &[MetricSample],
    threshold: f64,
    now: DateTime<Utc>,
) -> Vec<AnomalyDetection> {
    if samples.len() < MIN_POINTS {
        return Vec::new();
    }

    let values = values_of(samples);
    let mean = stats::mean(&values);
    let std = stats::std_dev(&values);
    if std == 0.0 {
        return Vec::new();
    }

    values
        .iter()
        .enumerate()
        .filter_map(|(index, v)| {
            let z = (v - mean).abs() / std;
            (z > threshold).then(|| Finding {
                index,
                expected: mean,
                score: z,
                anomaly_type: if *v > mean {
                    AnomalyType::Spike
                } else {
                    AnomalyType::Drop
                },
                confidence: (z / threshold).min(1.0),
            })
        })
        .map(|f| build(metric, samples, DetectionMethod::ZScore, f, now))
        .collect()
}

/// Points outside the Tukey fences `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`
///
/// When Q1 == Q3 the distance past the fence is scaled by the sample
/// standard deviation instead of the (zero) IQR.
pub fn iqr_anomalies(
    metric: &str,
    samples: &[MetricSample],
    now: DateTime<Utc>,
) -> Vec<AnomalyDetection> {
    let n = samples.len();
    if n < MIN_POINTS {
        return Vec::new();
    }

    let values = values_of(samples);
    let mut sorted = values.clone();
    sorted.sort_by(f64::total_cmp);

    let q1 = sorted[n / 4];
    let q3 = sorted[3 * n / 4];
    let median = sorted[n / 2];
    let iqr = q3 - q1;
    let scale = if iqr > 0.0 { iqr } else { stats::std_dev(&values) };
    if scale == 0.0 {
        return Vec::new();
    }

    let lower = q1 - IQR_FENCE * iqr;
    let upper = q3 + IQR_FENCE * iqr;

    values
        .iter()
        .enumerate()
        .filter_map(|(index, v)| {
            let distance = if *v < lower {
                lower - v
            } else if *v > upper {
                v - upper
            } else {
                return None;
            };
            let score = distance / scale;
            Some(Finding {
                index,
                expected: median,
                score,
                anomaly_type: AnomalyType::Outlier,
                confidence: (score / 2.0).min(1.0),
            })
        })
        .map(|f| build(metric, samples, DetectionMethod::Iqr, f, now))
        .collect()
}

/// Moving-average window for a series of `n` points, if one fits
pub fn moving_average_window(n: usize) -> Option<usize> {
    let window = MAX_WINDOW.min(n / 3);
    (window >= MIN_WINDOW && n >= 3 * window).then_some(window)
}

/// Points that break away from their trailing window
pub fn moving_average_anomalies(
    metric: &str,
    samples: &[MetricSample],
    threshold: f64,
    now: DateTime<Utc>,
) -> Vec<AnomalyDetection> {
    let Some(window) = moving_average_window(samples.len()) else {
        return Vec::new();
    };

    let values = values_of(samples);
    (window..values.len())
        .filter_map(|index| {
            let trailing = &values[index - window..index];
            let window_mean = stats::mean(trailing);
            let window_std = stats::std_dev(trailing);
            if window_std == 0.0 {
                return None;
            }
            let deviation = (values[index] - window_mean).abs() / window_std;
            (deviation > threshold).then(|| Finding {
                index,
                expected: window_mean,
                score: deviation,
                anomaly_type: AnomalyType::Drift,
                confidence: (deviation / threshold).min(1.0),
            })
        })
        .map(|f| build(metric, samples, DetectionMethod::MovingAverage, f, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()
    }

    fn series(values: &[f64]) -> Vec<MetricSample> {
        let start = now() - Duration::hours(values.len() as i64);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| MetricSample {
                timestamp: start + Duration::hours(i as i64),
                value: *v,
            })
            .collect()
    }

    #[test]
    fn test_constant_series_has_no_anomalies() {
        let samples = series(&[7.0; 40]);
        assert!(detect_in_samples("cpu", &samples, 2.5, now()).is_empty());
    }

    #[test]
    fn test_single_spike_flagged_by_zscore_and_iqr() {
        let mut values = vec![10.0; 15];
        values[7] = 200.0;
        let samples = series(&values);

        let found = detect_in_samples("cpu", &samples, 2.5, now());
        assert_eq!(found.len(), 2);

        let z = &found[0];
        assert_eq!(z.detection_method, DetectionMethod::ZScore);
        assert_eq!(z.sample_index, 7);
        assert_eq!(z.anomaly_type, AnomalyType::Spike);
        assert_eq!(z.anomaly_value, 200.0);
        assert_eq!(z.anomaly_timestamp, samples[7].timestamp);

        let iqr = &found[1];
        assert_eq!(iqr.detection_method, DetectionMethod::Iqr);
        assert_eq!(iqr.sample_index, 7);
        assert_eq!(iqr.anomaly_type, AnomalyType::Outlier);
        assert_eq!(iqr.expected_value, 10.0);
    }

    #[test]
    fn test_drop_is_classified() {
        let mut values: Vec<f64> = (0..20).map(|i| 50.0 + (i % 3) as f64).collect();
        values[12] = 0.0;
        let found = z_score_anomalies("throughput", &series(&values), 2.5, now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anomaly_type, AnomalyType::Drop);
        assert!(found[0].expected_value > 40.0);
    }

    #[test]
    fn test_iqr_scores_relative_to_fence() {
        // Q1 = 2, Q3 = 4 over the sorted values, fences [-1, 7]
        let values = [1.0, 2.0, 2.0, 3.0, 3.0, 3.0, 4.0, 4.0, 4.0, 5.0, 11.0];
        let found = iqr_anomalies("latency", &series(&values), now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].sample_index, 10);
        assert!((found[0].deviation_score - 2.0).abs() < 1e-9);
        assert_eq!(found[0].severity, Severity::Medium);
        assert_eq!(found[0].confidence, 1.0);
    }

    #[test]
    fn test_moving_average_detects_drift() {
        let mut values: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        values[20] = 30.0;
        let found = moving_average_anomalies("memory", &series(&values), 2.5, now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].sample_index, 20);
        assert_eq!(found[0].anomaly_type, AnomalyType::Drift);
        assert!((found[0].expected_value - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_moving_average_window_sizing() {
        assert_eq!(moving_average_window(8), None);
        assert_eq!(moving_average_window(9), Some(3));
        assert_eq!(moving_average_window(15), Some(5));
        assert_eq!(moving_average_window(100), Some(10));
    }

    #[test]
    fn test_nine_points_only_run_moving_average() {
        let samples = series(&[10.0, 11.0, 10.0, 11.0, 10.0, 11.0, 10.0, 11.0, 50.0]);
        let found = detect_in_samples("cpu", &samples, 2.5, now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].detection_method, DetectionMethod::MovingAverage);
        assert_eq!(found[0].sample_index, 8);
    }

    #[test]
    fn test_short_series_contributes_nothing() {
        let samples = series(&[1.0, 1.0, 1.0, 1.0, 50.0]);
        assert!(detect_in_samples("cpu", &samples, 2.5, now()).is_empty());
    }

    #[test]
    fn test_confidence_and_severity_bounds() {
        let values: Vec<f64> = (0..60)
            .map(|i| if i % 17 == 0 { 90.0 } else { 20.0 + (i % 5) as f64 })
            .collect();
        for anomaly in detect_in_samples("cpu", &series(&values), 2.5, now()) {
            assert!((0.0..=1.0).contains(&anomaly.confidence));
            assert_eq!(
                anomaly.severity,
                Severity::from_score(anomaly.deviation_score, &ANOMALY_SEVERITY)
            );
        }
    }
}
