//! Trend Analyzer
//!
//! Fits an ordinary least squares line (value vs. sample index) to each
//! metric's history and classifies the result:
//!
//! - confidence = min(r² * (1 + ln(n) / 10), 1)
//! - direction from confidence, r², slope and the metric's polarity
//! - severity from |slope| / baseline std, weighted by confidence
//! - trend strength blends r², confidence and (1 - volatility)

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::baseline::{effective_std, Baseline};
use crate::config::Polarity;
use crate::context::{AnalysisBatch, AnalysisContext, HistoryCache};
use crate::error::{AnalyticsError, Result};
use crate::period::TimePeriod;
use crate::sink::AnalysisRecord;
use crate::stats;
use crate::types::{Severity, TrendAnalysis, TrendContext, TrendDirection, TREND_SEVERITY};

/// Below this confidence the fit is not trusted for a direction
const MIN_DIRECTIONAL_CONFIDENCE: f64 = 0.3;
/// Below this r² the fit is not trusted for a direction
const MIN_DIRECTIONAL_R_SQUARED: f64 = 0.1;
/// Untrusted fits above this r² are VOLATILE, below UNKNOWN
const VOLATILE_R_SQUARED: f64 = 0.05;
/// Slopes smaller than this (units per sample) are STABLE
const STABLE_SLOPE: f64 = 0.01;

/// Analyze trends for the given metrics (all known metrics when `None`)
pub fn analyze(
    ctx: &AnalysisContext,
    metric_names: Option<&[String]>,
    period: TimePeriod,
) -> Result<AnalysisBatch<TrendAnalysis>> {
    let mut cache = HistoryCache::new();
    analyze_with_cache(ctx, &mut cache, metric_names, period)
}

pub(crate) fn analyze_with_cache(
    ctx: &AnalysisContext,
    cache: &mut HistoryCache,
    metric_names: Option<&[String]>,
    period: TimePeriod,
) -> Result<AnalysisBatch<TrendAnalysis>> {
    let mut batch = AnalysisBatch::default();
    if !ctx.config().stages.trend {
        debug!("Trend stage disabled, skipping analysis");
        return Ok(batch);
    }

    let metrics = ctx.resolve_metrics(metric_names)?;
    for metric in &metrics {
        match analyze_metric(ctx, cache, metric, period) {
            Ok(analysis) => {
                ctx.record(AnalysisRecord::Trend(analysis.clone()));
                batch.items.push(analysis);
            }
            Err(e @ AnalyticsError::InsufficientData { .. }) => {
                debug!("Trend: {}", e);
                batch.skip(metric, e);
            }
            Err(e) => {
                warn!("Trend: Skipping {}: {}", metric, e);
                batch.skip(metric, e);
            }
        }
    }

    info!(
        "Trend analysis over {}: {} analyzed, {} skipped",
        period,
        batch.items.len(),
        batch.skipped.len()
    );
    Ok(batch)
}

fn analyze_metric(
    ctx: &AnalysisContext,
    cache: &mut HistoryCache,
    metric: &str,
    period: TimePeriod,
) -> Result<TrendAnalysis> {
    let min_points = ctx.config().trend_min_points;
    let values: Vec<f64> = cache
        .samples(ctx, metric, period)?
        .iter()
        .map(|s| s.value)
        .collect();

    if values.len() < min_points {
        return Err(AnalyticsError::InsufficientData {
            metric: metric.to_string(),
            required: min_points,
            available: values.len(),
        });
    }

    let baseline = ctx.baselines().baseline(metric)?;
    Ok(compute_trend(
        metric,
        period,
        &values,
        baseline.as_ref(),
        ctx.config().polarity_for(metric),
        ctx.now(),
    ))
}

/// Fit confidence from r² and sample count
pub fn fit_confidence(r_squared: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    (r_squared * (1.0 + (n as f64).ln() / 10.0)).clamp(0.0, 1.0)
}

/// Direction classification
pub fn classify_direction(
    slope: f64,
    r_squared: f64,
    confidence: f64,
    polarity: Polarity,
) -> TrendDirection {
    if confidence < MIN_DIRECTIONAL_CONFIDENCE || r_squared < MIN_DIRECTIONAL_R_SQUARED {
        return if r_squared > VOLATILE_R_SQUARED {
            TrendDirection::Volatile
        } else {
            TrendDirection::Unknown
        };
    }

    if slope.abs() < STABLE_SLOPE {
        return TrendDirection::Stable;
    }

    match (slope > 0.0, polarity) {
        (true, Polarity::HigherIsWorse) | (false, Polarity::HigherIsBetter) => {
            TrendDirection::Degrading
        }
        _ => TrendDirection::Improving,
    }
}

/// Build a full trend analysis from already-validated values
pub fn compute_trend(
    metric: &str,
    period: TimePeriod,
    values: &[f64],
    baseline: Option<&Baseline>,
    polarity: Polarity,
    now: DateTime<Utc>,
) -> TrendAnalysis {
    let n = values.len();
    let fit = stats::linear_regression(values);
    let confidence = fit_confidence(fit.r_squared, n);
    let direction = classify_direction(fit.slope, fit.r_squared, confidence, polarity);

    let baseline_std = effective_std(baseline);
    let normalized_slope = fit.slope.abs() / baseline_std;
    let severity_score = normalized_slope * confidence;
    let severity = Severity::from_score(severity_score, &TREND_SEVERITY);

    let mean = stats::mean(values);
    let std_dev = stats::std_dev(values);
    let volatility = stats::coefficient_of_variation(values).abs();

    let start_value = values.first().copied().unwrap_or(0.0);
    let end_value = values.last().copied().unwrap_or(0.0);
    let change_percent = if start_value == 0.0 {
        0.0
    } else {
        (end_value - start_value) / start_value.abs() * 100.0
    };

    let trend_strength =
        (fit.r_squared * 0.4 + confidence * 0.4 + (1.0 - volatility) * 0.2).clamp(0.0, 1.0);

    TrendAnalysis {
        metric_name: metric.to_string(),
        time_period: period,
        direction,
        severity,
        confidence,
        slope: fit.slope,
        correlation: fit.r_squared,
        data_points: n,
        start_value,
        end_value,
        change_percent,
        volatility,
        trend_strength,
        timestamp: now,
        context: TrendContext {
            intercept: fit.intercept,
            autocorrelation_lag1: stats::autocorrelation(values, 1),
            mean,
            std_dev,
            baseline_std,
            baseline_present: baseline.is_some(),
            normalized_slope,
            severity_score,
            polarity,
        },
    }
}
