//! Forecaster
//!
//! Short-horizon projection from two methods averaged elementwise:
//!
//! - linear: the full-history least squares line extrapolated forward
//! - exponential smoothing (alpha 0.3) with a damped trend
//!
//! Intervals widen 10% per step from the historical standard deviation.
//! Projections are clamped at zero since the metrics are non-negative.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::context::{AnalysisContext, HistoryCache};
use crate::error::{AnalyticsError, Result};
use crate::period::TimePeriod;
use crate::sink::AnalysisRecord;
use crate::stats::{self, LinearFit};
use crate::types::{ForecastConfidence, PerformanceForecast};

/// Minimum history for any forecast
pub const MIN_FORECAST_POINTS: usize = 20;
/// Below this many points confidence is forced LOW
const MIN_CONFIDENT_POINTS: usize = 10;
/// Below this many points a limited-history risk is reported
const COMFORTABLE_POINTS: usize = 30;
const SMOOTHING_ALPHA: f64 = 0.3;
const TREND_DAMPING: f64 = 0.1;
const UNCERTAINTY_GROWTH: f64 = 0.1;
const Z_95: f64 = 1.96;
const MAX_VOLATILITY_PENALTY: f64 = 0.8;
const RECENT_WINDOW: usize = 10;
const WEEKLY_LAG: usize = 7;

const METHODOLOGY: &str =
    "ensemble: linear regression + exponential smoothing (alpha=0.3, damped trend)";

const ASSUMPTIONS: &[&str] = &[
    "Historical patterns continue into the forecast horizon",
    "No major deployment, configuration or traffic changes occur",
    "Samples are evenly spaced (one per day)",
];

/// Hard limits per metric family, matched by substring of the metric name
pub struct MetricLimit {
    pub keyword: &'static str,
    pub limit: f64,
    /// Whether crossing the limit is a capacity concern
    pub capacity: bool,
    pub recommendation: &'static str,
}

pub const METRIC_LIMITS: &[MetricLimit] = &[
    MetricLimit {
        keyword: "cpu",
        limit: 80.0,
        capacity: true,
        recommendation: "CPU usage is forecast to exceed 80%; plan scaling or rebalance workloads",
    },
    MetricLimit {
        keyword: "memory",
        limit: 85.0,
        capacity: true,
        recommendation: "Memory usage is forecast to exceed 85%; review memory limits or add capacity",
    },
    MetricLimit {
        keyword: "response_time",
        limit: 1000.0,
        capacity: false,
        recommendation: "Response time is forecast to exceed 1000 ms; profile slow paths and consider caching",
    },
];

pub fn metric_limit(metric: &str) -> Option<&'static MetricLimit> {
    let name = metric.to_ascii_lowercase();
    METRIC_LIMITS.iter().find(|l| name.contains(l.keyword))
}

/// Capacity threshold used by the insight generator (cpu 80, memory 85)
pub fn capacity_threshold(metric: &str) -> Option<f64> {
    metric_limit(metric).filter(|l| l.capacity).map(|l| l.limit)
}

/// Forecast `metric` for `horizon_days`
///
/// Returns `Ok(None)` when the forecast stage is disabled or the metric has
/// fewer than [`MIN_FORECAST_POINTS`] usable samples.
pub fn forecast(
    ctx: &AnalysisContext,
    metric_name: &str,
    horizon_days: usize,
) -> Result<Option<PerformanceForecast>> {
    let mut cache = HistoryCache::new();
    forecast_with_cache(ctx, &mut cache, metric_name, horizon_days)
}

/// Forecast using the configured default horizon
pub fn forecast_default(
    ctx: &AnalysisContext,
    metric_name: &str,
) -> Result<Option<PerformanceForecast>> {
    forecast(ctx, metric_name, ctx.config().forecast_horizon_days)
}

pub(crate) fn forecast_with_cache(
    ctx: &AnalysisContext,
    cache: &mut HistoryCache,
    metric_name: &str,
    horizon_days: usize,
) -> Result<Option<PerformanceForecast>> {
    if horizon_days == 0 {
        return Err(AnalyticsError::Config(
            "forecast horizon must be at least 1 day".to_string(),
        ));
    }
    if !ctx.config().stages.forecast {
        debug!("Forecast stage disabled, skipping {}", metric_name);
        return Ok(None);
    }

    let period = TimePeriod::days(ctx.config().forecast_history_days);
    let values: Vec<f64> = cache
        .samples(ctx, metric_name, period)?
        .iter()
        .map(|s| s.value)
        .collect();

    let Some(forecast) = build_forecast(metric_name, &values, horizon_days, ctx.now()) else {
        debug!(
            "Forecast: {} has {} points, need {}",
            metric_name,
            values.len(),
            MIN_FORECAST_POINTS
        );
        return Ok(None);
    };

    info!(
        "Forecast for {}: {} days, confidence {}",
        metric_name, horizon_days, forecast.forecast_confidence
    );
    ctx.record(AnalysisRecord::Forecast(forecast.clone()));
    Ok(Some(forecast))
}

/// Build a forecast from validated, chronologically ordered values
pub fn build_forecast(
    metric: &str,
    values: &[f64],
    horizon: usize,
    now: DateTime<Utc>,
) -> Option<PerformanceForecast> {
    let n = values.len();
    if n < MIN_FORECAST_POINTS || horizon == 0 {
        return None;
    }

    let fit = stats::linear_regression(values);
    let linear = linear_projection(&fit, n, horizon);
    let smoothed = smoothing_projection(values, horizon);

    let predicted_values: Vec<f64> = linear
        .iter()
        .zip(&smoothed)
        .map(|(l, s)| ((l + s) / 2.0).max(0.0))
        .collect();

    let historical_std = stats::std_dev(values);
    let confidence_intervals = predicted_values
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let uncertainty = historical_std * (1.0 + i as f64 * UNCERTAINTY_GROWTH);
            ((p - Z_95 * uncertainty).max(0.0), p + Z_95 * uncertainty)
        })
        .collect();

    let volatility = stats::coefficient_of_variation(values).abs();
    let forecast_confidence = classify_confidence(fit.r_squared, volatility, n);
    let risk_factors = risk_factors(values, &fit, volatility, historical_std);
    let last_actual = values[n - 1];
    let recommendations =
        recommendations(metric, &predicted_values, last_actual, forecast_confidence);

    Some(PerformanceForecast {
        metric_name: metric.to_string(),
        horizon,
        predicted_values,
        confidence_intervals,
        forecast_confidence,
        methodology: METHODOLOGY.to_string(),
        assumptions: ASSUMPTIONS.iter().map(|a| a.to_string()).collect(),
        risk_factors,
        recommendations,
        history_points: n,
        generated_at: now,
    })
}

/// Fit evaluated `i + 1` steps past the series length, for `i` in `0..horizon`
fn linear_projection(fit: &LinearFit, n: usize, horizon: usize) -> Vec<f64> {
    (0..horizon)
        .map(|i| fit.predict((n + i + 1) as f64).max(0.0))
        .collect()
}

/// Exponential smoothing with a damped additive trend
///
/// trend = last actual - second-to-last smoothed value
fn smoothing_projection(values: &[f64], horizon: usize) -> Vec<f64> {
    let mut smoothed = Vec::with_capacity(values.len());
    smoothed.push(values[0]);
    for v in &values[1..] {
        let prev = smoothed[smoothed.len() - 1];
        smoothed.push(SMOOTHING_ALPHA * v + (1.0 - SMOOTHING_ALPHA) * prev);
    }

    let n = values.len();
    let last_smoothed = smoothed[n - 1];
    let trend = values[n - 1] - smoothed[n - 2];

    (0..horizon)
        .map(|i| (last_smoothed + trend * (i + 1) as f64 * TREND_DAMPING).max(0.0))
        .collect()
}

pub fn classify_confidence(r_squared: f64, volatility: f64, n: usize) -> ForecastConfidence {
    if n < MIN_CONFIDENT_POINTS {
        return ForecastConfidence::Low;
    }
    let score = r_squared * (1.0 - volatility.min(MAX_VOLATILITY_PENALTY));
    if score > 0.8 {
        ForecastConfidence::VeryHigh
    } else if score > 0.6 {
        ForecastConfidence::High
    } else if score > 0.4 {
        ForecastConfidence::Medium
    } else {
        ForecastConfidence::Low
    }
}

fn risk_factors(values: &[f64], fit: &LinearFit, volatility: f64, std: f64) -> Vec<String> {
    let n = values.len();
    let mut risks = Vec::new();

    if volatility > 0.5 {
        risks.push(format!(
            "High volatility ({:.0}% coefficient of variation) widens forecast error",
            volatility * 100.0
        ));
    }

    if n < COMFORTABLE_POINTS {
        risks.push(format!(
            "Limited history ({} points); projections beyond a few days are unreliable",
            n
        ));
    }

    if n >= RECENT_WINDOW {
        let recent = stats::linear_regression(&values[n - RECENT_WINDOW..]);
        if (recent.slope - fit.slope).abs() > std {
            risks.push(format!(
                "Recent trend (slope {:.3}) diverges from the long-term trend (slope {:.3})",
                recent.slope, fit.slope
            ));
        }
    }

    let weekly = stats::autocorrelation(values, WEEKLY_LAG);
    if weekly > 0.3 {
        risks.push(format!(
            "Weekly pattern detected (lag-7 autocorrelation {:.2}); daily values may swing around the projection",
            weekly
        ));
    }

    risks
}

fn recommendations(
    metric: &str,
    predicted: &[f64],
    last_actual: f64,
    confidence: ForecastConfidence,
) -> Vec<String> {
    let mut recs = Vec::new();

    let week_index = predicted.len().min(7) - 1;
    let week_delta = if last_actual == 0.0 {
        0.0
    } else {
        (predicted[week_index] - last_actual) / last_actual.abs() * 100.0
    };

    if week_delta > 20.0 {
        recs.push(format!(
            "{} is projected to rise {:.0}% within a week; review capacity and recent changes",
            metric, week_delta
        ));
    } else if week_delta > 10.0 {
        recs.push(format!(
            "Moderate growth of {:.0}% expected over the next week; keep monitoring {}",
            week_delta, metric
        ));
    } else if week_delta < -20.0 {
        recs.push(format!(
            "{} is projected to fall {:.0}% within a week; confirm the drop reflects reduced demand",
            metric,
            week_delta.abs()
        ));
    }

    match confidence {
        ForecastConfidence::Low => recs.push(
            "Forecast confidence is low; collect more history before acting on these projections"
                .to_string(),
        ),
        ForecastConfidence::High | ForecastConfidence::VeryHigh => recs.push(
            "Forecast confidence is high; projections are suitable for capacity planning".to_string(),
        ),
        ForecastConfidence::Medium => {}
    }

    if let Some(limit) = metric_limit(metric) {
        if predicted.iter().any(|p| *p > limit.limit) {
            recs.push(limit.recommendation.to_string());
        }
    }

    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap()
    }

    fn ramp(n: usize, from: f64, to: f64) -> Vec<f64> {
        let step = (to - from) / (n - 1) as f64;
        (0..n).map(|i| from + step * i as f64).collect()
    }

    #[test]
    fn test_requires_twenty_points() {
        assert!(build_forecast("cpu", &ramp(19, 1.0, 2.0), 7, now()).is_none());
        assert!(build_forecast("cpu", &ramp(20, 1.0, 2.0), 7, now()).is_some());
    }

    #[test]
    fn test_rising_series_continues_upward() {
        let values = ramp(30, 20.0, 50.0);
        let forecast = build_forecast("cpu_usage", &values, 7, now()).unwrap();

        assert_eq!(forecast.predicted_values.len(), 7);
        assert!(forecast.predicted_values.windows(2).all(|w| w[1] > w[0]));
        assert!(forecast.predicted_values.iter().all(|v| *v >= 50.0));
        assert_eq!(forecast.forecast_confidence, ForecastConfidence::High);
        assert_eq!(forecast.history_points, 30);
    }

    #[test]
    fn test_intervals_bracket_predictions() {
        let values: Vec<f64> = (0..40).map(|i| 30.0 + ((i * 37) % 11) as f64).collect();
        for horizon in [1, 2, 7, 30, 90] {
            let forecast = build_forecast("memory_usage", &values, horizon, now()).unwrap();
            assert_eq!(forecast.predicted_values.len(), horizon);
            assert_eq!(forecast.confidence_intervals.len(), horizon);
            for (p, (lower, upper)) in forecast
                .predicted_values
                .iter()
                .zip(&forecast.confidence_intervals)
            {
                assert!(lower <= p && p <= upper);
                assert!(*lower >= 0.0);
            }
        }
    }

    #[test]
    fn test_intervals_widen_with_horizon() {
        let values: Vec<f64> = (0..40).map(|i| 30.0 + ((i * 37) % 11) as f64).collect();
        let forecast = build_forecast("memory_usage", &values, 10, now()).unwrap();
        let widths: Vec<f64> = forecast
            .confidence_intervals
            .iter()
            .map(|(l, u)| u - l)
            .collect();
        assert!(widths.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_projection_clamped_at_zero() {
        let values = ramp(20, 100.0, 5.0);
        let forecast = build_forecast("queue_depth", &values, 30, now()).unwrap();
        assert!(forecast.predicted_values.iter().all(|p| *p >= 0.0));
        assert_eq!(*forecast.predicted_values.last().unwrap(), 0.0);
    }

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(classify_confidence(0.95, 0.05, 50), ForecastConfidence::VeryHigh);
        assert_eq!(classify_confidence(0.95, 0.3, 50), ForecastConfidence::High);
        assert_eq!(classify_confidence(0.6, 0.1, 50), ForecastConfidence::Medium);
        assert_eq!(classify_confidence(0.2, 0.1, 50), ForecastConfidence::Low);
        assert_eq!(classify_confidence(1.0, 0.0, 9), ForecastConfidence::Low);
        // Volatility penalty is capped at 0.8
        assert_eq!(classify_confidence(1.0, 5.0, 50), ForecastConfidence::Low);
    }

    #[test]
    fn test_risk_factors() {
        let short_noisy: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { 9.0 }).collect();
        let forecast = build_forecast("error_rate", &short_noisy, 7, now()).unwrap();
        assert!(forecast.risk_factors.iter().any(|r| r.contains("volatility")));
        assert!(forecast.risk_factors.iter().any(|r| r.contains("Limited history")));

        let steady = ramp(40, 10.0, 20.0);
        let forecast = build_forecast("error_rate", &steady, 7, now()).unwrap();
        assert!(!forecast.risk_factors.iter().any(|r| r.contains("Limited history")));
        assert!(!forecast.risk_factors.iter().any(|r| r.contains("diverges")));
    }

    #[test]
    fn test_metric_threshold_recommendations() {
        let values = ramp(30, 50.0, 79.0);
        let forecast = build_forecast("cpu_usage", &values, 30, now()).unwrap();
        assert!(forecast.recommendations.iter().any(|r| r.contains("exceed 80%")));

        let values = ramp(30, 400.0, 990.0);
        let forecast = build_forecast("api_response_time_ms", &values, 30, now()).unwrap();
        assert!(forecast.recommendations.iter().any(|r| r.contains("1000 ms")));
    }

    #[test]
    fn test_capacity_threshold_lookup() {
        assert_eq!(capacity_threshold("cpu_usage"), Some(80.0));
        assert_eq!(capacity_threshold("Memory_Percent"), Some(85.0));
        assert_eq!(capacity_threshold("response_time"), None);
        assert_eq!(capacity_threshold("disk_io"), None);
    }
}
