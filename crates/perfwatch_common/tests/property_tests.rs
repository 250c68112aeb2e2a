//! Property tests over randomized series
//!
//! Inputs come from a small xorshift generator so failures are reproducible
//! from the seed alone.
//!
//! ## Invariants
//!
//! - forecast length equals the horizon for every horizon >= 1
//! - every prediction lies inside its interval, lower bound >= 0
//! - trend and anomaly confidences stay in [0, 1]
//! - constant series never produce anomalies
//! - trend severity never decreases as the slope grows
//! - identical inputs give identical outputs

use chrono::{DateTime, Duration, TimeZone, Utc};
use perfwatch_common::{
    anomaly::detect_in_samples,
    forecast::build_forecast,
    trend::compute_trend,
    MetricSample, Polarity, TimePeriod,
};

// ============================================================================
// TEST HELPERS
// ============================================================================

/// xorshift64
struct TestRng {
    state: u64,
}

impl TestRng {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() as f64) / (u64::MAX as f64)
    }

    fn next_range(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        min + (self.next_u64() % (max - min))
    }

    /// Noisy series with a random level, drift and noise amplitude
    fn series(&mut self, n: usize) -> Vec<f64> {
        let level = self.next_f64() * 100.0;
        let drift = (self.next_f64() - 0.5) * 4.0;
        let noise = self.next_f64() * 20.0;
        (0..n)
            .map(|i| (level + drift * i as f64 + (self.next_f64() - 0.5) * noise).max(0.0))
            .collect()
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

fn samples(values: &[f64]) -> Vec<MetricSample> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| MetricSample {
            timestamp: now() - Duration::hours((values.len() - i) as i64),
            value: *v,
        })
        .collect()
}

const ITERATIONS: u64 = 200;

// ============================================================================
// FORECAST
// ============================================================================

#[test]
fn prop_forecast_shape_and_intervals() {
    let mut rng = TestRng::new(0x5eed_f0ca);

    for _ in 0..ITERATIONS {
        let n = rng.next_range(20, 120) as usize;
        let horizon = rng.next_range(1, 91) as usize;
        let values = rng.series(n);

        let f = build_forecast("metric", &values, horizon, now()).expect("enough history");
        assert_eq!(f.predicted_values.len(), horizon);
        assert_eq!(f.confidence_intervals.len(), horizon);

        for (p, (lo, hi)) in f.predicted_values.iter().zip(&f.confidence_intervals) {
            assert!(*p >= 0.0, "negative prediction {}", p);
            assert!(*lo >= 0.0, "negative lower bound {}", lo);
            assert!(lo <= p && p <= hi, "{} not in [{}, {}]", p, lo, hi);
        }

        let widths: Vec<f64> = f
            .predicted_values
            .iter()
            .zip(&f.confidence_intervals)
            .map(|(p, (_, hi))| hi - p)
            .collect();
        assert!(widths.windows(2).all(|w| w[1] >= w[0]));
    }
}

#[test]
fn prop_forecast_requires_twenty_points() {
    let mut rng = TestRng::new(7);
    for n in 0..20 {
        let values = rng.series(n);
        assert!(build_forecast("metric", &values, 7, now()).is_none());
    }
}

// ============================================================================
// TRENDS
// ============================================================================

#[test]
fn prop_trend_bounds() {
    let mut rng = TestRng::new(0xabcdef);

    for _ in 0..ITERATIONS {
        let n = rng.next_range(10, 200) as usize;
        let values = rng.series(n);
        let t = compute_trend(
            "metric",
            TimePeriod::days(7),
            &values,
            None,
            Polarity::HigherIsWorse,
            now(),
        );

        assert!((0.0..=1.0).contains(&t.confidence));
        assert!((0.0..=1.0).contains(&t.correlation));
        assert!((0.0..=1.0).contains(&t.trend_strength));
        assert!(t.volatility >= 0.0);
        assert_eq!(t.data_points, n);
    }
}

#[test]
fn prop_trend_severity_monotonic_in_slope() {
    let mut previous = None;
    for step in 1..60 {
        let slope = step as f64 * 0.02;
        let values: Vec<f64> = (0..30).map(|i| 10.0 + slope * i as f64).collect();
        let t = compute_trend(
            "metric",
            TimePeriod::days(7),
            &values,
            None,
            Polarity::HigherIsWorse,
            now(),
        );
        if let Some(prev) = previous {
            assert!(t.severity >= prev, "severity fell at slope {}", slope);
        }
        previous = Some(t.severity);
    }
}

// ============================================================================
// ANOMALIES
// ============================================================================

#[test]
fn prop_constant_series_has_no_anomalies() {
    let mut rng = TestRng::new(42);

    for _ in 0..ITERATIONS {
        let n = rng.next_range(10, 100) as usize;
        let level = rng.next_f64() * 1000.0;
        let values = vec![level; n];
        assert!(detect_in_samples("metric", &samples(&values), 2.5, now()).is_empty());
    }
}

#[test]
fn prop_anomaly_confidence_bounds() {
    let mut rng = TestRng::new(0xfeed);

    for _ in 0..ITERATIONS {
        let n = rng.next_range(10, 100) as usize;
        let mut values = rng.series(n);
        let spike_at = rng.next_range(0, n as u64) as usize;
        values[spike_at] += 500.0;

        for a in detect_in_samples("metric", &samples(&values), 2.5, now()) {
            assert!((0.0..=1.0).contains(&a.confidence));
            assert!(a.deviation_score.is_finite());
            assert!(a.sample_index < n);
        }
    }
}

// ============================================================================
// DETERMINISM
// ============================================================================

#[test]
fn prop_outputs_are_deterministic() {
    let mut rng = TestRng::new(99);

    for _ in 0..50 {
        let n = rng.next_range(20, 80) as usize;
        let values = rng.series(n);
        let s = samples(&values);

        assert_eq!(
            build_forecast("metric", &values, 14, now()),
            build_forecast("metric", &values, 14, now())
        );
        assert_eq!(
            detect_in_samples("metric", &s, 2.5, now()),
            detect_in_samples("metric", &s, 2.5, now())
        );
    }
}
