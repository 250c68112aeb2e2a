//! Analysis context and per-call plumbing
//!
//! The host builds one [`AnalysisContext`] and passes it into every entry
//! point. The context owns no mutable analysis state; everything cached
//! during a call lives in a [`HistoryCache`] that is dropped when the call
//! returns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::baseline::{BaselineStore, InMemoryBaselines};
use crate::config::AnalyticsConfig;
use crate::error::{AnalyticsError, Result};
use crate::history::{sanitize, MetricHistory};
use crate::period::TimePeriod;
use crate::sink::{safe_append, AnalysisRecord, NullSink, PersistenceSink};
use crate::types::MetricSample;

// ============================================================================
// CLOCK
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant (deterministic tests and replays)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

pub struct AnalysisContext {
    config: AnalyticsConfig,
    history: Arc<dyn MetricHistory>,
    baselines: Arc<dyn BaselineStore>,
    sink: Arc<dyn PersistenceSink>,
    clock: Arc<dyn Clock>,
}

impl AnalysisContext {
    /// Context with no baselines, a discarding sink and the system clock
    pub fn new(config: AnalyticsConfig, history: Arc<dyn MetricHistory>) -> Self {
        Self {
            config,
            history,
            baselines: Arc::new(InMemoryBaselines::new()),
            sink: Arc::new(NullSink),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_baselines(mut self, baselines: Arc<dyn BaselineStore>) -> Self {
        self.baselines = baselines;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn baselines(&self) -> &dyn BaselineStore {
        self.baselines.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn record(&self, record: AnalysisRecord) {
        safe_append(self.sink.as_ref(), &record);
    }

    /// Requested metrics, or every metric the provider knows
    pub(crate) fn resolve_metrics(&self, requested: Option<&[String]>) -> Result<Vec<String>> {
        match requested {
            Some(names) => Ok(names.to_vec()),
            None => self.history.metric_names(),
        }
    }
}

// ============================================================================
// PER-CALL CACHE
// ============================================================================

/// Sanitized history memoized for the duration of one call
#[derive(Default)]
pub(crate) struct HistoryCache {
    entries: HashMap<(String, TimePeriod), Vec<MetricSample>>,
}

impl HistoryCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn samples(
        &mut self,
        ctx: &AnalysisContext,
        metric: &str,
        period: TimePeriod,
    ) -> Result<&[MetricSample]> {
        let key = (metric.to_string(), period);
        if !self.entries.contains_key(&key) {
            let raw = ctx.history.fetch(metric, period)?;
            let samples = sanitize(metric, &raw);
            debug!("{}: {} usable samples over {}", metric, samples.len(), period);
            self.entries.insert(key.clone(), samples);
        }
        Ok(self.entries.get(&key).map(Vec::as_slice).unwrap_or(&[]))
    }
}

// ============================================================================
// BATCH RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientData { required: usize, available: usize },
    Unavailable { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedMetric {
    pub metric: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Results of one batch call plus the metrics that produced nothing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisBatch<T> {
    pub items: Vec<T>,
    pub skipped: Vec<SkippedMetric>,
}

impl<T> Default for AnalysisBatch<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> AnalysisBatch<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn skip(&mut self, metric: &str, error: AnalyticsError) {
        let reason = match error {
            AnalyticsError::InsufficientData {
                required,
                available,
                ..
            } => SkipReason::InsufficientData {
                required,
                available,
            },
            other => SkipReason::Unavailable {
                message: other.to_string(),
            },
        };
        self.skipped.push(SkippedMetric {
            metric: metric.to_string(),
            reason,
        });
    }
}
