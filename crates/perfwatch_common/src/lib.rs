//! Perfwatch Common - Performance analytics over metric history
//!
//! Trend analysis, anomaly detection, forecasting and insight generation.
//! Hosts supply history, baselines and a persistence sink through
//! [`AnalysisContext`]; every entry point is a pure function of that context.

pub mod anomaly;
pub mod baseline;
pub mod config;
pub mod context;
pub mod error;
pub mod forecast;
pub mod history;
pub mod insights;
pub mod period;
pub mod sink;
pub mod stats;
pub mod trend;
pub mod types;

pub use baseline::{Baseline, BaselineStore, InMemoryBaselines};
pub use config::{AnalyticsConfig, MetricSettings, Polarity, StageToggles};
pub use context::{AnalysisBatch, AnalysisContext, Clock, FixedClock, SkipReason, SkippedMetric, SystemClock};
pub use error::{AnalyticsError, Result};
pub use history::{InMemoryHistory, MetricHistory};
pub use period::{PeriodUnit, TimePeriod};
pub use sink::{AnalysisRecord, JsonlSink, MemorySink, NullSink, PersistenceSink, RecordKind};
pub use types::*;
