//! Command implementations
//!
//! Each command builds an [`AnalysisContext`] from the global flags, runs one
//! library entry point and hands the result to [`crate::output`].

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use perfwatch_common::{
    anomaly, forecast, insights, trend, AnalysisContext, AnalysisRecord, AnalyticsConfig,
    InMemoryBaselines, InMemoryHistory, InsightCategory, JsonlSink, NullSink, PersistenceSink,
    Priority, RecordKind, Severity, TimePeriod,
};

use crate::cli::Cli;
use crate::output;

/// Global options shared by every command
pub struct Globals {
    pub config: Option<PathBuf>,
    pub samples: Option<PathBuf>,
    pub baselines: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub json: bool,
}

impl From<&Cli> for Globals {
    fn from(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            samples: cli.samples.clone(),
            baselines: cli.baselines.clone(),
            state_dir: cli.state_dir.clone(),
            json: cli.json,
        }
    }
}

/// Discover the results directory
///
/// Priority:
/// 1. --state-dir
/// 2. $PERFWATCH_STATE_DIR
/// 3. $XDG_STATE_HOME/perfwatch
/// 4. ~/.local/state/perfwatch
fn state_dir(globals: &Globals) -> Option<PathBuf> {
    if let Some(dir) = &globals.state_dir {
        return Some(dir.clone());
    }
    if let Ok(dir) = std::env::var("PERFWATCH_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        return Some(Path::new(&xdg_state).join("perfwatch"));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| Path::new(&home).join(".local").join("state").join("perfwatch"))
}

fn load_config(globals: &Globals) -> Result<AnalyticsConfig> {
    match &globals.config {
        Some(path) => AnalyticsConfig::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => AnalyticsConfig::load().context("Failed to load config"),
    }
}

/// Results go to the state directory; an unusable one disables persistence
fn open_sink(globals: &Globals) -> Arc<dyn PersistenceSink> {
    let Some(dir) = state_dir(globals) else {
        warn!("No state directory available, results will not be persisted");
        return Arc::new(NullSink);
    };

    match JsonlSink::new(&dir) {
        Ok(sink) => {
            debug!("Persisting results under {}", dir.display());
            Arc::new(sink)
        }
        Err(e) => {
            warn!("Results will not be persisted: {}", e);
            Arc::new(NullSink)
        }
    }
}

fn build_context(globals: &Globals) -> Result<AnalysisContext> {
    let config = load_config(globals)?;

    let samples_path = match &globals.samples {
        Some(path) => path.clone(),
        None => match std::env::var("PERFWATCH_SAMPLES") {
            Ok(path) => PathBuf::from(path),
            Err(_) => bail!("No sample source: pass --samples <file.jsonl> or set $PERFWATCH_SAMPLES"),
        },
    };
    let history = InMemoryHistory::from_jsonl(&samples_path)
        .with_context(|| format!("Failed to read samples from {}", samples_path.display()))?;

    let baselines = match &globals.baselines {
        Some(path) => InMemoryBaselines::from_json_file(path)
            .with_context(|| format!("Failed to read baselines from {}", path.display()))?,
        None => InMemoryBaselines::new(),
    };

    Ok(AnalysisContext::new(config, Arc::new(history))
        .with_baselines(Arc::new(baselines))
        .with_sink(open_sink(globals)))
}

fn metric_filter(metrics: &[String]) -> Option<&[String]> {
    if metrics.is_empty() {
        None
    } else {
        Some(metrics)
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

pub fn analyze(
    globals: &Globals,
    metrics: &[String],
    period: TimePeriod,
    min_severity: Option<Severity>,
) -> Result<()> {
    let ctx = build_context(globals)?;
    let mut batch = trend::analyze(&ctx, metric_filter(metrics), period)?;

    if let Some(min) = min_severity {
        batch.items.retain(|t| t.severity >= min);
    }

    if globals.json {
        output::print_json(&batch)
    } else {
        output::print_trends(&batch);
        Ok(())
    }
}

pub fn anomalies(
    globals: &Globals,
    metrics: &[String],
    period: TimePeriod,
    min_severity: Option<Severity>,
) -> Result<()> {
    let hours = u32::try_from(period.duration().num_hours())
        .context("Lookback period is too long")?
        .max(1);

    let ctx = build_context(globals)?;
    let mut batch = anomaly::detect(&ctx, metric_filter(metrics), hours)?;

    if let Some(min) = min_severity {
        batch.items.retain(|a| a.severity >= min);
    }

    if globals.json {
        output::print_json(&batch)
    } else {
        output::print_anomalies(&batch);
        Ok(())
    }
}

pub fn forecast(globals: &Globals, metric: &str, horizon: Option<usize>) -> Result<()> {
    let ctx = build_context(globals)?;
    let result = match horizon {
        Some(days) => forecast::forecast(&ctx, metric, days),
        None => forecast::forecast_default(&ctx, metric),
    }
    .with_context(|| format!("Failed to forecast {}", metric))?;

    if globals.json {
        output::print_json(&result)
    } else {
        output::print_forecast(metric, result.as_ref());
        Ok(())
    }
}

pub fn insights(
    globals: &Globals,
    period: TimePeriod,
    min_priority: Option<Priority>,
    category: Option<InsightCategory>,
) -> Result<()> {
    let days = u32::try_from(period.duration().num_days())
        .context("Lookback period is too long")?
        .max(1);

    let ctx = build_context(globals)?;
    let mut batch = insights::generate(&ctx, days)?;

    if let Some(min) = min_priority {
        batch.items.retain(|i| i.priority >= min);
    }
    if let Some(category) = category {
        batch.items.retain(|i| i.category == category);
    }

    if globals.json {
        output::print_json(&batch)
    } else {
        output::print_insights(&batch);
        Ok(())
    }
}

/// Keep the newest `limit` records touching any of `metrics`
fn select_records(
    mut records: Vec<AnalysisRecord>,
    metrics: &[String],
    limit: usize,
) -> Vec<AnalysisRecord> {
    if !metrics.is_empty() {
        records.retain(|r| {
            r.metric_names()
                .iter()
                .any(|name| metrics.iter().any(|m| m == name))
        });
    }
    let skip = records.len().saturating_sub(limit);
    records.split_off(skip)
}

pub fn history(
    globals: &Globals,
    kind: Option<RecordKind>,
    metrics: &[String],
    limit: usize,
) -> Result<()> {
    let dir = state_dir(globals)
        .context("No state directory: pass --state-dir or set $PERFWATCH_STATE_DIR")?;
    let sink = JsonlSink::new(&dir)
        .with_context(|| format!("Failed to open state directory {}", dir.display()))?;

    let kinds: Vec<RecordKind> = match kind {
        Some(k) => vec![k],
        None => RecordKind::ALL.to_vec(),
    };

    let mut records = Vec::new();
    for k in kinds {
        let stored = sink
            .load(k)
            .with_context(|| format!("Failed to read {}", sink.path_for(k).display()))?;
        records.extend(select_records(stored, metrics, limit));
    }

    if globals.json {
        output::print_json(&records)
    } else {
        output::print_records(&records);
        Ok(())
    }
}
