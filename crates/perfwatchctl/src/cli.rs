//! CLI - Command-line argument parsing
//!
//! Defines the CLI structure using clap.
//! Keeps argument parsing separate from execution logic.

use clap::{Parser, Subcommand};
use perfwatch_common::{InsightCategory, Priority, RecordKind, Severity, TimePeriod};
use std::path::PathBuf;

/// Perfwatch CLI
#[derive(Parser)]
#[command(name = "perfwatchctl")]
#[command(about = "Perfwatch - trend, anomaly and forecast analysis over metric history", long_about = None)]
#[command(version)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Config file (overrides $PERFWATCH_CONFIG and defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// JSONL metric samples: {"metric": .., "timestamp": .., "value": ..} per line
    #[arg(long, global = true)]
    pub samples: Option<PathBuf>,

    /// JSON object mapping metric name to {"mean", "std", "p95"}
    #[arg(long, global = true)]
    pub baselines: Option<PathBuf>,

    /// Directory for persisted results (overrides $PERFWATCH_STATE_DIR)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Output JSON only
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Analyze metric trends
    Analyze {
        /// Metric to analyze (repeatable, default: all)
        #[arg(long = "metric")]
        metrics: Vec<String>,

        /// Analysis window, e.g. 24h, 7d, 2w
        #[arg(long, default_value = "7d")]
        period: TimePeriod,

        /// Hide trends below this severity
        #[arg(long, value_parser = parse_severity)]
        min_severity: Option<Severity>,
    },

    /// Detect anomalies
    Anomalies {
        /// Metric to scan (repeatable, default: all)
        #[arg(long = "metric")]
        metrics: Vec<String>,

        /// Lookback window, e.g. 24h, 3d
        #[arg(long, default_value = "24h")]
        period: TimePeriod,

        /// Hide anomalies below this severity
        #[arg(long, value_parser = parse_severity)]
        min_severity: Option<Severity>,
    },

    /// Forecast one metric
    Forecast {
        /// Metric name
        metric: String,

        /// Days to forecast (default: forecast_horizon_days from config)
        #[arg(long)]
        horizon: Option<usize>,
    },

    /// Generate prioritized insights
    Insights {
        /// Lookback window in whole days, e.g. 7d, 2w
        #[arg(long, default_value = "7d")]
        period: TimePeriod,

        /// Hide insights below this priority
        #[arg(long, value_parser = parse_priority)]
        min_priority: Option<Priority>,

        /// Only show one category
        #[arg(long, value_parser = parse_category)]
        category: Option<InsightCategory>,
    },

    /// Show persisted results
    History {
        /// Record kind: trends, anomalies, forecasts, insights (default: all)
        #[arg(value_parser = parse_kind)]
        kind: Option<RecordKind>,

        /// Only records touching this metric (repeatable)
        #[arg(long = "metric")]
        metrics: Vec<String>,

        /// Most recent records to show per kind
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    Severity::parse(s).ok_or_else(|| format!("unknown severity '{}' (low, medium, high, critical)", s))
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::parse(s).ok_or_else(|| format!("unknown priority '{}' (low, medium, high, critical)", s))
}

fn parse_category(s: &str) -> Result<InsightCategory, String> {
    InsightCategory::parse(s).ok_or_else(|| {
        format!(
            "unknown category '{}' (optimization, capacity, reliability, efficiency)",
            s
        )
    })
}

fn parse_kind(s: &str) -> Result<RecordKind, String> {
    RecordKind::parse(s)
        .ok_or_else(|| format!("unknown record kind '{}' (trends, anomalies, forecasts, insights)", s))
}
