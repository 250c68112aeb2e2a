//! Persistence Sink - append-only output log
//!
//! Every trend, anomaly, forecast and insight produced by the analyzers is
//! handed to a sink. The file sink writes one JSON object per line, tagged
//! with its `kind`, into a per-kind JSONL file:
//!
//! - `trends.jsonl`
//! - `anomalies.jsonl`
//! - `forecasts.jsonl`
//! - `insights.jsonl`
//!
//! Retention is bounded by entry count per file. There is no update or
//! delete. Sink failures are logged and never abort analysis.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AnalyticsError, Result};
use crate::types::{AnomalyDetection, PerformanceForecast, PerformanceInsight, TrendAnalysis};

/// Default retention per file
const DEFAULT_RETENTION_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Trend,
    Anomaly,
    Forecast,
    Insight,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Trend,
        RecordKind::Anomaly,
        RecordKind::Forecast,
        RecordKind::Insight,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            RecordKind::Trend => "trends.jsonl",
            RecordKind::Anomaly => "anomalies.jsonl",
            RecordKind::Forecast => "forecasts.jsonl",
            RecordKind::Insight => "insights.jsonl",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trend" | "trends" => Some(RecordKind::Trend),
            "anomaly" | "anomalies" => Some(RecordKind::Anomaly),
            "forecast" | "forecasts" => Some(RecordKind::Forecast),
            "insight" | "insights" => Some(RecordKind::Insight),
            _ => None,
        }
    }
}

/// One persisted output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisRecord {
    Trend(TrendAnalysis),
    Anomaly(AnomalyDetection),
    Forecast(PerformanceForecast),
    Insight(PerformanceInsight),
}

impl AnalysisRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            AnalysisRecord::Trend(_) => RecordKind::Trend,
            AnalysisRecord::Anomaly(_) => RecordKind::Anomaly,
            AnalysisRecord::Forecast(_) => RecordKind::Forecast,
            AnalysisRecord::Insight(_) => RecordKind::Insight,
        }
    }

    pub fn metric_names(&self) -> Vec<&str> {
        match self {
            AnalysisRecord::Trend(t) => vec![t.metric_name.as_str()],
            AnalysisRecord::Anomaly(a) => vec![a.metric_name.as_str()],
            AnalysisRecord::Forecast(f) => vec![f.metric_name.as_str()],
            AnalysisRecord::Insight(i) => i.affected_metrics.iter().map(String::as_str).collect(),
        }
    }
}

pub trait PersistenceSink: Send + Sync {
    fn append(&self, record: &AnalysisRecord) -> Result<()>;
}

/// Append a record, logging instead of failing
pub fn safe_append(sink: &dyn PersistenceSink, record: &AnalysisRecord) {
    if let Err(e) = sink.append(record) {
        warn!(
            "Sink: Failed to append {:?} record: {}. Output log will be incomplete.",
            record.kind(),
            e
        );
    }
}

// ============================================================================
// JSONL FILE SINK
// ============================================================================

pub struct JsonlSink {
    dir: PathBuf,
    max_entries: usize,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    /// Create a sink rooted at `dir`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            AnalyticsError::Sink(format!("Failed to create sink directory {:?}: {}", dir, e))
        })?;

        Ok(Self {
            dir,
            max_entries: DEFAULT_RETENTION_ENTRIES,
            write_lock: Mutex::new(()),
        })
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max.max(1);
        self
    }

    pub fn path_for(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Load every stored record of one kind, oldest first
    ///
    /// Corrupted lines are skipped.
    pub fn load(&self, kind: RecordKind) -> Result<Vec<AnalysisRecord>> {
        let path = self.path_for(kind);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)
            .map_err(|e| AnalyticsError::Sink(format!("Failed to open {:?}: {}", path, e)))?;

        let mut records = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("Sink: Skipping corrupted line {} in {:?}: {}", line_num + 1, path, e);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AnalysisRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Sink: Skipping unparseable line {} in {:?}: {}", line_num + 1, path, e);
                }
            }
        }

        debug!("Sink: Loaded {} records from {:?}", records.len(), path);
        Ok(records)
    }

    fn count_lines(path: &Path) -> Result<usize> {
        let file = File::open(path)?;
        Ok(BufReader::new(file).lines().count())
    }

    /// Keep only the newest `max_entries` lines
    fn rotate_if_needed(&self, path: &Path) -> Result<()> {
        let total = Self::count_lines(path)?;
        if total <= self.max_entries {
            return Ok(());
        }

        debug!("Sink: Rotating {:?} ({} entries, max {})", path, total, self.max_entries);

        let skip = total - self.max_entries;
        let reader = BufReader::new(File::open(path)?);
        let temp_path = path.with_extension("jsonl.tmp");
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        for line in reader.lines().skip(skip) {
            writeln!(writer, "{}", line?)?;
        }
        writer.flush()?;

        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

impl PersistenceSink for JsonlSink {
    fn append(&self, record: &AnalysisRecord) -> Result<()> {
        let json_line = serde_json::to_string(record)
            .map_err(|e| AnalyticsError::Sink(format!("Failed to serialize record: {}", e)))?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.path_for(record.kind());

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AnalyticsError::Sink(format!("Failed to open {:?}: {}", path, e)))?;

        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", json_line)?;
        writer.flush()?;
        drop(writer);

        self.rotate_if_needed(&path)
    }
}

// ============================================================================
// IN-MEMORY AND NULL SINKS
// ============================================================================

/// Keeps records in memory (tests, one-shot CLI runs)
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AnalysisRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AnalysisRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, kind: RecordKind) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.kind() == kind)
            .count()
    }
}

impl PersistenceSink for MemorySink {
    fn append(&self, record: &AnalysisRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PersistenceSink for NullSink {
    fn append(&self, _record: &AnalysisRecord) -> Result<()> {
        Ok(())
    }
}
