//! File-backed history and sink, end to end

use chrono::{Duration, TimeZone, Utc};
use perfwatch_common::{
    insights, trend, AnalysisContext, AnalysisRecord, AnalyticsConfig, FixedClock,
    InMemoryHistory, JsonlSink, RecordKind, TimePeriod, TrendDirection,
};
use std::fs;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

fn write_samples(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("samples.jsonl");
    let mut file = fs::File::create(&path).unwrap();
    let start = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();

    for i in 0..30 {
        let ts = (start + Duration::days(i)).to_rfc3339();
        let value = 20.0 + i as f64 * 30.0 / 29.0;
        writeln!(
            file,
            r#"{{"metric": "cpu_usage", "timestamp": "{}", "value": {}}}"#,
            ts, value
        )
        .unwrap();
    }
    // Dropped on load or by sanitization; the series must survive
    writeln!(file, "not json").unwrap();
    writeln!(
        file,
        r#"{{"metric": "cpu_usage", "timestamp": "yesterday", "value": 33.0}}"#
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"metric": "cpu_usage", "timestamp": "2025-05-10T12:00:00Z", "value": "NaN"}}"#
    )
    .unwrap();
    path
}

#[test]
fn test_jsonl_history_to_jsonl_sink() {
    let dir = TempDir::new().unwrap();
    let history = InMemoryHistory::from_jsonl(&write_samples(&dir)).unwrap();
    let sink = Arc::new(JsonlSink::new(dir.path().join("state")).unwrap());
    let ctx = AnalysisContext::new(AnalyticsConfig::default(), Arc::new(history))
        .with_sink(sink.clone())
        .with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        )));

    let trends = trend::analyze(&ctx, None, TimePeriod::days(30)).unwrap();
    assert_eq!(trends.len(), 1);
    assert_eq!(trends.items[0].data_points, 30);
    assert_eq!(trends.items[0].direction, TrendDirection::Degrading);

    let generated = insights::generate(&ctx, 30).unwrap();
    assert!(!generated.is_empty());

    let stored_trends = sink.load(RecordKind::Trend).unwrap();
    // one from analyze, one from the insight pass
    assert_eq!(stored_trends.len(), 2);
    assert!(matches!(stored_trends[0], AnalysisRecord::Trend(_)));

    let stored_insights = sink.load(RecordKind::Insight).unwrap();
    assert_eq!(stored_insights.len(), generated.len());
    for (stored, fresh) in stored_insights.iter().zip(&generated.items) {
        match stored {
            AnalysisRecord::Insight(i) => {
                assert_eq!(i.id, fresh.id);
                assert_eq!(i.priority, fresh.priority);
                assert_eq!(i.recommendations, fresh.recommendations);
            }
            other => panic!("unexpected record {:?}", other.kind()),
        }
    }

    let raw = fs::read_to_string(sink.path_for(RecordKind::Insight)).unwrap();
    let first: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
    assert_eq!(first["kind"], "insight");
    assert_eq!(first["generated_at"], "2025-06-01T00:00:00Z");
}

#[test]
fn test_config_file_drives_analysis() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
trend_min_points = 40

[stages]
forecast = false
"#,
    )
    .unwrap();

    let config = AnalyticsConfig::load_from(&config_path).unwrap();
    assert_eq!(config.trend_min_points, 40);
    assert!(!config.stages.forecast);
    assert!(config.stages.trend);

    let history = InMemoryHistory::from_jsonl(&write_samples(&dir)).unwrap();
    let ctx = AnalysisContext::new(config, Arc::new(history));
    let trends = trend::analyze(&ctx, None, TimePeriod::days(30)).unwrap();
    assert!(trends.is_empty());
    assert_eq!(trends.skipped.len(), 1);
}
