//! Output formatting - plain ASCII terminal output or JSON

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;

use perfwatch_common::{
    AnalysisBatch, AnalysisRecord, AnomalyDetection, ForecastConfidence, PerformanceForecast,
    PerformanceInsight, Priority, Severity, SkipReason, SkippedMetric, TrendAnalysis,
    TrendDirection,
};

const THIN_SEP: &str = "------------------------------------------------------------";

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Labels are padded to `width` before colouring so escape codes don't
/// count toward column widths
fn severity_label(s: Severity, width: usize) -> String {
    let text = format!("{:<width$}", s.as_str());
    match s {
        Severity::Critical => text.bright_red().bold().to_string(),
        Severity::High => text.red().to_string(),
        Severity::Medium => text.yellow().to_string(),
        Severity::Low => text.green().to_string(),
    }
}

fn priority_label(p: Priority) -> String {
    let text = p.as_str().to_uppercase();
    match p {
        Priority::Critical => text.bright_red().bold().to_string(),
        Priority::High => text.red().to_string(),
        Priority::Medium => text.yellow().to_string(),
        Priority::Low => text.green().to_string(),
    }
}

fn direction_label(d: TrendDirection, width: usize) -> String {
    let text = format!("{:<width$}", d.as_str());
    match d {
        TrendDirection::Degrading => text.red().to_string(),
        TrendDirection::Improving => text.green().to_string(),
        TrendDirection::Stable => text,
        TrendDirection::Volatile | TrendDirection::Unknown => text.dimmed().to_string(),
    }
}

fn confidence_label(c: ForecastConfidence) -> String {
    if c.is_actionable() {
        c.as_str().green().to_string()
    } else {
        c.as_str().yellow().to_string()
    }
}

fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", THIN_SEP);
}

pub fn print_skipped(skipped: &[SkippedMetric]) {
    if skipped.is_empty() {
        return;
    }
    println!();
    println!("{}", "[SKIPPED]".dimmed());
    for s in skipped {
        let reason = match &s.reason {
            SkipReason::InsufficientData {
                required,
                available,
            } => format!("{} of {} required points", available, required),
            SkipReason::Unavailable { message } => message.clone(),
        };
        println!("  {:<24} {}", s.metric, reason.dimmed());
    }
}

pub fn print_trends(batch: &AnalysisBatch<TrendAnalysis>) {
    header("  Trends");
    if batch.is_empty() {
        println!("  No trends to report.");
    }

    for t in &batch.items {
        println!(
            "  {:<24} {} {} {:+8.1}%  slope {:.3}  conf {:.2}  ({} pts, {})",
            t.metric_name,
            direction_label(t.direction, 10),
            severity_label(t.severity, 9),
            t.change_percent,
            t.slope,
            t.confidence,
            t.data_points,
            t.time_period
        );
    }

    print_skipped(&batch.skipped);
    println!();
}

pub fn print_anomalies(batch: &AnalysisBatch<AnomalyDetection>) {
    header("  Anomalies");
    if batch.is_empty() {
        println!("  No anomalies detected.");
    }

    for a in &batch.items {
        println!(
            "  {}  {:<24} {:<8} {} value {:.2} (expected {:.2}, score {:.2}) [{}]",
            a.anomaly_timestamp.format("%Y-%m-%d %H:%M"),
            a.metric_name,
            a.anomaly_type.as_str(),
            severity_label(a.severity, 9),
            a.anomaly_value,
            a.expected_value,
            a.deviation_score,
            a.detection_method.dimmed()
        );
    }

    print_skipped(&batch.skipped);
    println!();
}

pub fn print_forecast(metric: &str, forecast: Option<&PerformanceForecast>) {
    header(&format!("  Forecast: {}", metric));

    let Some(f) = forecast else {
        println!("  Not enough history to forecast {}.", metric);
        println!();
        return;
    };

    println!(
        "  Horizon: {} days   Confidence: {}   History: {} points",
        f.horizon,
        confidence_label(f.forecast_confidence),
        f.history_points
    );
    println!("  {}", f.methodology.dimmed());
    println!();

    for (day, (value, (lo, hi))) in f
        .predicted_values
        .iter()
        .zip(&f.confidence_intervals)
        .enumerate()
    {
        println!("  day {:>3}  {:>10.2}  [{:.2} .. {:.2}]", day + 1, value, lo, hi);
    }

    if !f.risk_factors.is_empty() {
        println!();
        println!("{}", "[RISKS]".yellow());
        for r in &f.risk_factors {
            println!("  * {}", r);
        }
    }

    if !f.recommendations.is_empty() {
        println!();
        println!("{}", "[RECOMMENDATIONS]".cyan());
        for r in &f.recommendations {
            println!("  * {}", r);
        }
    }
    println!();
}

pub fn print_insights(batch: &AnalysisBatch<PerformanceInsight>) {
    header("  Insights");
    if batch.is_empty() {
        println!("  Nothing to report.");
    }

    for (n, i) in batch.items.iter().enumerate() {
        println!();
        println!(
            "  {}. [{}] {} ({})",
            n + 1,
            priority_label(i.priority),
            i.title.bold(),
            i.category
        );
        println!("     {}", i.description);
        for r in &i.recommendations {
            println!("     * {}", r);
        }
        println!(
            "     {}",
            format!("impact: {}  effort: {:?}", i.estimated_impact, i.implementation_effort)
                .dimmed()
        );
    }

    print_skipped(&batch.skipped);
    println!();
}

fn record_line(record: &AnalysisRecord) -> String {
    match record {
        AnalysisRecord::Trend(t) => format!(
            "{}  trend     {:<24} {} {} {:+.1}%",
            t.timestamp.to_rfc3339(),
            t.metric_name,
            direction_label(t.direction, 0),
            severity_label(t.severity, 0),
            t.change_percent
        ),
        AnalysisRecord::Anomaly(a) => format!(
            "{}  anomaly   {:<24} {} {} via {}",
            a.detected_at.to_rfc3339(),
            a.metric_name,
            a.anomaly_type,
            severity_label(a.severity, 0),
            a.detection_method
        ),
        AnalysisRecord::Forecast(f) => format!(
            "{}  forecast  {:<24} {} days, {}",
            f.generated_at.to_rfc3339(),
            f.metric_name,
            f.horizon,
            confidence_label(f.forecast_confidence)
        ),
        AnalysisRecord::Insight(i) => format!(
            "{}  insight   {:<24} [{}] {}",
            i.generated_at.to_rfc3339(),
            i.affected_metrics.join(","),
            priority_label(i.priority),
            i.title
        ),
    }
}

pub fn print_records(records: &[AnalysisRecord]) {
    header("  History");
    if records.is_empty() {
        println!("  No stored results.");
    }
    for r in records {
        println!("  {}", record_line(r));
    }
    println!();
}
