//! Insight Generator
//!
//! Synthesizes trends, anomalies and forecasts into prioritized,
//! categorized recommendations. Rules:
//!
//! - degrading trend, severity HIGH/CRITICAL -> optimization
//! - improving trend, confidence > 0.7 -> efficiency (low)
//! - >= 3 anomalies sharing (metric, type) -> reliability
//! - degrading trend, confidence > 0.6, confident 90-day forecast crossing
//!   a hard limit -> capacity
//!
//! Output order is a stable sort on (priority rank, category rank), both
//! descending, so ties keep generation order.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::anomaly;
use crate::context::{AnalysisBatch, AnalysisContext, HistoryCache};
use crate::error::Result;
use crate::forecast;
use crate::period::TimePeriod;
use crate::sink::AnalysisRecord;
use crate::trend;
use crate::types::{
    AnomalyDetection, AnomalyType, ImplementationEffort, InsightCategory, InsightEvidence,
    PerformanceInsight, Priority, Severity, TrendAnalysis, TrendDirection,
};

/// Improving trends above this confidence become efficiency insights
const EFFICIENCY_CONFIDENCE: f64 = 0.7;
/// Degrading trends above this confidence get a capacity forecast
const CAPACITY_CONFIDENCE: f64 = 0.6;
/// Anomalies of one type on one metric needed for a reliability insight
const RECURRING_ANOMALIES: usize = 3;
/// Forecast horizon for capacity planning
const CAPACITY_HORIZON_DAYS: usize = 90;
/// Crossing the limit within this many days is critical
const CAPACITY_CRITICAL_DAYS: usize = 14;

// ============================================================================
// RECOMMENDATION TABLES
// ============================================================================

struct Playbook {
    keywords: &'static [&'static str],
    actions: &'static [&'static str],
}

const OPTIMIZATION_PLAYBOOKS: &[Playbook] = &[
    Playbook {
        keywords: &["cpu"],
        actions: &[
            "Profile CPU-heavy code paths and hot loops",
            "Review recent deployments for busy polling or inefficient algorithms",
            "Consider horizontal scaling or redistributing load",
        ],
    },
    Playbook {
        keywords: &["memory", "mem_"],
        actions: &[
            "Check long-running processes for memory leaks",
            "Tune cache sizes and object pooling",
            "Review allocator and garbage collection settings",
        ],
    },
    Playbook {
        keywords: &["latency", "response_time", "duration"],
        actions: &[
            "Add caching for frequently requested data",
            "Review slow database queries and missing indexes",
            "Check downstream dependencies and network hops",
        ],
    },
];

const GENERIC_ACTIONS: &[&str] = &[
    "Investigate changes deployed since the trend started",
    "Add alerting on this metric before it becomes critical",
    "Review resource allocation for the affected service",
];

fn optimization_actions(metric: &str) -> &'static [&'static str] {
    let name = metric.to_ascii_lowercase();
    OPTIMIZATION_PLAYBOOKS
        .iter()
        .find(|p| p.keywords.iter().any(|k| name.contains(k)))
        .map(|p| p.actions)
        .unwrap_or(GENERIC_ACTIONS)
}

fn reliability_actions(anomaly_type: AnomalyType) -> &'static [&'static str] {
    match anomaly_type {
        AnomalyType::Spike => &[
            "Correlate spikes with deployments, scheduled jobs and traffic bursts",
            "Add rate limiting or request smoothing in front of the service",
        ],
        AnomalyType::Drop => &[
            "Check for partial outages, failed health checks or dropped traffic",
            "Verify upstream producers and load balancer membership",
        ],
        AnomalyType::Outlier => &[
            "Inspect the outlying samples for collection errors or rare workloads",
            "Add per-request tracing around the affected periods",
        ],
        AnomalyType::Drift => &[
            "Investigate gradual baseline shifts such as data growth or configuration drift",
            "Re-baseline the metric once the cause is understood",
        ],
    }
}

fn insight_id(rule: &str, metric: &str, detail: &str) -> String {
    let key = format!("{}:{}:{}", rule, metric, detail);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

fn trend_evidence(t: &TrendAnalysis) -> InsightEvidence {
    let mut evidence = InsightEvidence {
        trend_direction: Some(t.direction),
        trend_severity: Some(t.severity),
        slope: Some(t.slope),
        confidence: Some(t.confidence),
        change_percent: Some(t.change_percent),
        ..Default::default()
    };
    evidence
        .extra
        .insert("time_period".to_string(), serde_json::Value::from(t.time_period.label()));
    evidence
}

// ============================================================================
// RULES
// ============================================================================

type TrendRule = fn(&TrendAnalysis, DateTime<Utc>) -> Option<PerformanceInsight>;

/// Rules applied to every trend, in generation order
const TREND_RULES: &[TrendRule] = &[degrading_trend_rule, improving_trend_rule];

fn degrading_trend_rule(t: &TrendAnalysis, now: DateTime<Utc>) -> Option<PerformanceInsight> {
    if t.direction != TrendDirection::Degrading
        || !matches!(t.severity, Severity::High | Severity::Critical)
    {
        return None;
    }

    Some(PerformanceInsight {
        id: insight_id("degrading_trend", &t.metric_name, t.severity.as_str()),
        title: format!("{} is degrading", t.metric_name),
        description: format!(
            "{} changed {:+.1}% over {} ({} points, slope {:.3} per sample, confidence {:.0}%).",
            t.metric_name,
            t.change_percent,
            t.time_period,
            t.data_points,
            t.slope,
            t.confidence * 100.0
        ),
        category: InsightCategory::Optimization,
        priority: Priority::from(t.severity),
        affected_metrics: vec![t.metric_name.clone()],
        evidence: trend_evidence(t),
        recommendations: optimization_actions(&t.metric_name)
            .iter()
            .map(|a| a.to_string())
            .collect(),
        estimated_impact: format!(
            "Stops a {:.1}% {} drift in {}",
            t.change_percent.abs(),
            t.severity.as_str().to_ascii_lowercase(),
            t.metric_name
        ),
        implementation_effort: ImplementationEffort::Medium,
        generated_at: now,
    })
}

fn improving_trend_rule(t: &TrendAnalysis, now: DateTime<Utc>) -> Option<PerformanceInsight> {
    if t.direction != TrendDirection::Improving || t.confidence <= EFFICIENCY_CONFIDENCE {
        return None;
    }

    Some(PerformanceInsight {
        id: insight_id("improving_trend", &t.metric_name, ""),
        title: format!("{} is improving", t.metric_name),
        description: format!(
            "{} improved steadily over {} ({:+.1}%, confidence {:.0}%).",
            t.metric_name,
            t.time_period,
            t.change_percent,
            t.confidence * 100.0
        ),
        category: InsightCategory::Efficiency,
        priority: Priority::Low,
        affected_metrics: vec![t.metric_name.clone()],
        evidence: trend_evidence(t),
        recommendations: vec![
            format!("Document the changes that improved {}", t.metric_name),
            "Apply the same optimizations to related services".to_string(),
            "Consider reclaiming capacity freed by the improvement".to_string(),
        ],
        estimated_impact: "Frees capacity and informs future tuning".to_string(),
        implementation_effort: ImplementationEffort::Low,
        generated_at: now,
    })
}

/// Group anomalies by (metric, type), keeping first-seen order
fn group_anomalies(anomalies: &[AnomalyDetection]) -> Vec<((&str, AnomalyType), Vec<&AnomalyDetection>)> {
    let mut order: Vec<(&str, AnomalyType)> = Vec::new();
    let mut groups: HashMap<(&str, AnomalyType), Vec<&AnomalyDetection>> = HashMap::new();

    for a in anomalies {
        let key = (a.metric_name.as_str(), a.anomaly_type);
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(a);
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key).map(|g| (key, g)))
        .collect()
}

fn recurring_anomaly_rule(
    metric: &str,
    anomaly_type: AnomalyType,
    group: &[&AnomalyDetection],
    period: TimePeriod,
    now: DateTime<Utc>,
) -> Option<PerformanceInsight> {
    if group.len() < RECURRING_ANOMALIES {
        return None;
    }

    let any_critical = group.iter().any(|a| a.severity == Severity::Critical);
    let max_deviation = group
        .iter()
        .map(|a| a.deviation_score)
        .fold(0.0_f64, f64::max);

    let mut evidence = InsightEvidence {
        anomaly_type: Some(anomaly_type),
        anomaly_count: Some(group.len()),
        max_deviation: Some(max_deviation),
        ..Default::default()
    };
    let mut methods: Vec<&str> = group.iter().map(|a| a.detection_method.as_str()).collect();
    methods.sort_unstable();
    methods.dedup();
    evidence
        .extra
        .insert("detection_methods".to_string(), serde_json::Value::from(methods));

    let mut recommendations: Vec<String> = reliability_actions(anomaly_type)
        .iter()
        .map(|a| a.to_string())
        .collect();
    recommendations.push(format!("Alert on repeated {} events in {}", anomaly_type, metric));

    Some(PerformanceInsight {
        id: insight_id("recurring_anomaly", metric, anomaly_type.as_str()),
        title: format!("Recurring {} anomalies in {}", anomaly_type, metric),
        description: format!(
            "{} {} anomalies detected in {} over the last {} (max deviation {:.1}).",
            group.len(),
            anomaly_type,
            metric,
            period,
            max_deviation
        ),
        category: InsightCategory::Reliability,
        priority: if any_critical {
            Priority::High
        } else {
            Priority::Medium
        },
        affected_metrics: vec![metric.to_string()],
        evidence,
        recommendations,
        estimated_impact: format!("Fewer unexpected {} events in {}", anomaly_type, metric),
        implementation_effort: ImplementationEffort::Medium,
        generated_at: now,
    })
}

fn capacity_rule(
    ctx: &AnalysisContext,
    cache: &mut HistoryCache,
    t: &TrendAnalysis,
) -> Option<PerformanceInsight> {
    if t.direction != TrendDirection::Degrading || t.confidence <= CAPACITY_CONFIDENCE {
        return None;
    }
    let threshold = forecast::capacity_threshold(&t.metric_name)?;

    let forecast = match forecast::forecast_with_cache(ctx, cache, &t.metric_name, CAPACITY_HORIZON_DAYS) {
        Ok(Some(f)) => f,
        Ok(None) => return None,
        Err(e) => {
            warn!("Insights: Capacity forecast for {} failed: {}", t.metric_name, e);
            return None;
        }
    };

    if !forecast.forecast_confidence.is_actionable() {
        debug!(
            "Insights: {} forecast confidence {} too low for capacity planning",
            t.metric_name, forecast.forecast_confidence
        );
        return None;
    }

    let index = forecast.first_index_above(threshold)?;
    let days = index + 1;
    let peak = forecast.peak().unwrap_or(threshold);

    Some(PerformanceInsight {
        id: insight_id("capacity", &t.metric_name, &format!("{}", threshold)),
        title: format!("{} forecast to exceed {}", t.metric_name, threshold),
        description: format!(
            "At the current trend {} crosses {} in about {} days (peak {:.1} within {} days).",
            t.metric_name, threshold, days, peak, CAPACITY_HORIZON_DAYS
        ),
        category: InsightCategory::Capacity,
        priority: if days <= CAPACITY_CRITICAL_DAYS {
            Priority::Critical
        } else {
            Priority::High
        },
        affected_metrics: vec![t.metric_name.clone()],
        evidence: InsightEvidence {
            trend_direction: Some(t.direction),
            slope: Some(t.slope),
            confidence: Some(t.confidence),
            forecast_peak: Some(peak),
            threshold: Some(threshold),
            days_to_threshold: Some(days),
            forecast_confidence: Some(forecast.forecast_confidence),
            ..Default::default()
        },
        recommendations: vec![
            format!("Plan a capacity increase for {} within {} days", t.metric_name, days),
            "Review autoscaling limits and resource quotas".to_string(),
            "Identify workloads that can be optimized or moved".to_string(),
        ],
        estimated_impact: format!("Avoids saturation of {} before day {}", t.metric_name, days),
        implementation_effort: ImplementationEffort::High,
        generated_at: ctx.now(),
    })
}

/// Stable ordering by (priority rank desc, category rank desc)
pub fn sort_insights(insights: &mut [PerformanceInsight]) {
    insights.sort_by(|a, b| {
        (b.priority.rank(), b.category.rank()).cmp(&(a.priority.rank(), a.category.rank()))
    });
}

// ============================================================================
// ENTRY POINT
// ============================================================================

/// Generate insights from a fresh trend and anomaly pass over `lookback_days`
pub fn generate(
    ctx: &AnalysisContext,
    lookback_days: u32,
) -> Result<AnalysisBatch<PerformanceInsight>> {
    let mut batch = AnalysisBatch::default();
    if !ctx.config().stages.insight {
        debug!("Insight stage disabled, skipping generation");
        return Ok(batch);
    }

    let period = TimePeriod::days(lookback_days);
    let now = ctx.now();
    let mut cache = HistoryCache::new();

    let trends = trend::analyze_with_cache(ctx, &mut cache, None, period)?;
    let anomalies = anomaly::detect_with_cache(ctx, &mut cache, None, period)?;

    let mut insights: Vec<PerformanceInsight> = Vec::new();

    for t in &trends.items {
        insights.extend(TREND_RULES.iter().filter_map(|rule| rule(t, now)));
    }

    for ((metric, anomaly_type), group) in group_anomalies(&anomalies.items) {
        insights.extend(recurring_anomaly_rule(metric, anomaly_type, &group, period, now));
    }

    for t in &trends.items {
        insights.extend(capacity_rule(ctx, &mut cache, t));
    }

    sort_insights(&mut insights);

    for insight in &insights {
        ctx.record(AnalysisRecord::Insight(insight.clone()));
    }

    batch.skipped = trends.skipped;
    for skipped in anomalies.skipped {
        if !batch.skipped.iter().any(|s| s.metric == skipped.metric) {
            batch.skipped.push(skipped);
        }
    }
    batch.items = insights;

    info!(
        "Generated {} insights from {} trends and {} anomalies over {}",
        batch.items.len(),
        trends.items.len(),
        anomalies.items.len(),
        period
    );
    Ok(batch)
}
