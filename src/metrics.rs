use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use crate::analysis::shape::WebhookResponse;
use crate::normalize::normalize_all;
use crate::record::AnalysisResult;
use crate::telemetry::ctx::{LogCtx, OpMarker};
use crate::telemetry::ops::metrics::Phase as MetricsPhase;
use crate::telemetry::{self};

/// Summary statistics over one collection of records. Always rebuilt from
/// scratch; nothing here is updated in place.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchMetrics {
    pub total: usize,
    pub sentiment_counts: BTreeMap<String, usize>,
    pub archetype_counts: BTreeMap<String, usize>,
    pub avg_confidence: f64,
}

pub fn aggregate(results: &[AnalysisResult]) -> BatchMetrics {
    let mut sentiment_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut archetype_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut confidence_sum = 0.0;

    for r in results {
        *sentiment_counts.entry(r.sentiment.as_str().to_string()).or_insert(0) += 1;
        *archetype_counts.entry(r.archetype.clone()).or_insert(0) += 1;
        confidence_sum += r.confidence;
    }

    let total = results.len();
    let avg_confidence = if total == 0 { 0.0 } else { confidence_sum / total as f64 };
    BatchMetrics { total, sentiment_counts, archetype_counts, avg_confidence }
}

impl BatchMetrics {
    pub fn sentiment(&self, label: &str) -> usize {
        self.sentiment_counts.get(label).copied().unwrap_or(0)
    }

    /// (positive, neutral, negative)
    pub fn three_way(&self) -> (usize, usize, usize) {
        (self.sentiment("positive"), self.sentiment("neutral"), self.sentiment("negative"))
    }

    /// Labels outside the three-way breakdown (error, unknown, ...).
    pub fn other_sentiments(&self) -> Vec<(&str, usize)> {
        self.sentiment_counts
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "positive" | "neutral" | "negative"))
            .map(|(k, v)| (k.as_str(), *v))
            .collect()
    }

    /// Most frequent first; ties broken by name.
    pub fn archetypes_by_count(&self) -> Vec<(&str, usize)> {
        let mut out: Vec<(&str, usize)> = self.archetype_counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        out
    }
}

/// Human breakdown lines shared by `run` and `metrics`.
pub fn log_breakdown<O: OpMarker>(log: &LogCtx<O>, metrics: &BatchMetrics) {
    for (label, count) in metrics.other_sentiments() {
        log.info(format!("   {label}: {count}"));
    }
    let archetypes: Vec<String> = metrics.archetypes_by_count().iter().map(|(a, n)| format!("{a}={n}")).collect();
    if !archetypes.is_empty() {
        log.info(format!("🎭 Archetypes: {}", archetypes.join(", ")));
    }
}

/// feedpulse metrics <path>
#[derive(Args)]
pub struct MetricsCmd {
    /// JSON export written by `feedpulse run --export-json`
    pub path: PathBuf,
}

#[derive(Serialize)]
struct MetricsResult<'a> {
    path: String,
    shape: &'static str,
    metrics: &'a BatchMetrics,
}

pub async fn run(args: MetricsCmd) -> Result<()> {
    let log = telemetry::metrics();
    let _g = log.root_span_kv([("path", args.path.display().to_string())]).entered();

    let body: Value = {
        let _s = log.span(&MetricsPhase::Load).entered();
        let bytes = tokio::fs::read(&args.path).await.with_context(|| format!("read {}", args.path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", args.path.display()))?
    };
    let shape = WebhookResponse::parse(body).with_context(|| format!("load records from {}", args.path.display()))?;
    let shape_name = shape.shape_name();

    let results = {
        let _s = log.span(&MetricsPhase::Normalize).entered();
        normalize_all(&shape.into_records())
    };
    let metrics = {
        let _s = log.span(&MetricsPhase::Aggregate).entered();
        aggregate(&results)
    };

    let (positive, neutral, negative) = metrics.three_way();
    log.info_kv(
        &format!(
            "📊 {} record(s): positive={} neutral={} negative={} avg_confidence={:.2}",
            metrics.total, positive, neutral, negative, metrics.avg_confidence
        ),
        [("total", metrics.total.to_string()), ("shape", shape_name.to_string())],
    );
    log_breakdown(&log, &metrics);

    if telemetry::config::json_mode() {
        log.result(&MetricsResult { path: args.path.display().to_string(), shape: shape_name, metrics: &metrics })?;
    }
    Ok(())
}
