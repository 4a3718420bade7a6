use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use crate::analysis::webhook::DEFAULT_WEBHOOK_TIMEOUT;
use crate::analysis::Mode;
use crate::config::{self, BackendConfig, RunConfig};
use crate::export;
use crate::feeds::{HttpFeedSource, DEFAULT_FETCH_TIMEOUT};
use crate::llm::openai::OpenAiConfig;
use crate::metrics::log_breakdown;
use crate::telemetry::ops::run::Phase as RunPhase;
use crate::telemetry::{self};

mod context;
mod driver;
mod progress;

pub use context::{FeedFailure, RunContext, Stage};
pub use driver::{Pipeline, RunReport, RunState};
pub use progress::{LogProgress, ProgressSink};

#[derive(Args)]
pub struct RunCmd {
    /// Feed url; repeatable
    #[arg(long = "feed")] pub feeds: Vec<String>,
    /// File with one feed url per line
    #[arg(long)] pub feeds_file: Option<PathBuf>,
    /// Named feed list (see `feedpulse presets`); repeatable
    #[arg(long = "preset")] pub presets: Vec<String>,
    #[arg(long, default_value_t = config::DEFAULT_MAX_ARTICLES)] pub max_articles: usize,
    #[arg(long, value_enum, default_value_t = Mode::Direct)] pub backend: Mode,
    #[arg(long)] pub webhook_url: Option<String>,
    #[arg(long)] pub webhook_timeout_secs: Option<u64>,
    #[arg(long)] pub model: Option<String>,
    /// Pause after each model call, in ms (at least 500)
    #[arg(long, default_value_t = 1000)] pub delay_ms: u64,
    /// JSON export; a directory gets a timestamped file name
    #[arg(long)] pub export_json: Option<PathBuf>,
    #[arg(long)] pub export_csv: Option<PathBuf>,
    /// Rows in the overview table
    #[arg(long, default_value_t = 20)] pub top: usize,
    #[arg(long, default_value_t = false)] pub apply: bool,
}

#[derive(Serialize)]
struct RunPlan {
    mode: Mode,
    feeds: Vec<String>,
    max_articles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    problem: Option<String>,
}

#[derive(Serialize)]
struct RunResult<'a> {
    #[serde(flatten)]
    report: &'a RunReport,
    exports: Vec<String>,
}

#[derive(Serialize)]
struct RunFailed<'a> {
    mode: Mode,
    error: String,
    feed_failures: &'a [FeedFailure],
    stages: &'a [Stage],
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

/// Flags first, then environment, then defaults.
pub fn resolve_config(args: &RunCmd) -> Result<RunConfig> {
    let feeds = config::collect_feeds(&args.feeds, args.feeds_file.as_deref(), &args.presets)?;
    let backend = match args.backend {
        Mode::Direct => {
            let mut openai = OpenAiConfig::from_env();
            if let Some(model) = &args.model {
                openai.model = model.clone();
            }
            BackendConfig::Direct { openai, delay: Duration::from_millis(args.delay_ms) }
        }
        Mode::Webhook => {
            let url = args
                .webhook_url
                .clone()
                .or_else(|| std::env::var("FEEDPULSE_WEBHOOK_URL").ok())
                .unwrap_or_default();
            let timeout = args
                .webhook_timeout_secs
                .map(Duration::from_secs)
                .or_else(|| config::env_secs("FEEDPULSE_WEBHOOK_TIMEOUT_SECS"))
                .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT);
            BackendConfig::Webhook { url, timeout }
        }
    };
    Ok(RunConfig { feeds, max_articles: args.max_articles, backend })
}

pub async fn run(args: RunCmd) -> Result<()> {
    let log = telemetry::run();
    let _g = log.root_span_kv([
        ("apply", args.apply.to_string()),
        ("backend", args.backend.as_str().to_string()),
        ("max_articles", args.max_articles.to_string()),
    ]).entered();

    let cfg = { let _s = log.span(&RunPhase::Plan).entered(); resolve_config(&args)? };

    if !args.apply {
        let (model, webhook_url) = match &cfg.backend {
            BackendConfig::Direct { openai, .. } => (Some(openai.model.clone()), None),
            BackendConfig::Webhook { url, .. } => (None, Some(url.clone())),
        };
        let problem = cfg.validate().err().map(|e| e.to_string());
        if telemetry::config::json_mode() {
            let plan = RunPlan { mode: cfg.mode(), feeds: cfg.feeds.clone(), max_articles: cfg.max_articles, model, webhook_url, problem };
            log.plan(&plan)?;
        } else {
            log.info(format!("📝 Run plan — backend={} feeds={} max_articles={}", cfg.mode().as_str(), cfg.feeds.len(), cfg.max_articles));
            for f in &cfg.feeds { log.info(format!("  {f}")); }
            if let Some(m) = model { log.info(format!("  model={m}")); }
            if let Some(u) = webhook_url { log.info(format!("  webhook={u}")); }
            if let Some(p) = problem { log.warn(format!("⚠️  {p}")); }
            log.info("   Use --apply to execute.");
        }
        return Ok(());
    }

    // configuration problems stop the run before any network call
    let analyzer = cfg.build_analyzer()?;
    let source = HttpFeedSource::new(DEFAULT_FETCH_TIMEOUT)?;
    let mut pipeline = Pipeline::new(cfg.feeds.clone(), cfg.max_articles, Box::new(source), analyzer);
    log.info(format!("🚀 Analyzing {} feed(s) via {} (max {} article(s) each)", cfg.feeds.len(), pipeline.mode().as_str(), cfg.max_articles));

    let report: &RunReport = match pipeline.run(&LogProgress).await {
        RunState::Done(report) => report,
        RunState::Failed(failure) => {
            if telemetry::config::json_mode() {
                log.result(&RunFailed {
                    mode: failure.mode,
                    error: failure.error.to_string(),
                    feed_failures: &failure.feed_failures,
                    stages: &failure.stages,
                    started_at: failure.started_at,
                    finished_at: failure.finished_at,
                })?;
            }
            anyhow::bail!("{} analysis failed: {}", failure.mode.as_str(), failure.error);
        }
        RunState::Idle => anyhow::bail!("run did not start"),
    };

    log.info(format!("📋 Overview (first {} of {})", args.top.min(report.results.len()), report.results.len()));
    for row in export::overview_rows(&report.results, args.top) {
        log.info(format!("  [{}] {:.60} | {} {} | {}", row.sentiment, row.title, row.confidence, row.archetype, row.insight));
        if !row.summary.is_empty() { log.debug(format!("     {}", row.summary)); }
    }
    log.totals(&report.metrics);
    log_breakdown(&log, &report.metrics);
    if !report.feed_failures.is_empty() {
        log.warn(format!("⚠️  {} feed(s) could not be processed", report.feed_failures.len()));
    }

    let mut exports = Vec::new();
    let now = Utc::now();
    if let Some(arg) = &args.export_json {
        let _s = log.span_kv(&RunPhase::Export, [("format", "json".to_string())]).entered();
        let path = export::resolve_export_path(arg, "json", now);
        export::write_json(&path, &report.raw).with_context(|| format!("export json to {}", path.display()))?;
        log.info(format!("💾 Wrote {}", path.display()));
        exports.push(path.display().to_string());
    }
    if let Some(arg) = &args.export_csv {
        let _s = log.span_kv(&RunPhase::Export, [("format", "csv".to_string())]).entered();
        let path = export::resolve_export_path(arg, "csv", now);
        export::write_csv(&path, &report.results).with_context(|| format!("export csv to {}", path.display()))?;
        log.info(format!("💾 Wrote {}", path.display()));
        exports.push(path.display().to_string());
    }

    if telemetry::config::json_mode() {
        log.result(&RunResult { report, exports })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        run: RunCmd,
    }

    #[test]
    fn run_flags_default_to_a_plan_with_twenty_overview_rows() {
        let cli = Cli::try_parse_from(["feedpulse"]).unwrap();
        assert_eq!(cli.run.top, 20);
        assert_eq!(cli.run.max_articles, 10);
        assert!(!cli.run.apply);
    }
}
