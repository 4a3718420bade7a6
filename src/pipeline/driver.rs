use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::analysis::{Analyzer, BatchCallError, Mode};
use crate::feeds::FeedSource;
use crate::metrics::{aggregate, BatchMetrics};
use crate::record::AnalysisResult;
use crate::telemetry::ops::run::Phase as RunPhase;
use crate::telemetry::{self};

use super::context::{FeedFailure, RunContext, RunParts, Stage};
use super::progress::ProgressSink;

/// Outcome of a finished run.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub feeds: Vec<String>,
    pub max_articles: usize,
    pub results: Vec<AnalysisResult>,
    /// Records exactly as the backend produced them, for export.
    pub raw: Vec<Value>,
    pub metrics: BatchMetrics,
    pub feed_failures: Vec<FeedFailure>,
    pub stages: Vec<Stage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A run that ended in a batch-level failure. No records survive it.
#[derive(Debug)]
pub struct RunFailure {
    pub mode: Mode,
    pub error: BatchCallError,
    pub feed_failures: Vec<FeedFailure>,
    pub stages: Vec<Stage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum RunState {
    Idle,
    Done(Box<RunReport>),
    Failed(Box<RunFailure>),
}

/// Drives feeds through the configured analyzer and aggregates the outcome.
/// A pipeline can be run again; every run starts from `Idle`.
pub struct Pipeline {
    feeds: Vec<String>,
    max_articles: usize,
    source: Box<dyn FeedSource>,
    analyzer: Box<dyn Analyzer>,
    state: RunState,
}

impl Pipeline {
    pub fn new(feeds: Vec<String>, max_articles: usize, source: Box<dyn FeedSource>, analyzer: Box<dyn Analyzer>) -> Self {
        Self { feeds, max_articles, source, analyzer, state: RunState::Idle }
    }

    pub fn mode(&self) -> Mode { self.analyzer.mode() }

    pub async fn run(&mut self, progress: &dyn ProgressSink) -> &RunState {
        self.state = RunState::Idle;
        let log = telemetry::run();
        let mode = self.analyzer.mode();
        let started_at = Utc::now();

        let mut ctx = RunContext::new(&*self.source, progress, self.feeds.len(), self.max_articles);
        let outcome = self.analyzer.analyze(&self.feeds, &mut ctx).await;

        match outcome {
            Err(error) => {
                ctx.enter(Stage::Failed);
                log.error(format!("❌ {} analysis failed: {}", mode.as_str(), error));
                let RunParts { feed_failures, stages, .. } = ctx.into_parts();
                self.state = RunState::Failed(Box::new(RunFailure {
                    mode,
                    error,
                    feed_failures,
                    stages,
                    started_at,
                    finished_at: Utc::now(),
                }));
            }
            Ok(()) => {
                ctx.enter(Stage::Aggregating);
                let metrics = {
                    let _s = log.span(&RunPhase::Aggregate).entered();
                    aggregate(ctx.results())
                };
                ctx.enter(Stage::Done);
                ctx.finish_progress("Analysis complete");
                let RunParts { results, raw, feed_failures, stages } = ctx.into_parts();
                self.state = RunState::Done(Box::new(RunReport {
                    mode,
                    feeds: self.feeds.clone(),
                    max_articles: self.max_articles,
                    results,
                    raw,
                    metrics,
                    feed_failures,
                    stages,
                    started_at,
                    finished_at: Utc::now(),
                }));
            }
        }
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::analysis::{DirectAnalyzer, WebhookAnalyzer};
    use crate::llm::openai::MockClient;
    use crate::record::Sentiment;
    use crate::testkit::{serve_stalled_webhook, serve_webhook, RecordingProgress, StubFeeds};

    fn done(state: &RunState) -> &RunReport {
        match state {
            RunState::Done(report) => report,
            other => panic!("expected a finished run, got {other:?}"),
        }
    }

    fn direct(mock: Arc<MockClient>) -> Box<dyn Analyzer> {
        Box::new(DirectAnalyzer::new(mock, Duration::ZERO))
    }

    #[tokio::test]
    async fn direct_run_keeps_going_after_a_malformed_reply() {
        let mock = Arc::new(MockClient::new());
        mock.push_reply(Ok(r#"{"sentiment": "positive", "confidence": 0.9, "archetype": "Hero", "key_insight": "k", "recommendation": "r"}"#.into()));
        mock.push_reply(Ok("not json".into()));

        let feeds = vec!["https://f".to_string()];
        let source = StubFeeds::new().with("https://f", &["A", "B"]);
        let mut pipeline = Pipeline::new(feeds, 10, Box::new(source), direct(mock));
        let progress = RecordingProgress::default();

        let report = done(pipeline.run(&progress).await);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].sentiment, Sentiment::Positive);
        assert_eq!(report.results[0].title, "A");
        assert_eq!(report.results[1].sentiment, Sentiment::Error);
        assert_eq!(report.results[1].title, "B");
        assert_eq!(report.metrics.total, 2);
        assert!((report.metrics.avg_confidence - 0.45).abs() < 1e-9);
        assert_eq!(report.metrics.sentiment("positive"), 1);
        assert_eq!(report.metrics.sentiment("error"), 1);
        assert_eq!(report.raw.len(), 2);
        assert_eq!(report.stages, vec![Stage::Idle, Stage::FetchingFeeds, Stage::Analyzing, Stage::Aggregating, Stage::Done]);
    }

    #[tokio::test]
    async fn failed_feed_is_skipped_and_the_next_one_runs() {
        let mock = Arc::new(MockClient::new());
        mock.push_reply(Ok(r#"{"sentiment": "neutral", "confidence": 0.5}"#.into()));

        let feeds = vec!["https://broken".to_string(), "https://ok".to_string()];
        let source = StubFeeds::new().with("https://ok", &["only"]);
        let mut pipeline = Pipeline::new(feeds, 5, Box::new(source), direct(mock));
        let progress = RecordingProgress::default();

        let report = done(pipeline.run(&progress).await);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].source, "https://ok");
        assert_eq!(report.feed_failures.len(), 1);
        assert_eq!(report.feed_failures[0].feed_url, "https://broken");
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_one() {
        let mock = Arc::new(MockClient::new());
        for _ in 0..3 {
            mock.push_reply(Ok("{}".into()));
        }
        let feeds = vec!["https://a".to_string(), "https://b".to_string()];
        let source = StubFeeds::new().with("https://a", &["1", "2"]).with("https://b", &["3"]);
        let mut pipeline = Pipeline::new(feeds, 4, Box::new(source), direct(mock));
        let progress = RecordingProgress::default();
        pipeline.run(&progress).await;

        let fractions = progress.fractions();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
        assert_eq!(fractions.last().copied(), Some(1.0));
    }

    struct TimedOut;

    #[async_trait]
    impl Analyzer for TimedOut {
        fn mode(&self) -> Mode { Mode::Webhook }

        async fn analyze(&self, _feeds: &[String], ctx: &mut RunContext<'_>) -> Result<(), BatchCallError> {
            ctx.begin_remote_batch();
            Err(BatchCallError::Timeout(Duration::from_secs(300)))
        }
    }

    #[tokio::test]
    async fn batch_failure_leaves_no_records_and_allows_a_rerun() {
        let mut pipeline = Pipeline::new(vec!["https://f".into()], 10, Box::new(StubFeeds::new()), Box::new(TimedOut));
        let progress = RecordingProgress::default();

        match pipeline.run(&progress).await {
            RunState::Failed(failure) => {
                assert!(matches!(failure.error, BatchCallError::Timeout(_)));
                assert_eq!(failure.stages.last(), Some(&Stage::Failed));
            }
            other => panic!("expected failure, got {other:?}"),
        }

        // a second attempt starts over rather than resuming
        let state = pipeline.run(&progress).await;
        assert!(matches!(state, RunState::Failed(_)));
    }

    #[tokio::test]
    async fn webhook_run_normalizes_wrapped_records() {
        let body = serde_json::json!([{ "data": [
            {"title": "A", "link": "https://x/a", "sentiment": "Positive", "confidence": 0.8, "archetype": "Sage", "insight": "i"},
            {"title": "B", "ai_analysis": {"sentiment": {"classification": "negative", "confidence": 0.2}}}
        ]}]);
        let url = serve_webhook(200, body).await;
        let analyzer = WebhookAnalyzer::new(format!("{url}/webhook"), Duration::from_secs(5)).unwrap();
        let mut pipeline = Pipeline::new(vec!["https://f".into()], 3, Box::new(StubFeeds::new()), Box::new(analyzer));
        let progress = RecordingProgress::default();

        let report = done(pipeline.run(&progress).await);
        assert_eq!(report.mode, Mode::Webhook);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].sentiment, Sentiment::Positive);
        assert_eq!(report.results[1].sentiment, Sentiment::Negative);
        assert_eq!(report.raw[1]["title"], "B");
        assert_eq!(report.metrics.total, 2);
        assert_eq!(progress.fractions(), vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn webhook_timeout_fails_the_whole_run() {
        let url = serve_stalled_webhook().await;
        let analyzer = WebhookAnalyzer::new(format!("{url}/webhook"), Duration::from_millis(200)).unwrap();
        let mut pipeline = Pipeline::new(vec!["https://f".into()], 3, Box::new(StubFeeds::new()), Box::new(analyzer));
        let progress = RecordingProgress::default();

        match pipeline.run(&progress).await {
            RunState::Failed(failure) => {
                assert!(matches!(failure.error, BatchCallError::Timeout(_)));
                assert!(failure.finished_at >= failure.started_at);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn webhook_error_status_is_reported_once() {
        let url = serve_webhook(502, serde_json::json!("upstream down")).await;
        let analyzer = WebhookAnalyzer::new(format!("{url}/webhook"), Duration::from_secs(5)).unwrap();
        let mut pipeline = Pipeline::new(vec!["https://f".into()], 3, Box::new(StubFeeds::new()), Box::new(analyzer));

        match pipeline.run(&RecordingProgress::default()).await {
            RunState::Failed(failure) => {
                assert!(matches!(failure.error, BatchCallError::Status { .. }));
                assert!(failure.error.to_string().contains("502"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
