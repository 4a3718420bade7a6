use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use crate::feeds::{FeedSource, RawArticle};
use crate::record::AnalysisResult;
use crate::telemetry::ops::run::Phase as RunPhase;
use crate::telemetry::{self};

use super::progress::{ProgressSink, ProgressTracker};

/// Observable phases of one run, in the order they are entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    FetchingFeeds,
    Analyzing,
    Aggregating,
    Done,
    Failed,
}

/// A feed that contributed nothing to the run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeedFailure {
    pub feed_url: String,
    pub reason: String,
}

/// Everything an analyzer may touch while a run is in flight. Records are
/// appended in feed order, then article order.
pub struct RunContext<'a> {
    source: &'a dyn FeedSource,
    progress: &'a dyn ProgressSink,
    max_articles: usize,
    total_feeds: usize,
    tracker: ProgressTracker,
    stages: Vec<Stage>,
    results: Vec<AnalysisResult>,
    raw: Vec<Value>,
    feed_failures: Vec<FeedFailure>,
}

/// What is left of a context once the analyzer is finished with it.
pub struct RunParts {
    pub results: Vec<AnalysisResult>,
    pub raw: Vec<Value>,
    pub feed_failures: Vec<FeedFailure>,
    pub stages: Vec<Stage>,
}

impl<'a> RunContext<'a> {
    pub fn new(source: &'a dyn FeedSource, progress: &'a dyn ProgressSink, total_feeds: usize, max_articles: usize) -> Self {
        Self {
            source,
            progress,
            max_articles,
            total_feeds,
            tracker: ProgressTracker::new(total_feeds, max_articles),
            stages: vec![Stage::Idle],
            results: Vec::new(),
            raw: Vec::new(),
            feed_failures: Vec::new(),
        }
    }

    pub fn max_articles(&self) -> usize { self.max_articles }

    pub fn stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Idle)
    }

    pub fn results(&self) -> &[AnalysisResult] { &self.results }

    pub(crate) fn enter(&mut self, stage: Stage) {
        if self.stage() != stage {
            tracing::debug!(from = ?self.stage(), to = ?stage, "stage");
            self.stages.push(stage);
        }
    }

    /// Articles of one feed, or `None` after logging a single warning when
    /// the feed could not be used. The run always moves on to the next feed.
    pub async fn fetch_feed(&mut self, index: usize, feed_url: &str) -> Option<Vec<RawArticle>> {
        self.enter(Stage::FetchingFeeds);
        let fraction = self.tracker.at(index, 0);
        self.progress.report(fraction, &format!("Fetching feed {}/{}: {}", index + 1, self.total_feeds, feed_url));

        let log = telemetry::run();
        let span = log.span_kv(&RunPhase::FetchFeed, [("feed_url", feed_url.to_string())]);
        match self.source.fetch(feed_url, self.max_articles).instrument(span).await {
            Ok(articles) => {
                log.info(format!("📰 Found {} article(s) in {}", articles.len(), feed_url));
                Some(articles)
            }
            Err(err) => {
                log.warn_kv(&format!("⚠️  Failed to process feed {}: {}", feed_url, err.cause), [
                    ("feed_url", feed_url.to_string()),
                    ("reason", err.cause.to_string()),
                ]);
                self.feed_failures.push(FeedFailure { feed_url: feed_url.to_string(), reason: err.cause.to_string() });
                let fraction = self.tracker.at(index + 1, 0);
                self.progress.report(fraction, &format!("Skipped feed {}/{}", index + 1, self.total_feeds));
                None
            }
        }
    }

    pub fn begin_analysis(&mut self, _feed_index: usize) {
        self.enter(Stage::Analyzing);
    }

    /// The far side fetches and analyzes everything in one call; progress
    /// has nothing finer to report until the answer arrives.
    pub fn begin_remote_batch(&mut self) {
        self.enter(Stage::FetchingFeeds);
        self.progress.report(self.tracker.current(), "Waiting for webhook response");
    }

    pub fn record(&mut self, result: AnalysisResult) {
        let raw = serde_json::to_value(&result).unwrap_or(Value::Null);
        self.record_raw(result, raw);
    }

    pub fn record_raw(&mut self, result: AnalysisResult, raw: Value) {
        self.results.push(result);
        self.raw.push(raw);
    }

    pub fn article_done(&mut self, feed_index: usize, done_in_feed: usize, status: &str) {
        let fraction = self.tracker.at(feed_index, done_in_feed);
        self.progress.report(fraction, status);
    }

    pub fn feed_done(&mut self, feed_index: usize, feed_url: &str, fetched: usize, errors: usize) {
        let log = telemetry::run();
        log.feed_summary(feed_url, fetched, fetched - errors.min(fetched), errors);
        if errors > 0 {
            log.warn(format!("⚠️  {} of {} article(s) from {} failed analysis", errors, fetched, feed_url));
        }
        let fraction = self.tracker.at(feed_index + 1, 0);
        self.progress.report(fraction, &format!("Finished feed {}/{}", feed_index + 1, self.total_feeds));
    }

    pub(crate) fn finish_progress(&mut self, status: &str) {
        let fraction = self.tracker.finish();
        self.progress.report(fraction, status);
    }

    pub(crate) fn into_parts(self) -> RunParts {
        RunParts { results: self.results, raw: self.raw, feed_failures: self.feed_failures, stages: self.stages }
    }
}
