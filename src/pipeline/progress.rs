use crate::telemetry::{self};

/// Receives run progress as a fraction in [0,1].
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64, status: &str);
}

/// Default sink: one tracing line per update.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, fraction: f64, status: &str) {
        telemetry::run().progress(fraction, status);
    }
}

/// `(feeds_completed * cap + articles_done) / (total_feeds * cap)`, clamped to
/// 1.0 and never moving backwards.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_feeds: usize,
    cap: usize,
    last: f64,
}

impl ProgressTracker {
    pub fn new(total_feeds: usize, cap: usize) -> Self {
        Self { total_feeds, cap: cap.max(1), last: 0.0 }
    }

    pub fn at(&mut self, feeds_completed: usize, articles_done: usize) -> f64 {
        let denom = self.total_feeds * self.cap;
        let raw = if denom == 0 {
            1.0
        } else {
            (feeds_completed * self.cap + articles_done) as f64 / denom as f64
        };
        self.last = raw.min(1.0).max(self.last);
        self.last
    }

    pub fn finish(&mut self) -> f64 {
        self.last = 1.0;
        self.last
    }

    pub fn current(&self) -> f64 { self.last }
}
