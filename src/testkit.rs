//! Test doubles shared across modules.

use std::collections::HashMap;
use std::sync::Mutex;

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;

use crate::feeds::{FeedFetchError, FeedSource, FetchCause, RawArticle};
use crate::pipeline::ProgressSink;

/// Serves canned article lists per feed url; unknown urls fail with
/// `FetchCause::Empty`.
#[derive(Default)]
pub struct StubFeeds {
    feeds: HashMap<String, Vec<RawArticle>>,
}

impl StubFeeds {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, feed_url: &str, titles: &[&str]) -> Self {
        let articles = titles
            .iter()
            .map(|t| RawArticle {
                title: t.to_string(),
                link: format!("{feed_url}/{t}"),
                summary: format!("<p>{t} summary</p>"),
                source: feed_url.to_string(),
            })
            .collect();
        self.feeds.insert(feed_url.to_string(), articles);
        self
    }
}

#[async_trait]
impl FeedSource for StubFeeds {
    async fn fetch(&self, feed_url: &str, max_articles: usize) -> Result<Vec<RawArticle>, FeedFetchError> {
        match self.feeds.get(feed_url) {
            Some(a) => Ok(a.iter().take(max_articles).cloned().collect()),
            None => Err(FeedFetchError::new(feed_url, FetchCause::Empty)),
        }
    }
}

/// Remembers every progress update.
#[derive(Default)]
pub struct RecordingProgress {
    pub updates: Mutex<Vec<(f64, String)>>,
}

impl RecordingProgress {
    pub fn fractions(&self) -> Vec<f64> {
        self.updates.lock().unwrap().iter().map(|(f, _)| *f).collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, fraction: f64, status: &str) {
        self.updates.lock().unwrap().push((fraction, status.to_string()));
    }
}

/// Serves `router` on a loopback port for the rest of the test. Returns the
/// base url.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Answers every POST to `/webhook` with `status` and a JSON `body`.
pub async fn serve_webhook(status: u16, body: serde_json::Value) -> String {
    let status = StatusCode::from_u16(status).unwrap();
    let router = Router::new().route("/webhook", post(move || async move { (status, Json(body)) }));
    serve(router).await
}

/// Accepts POSTs to `/webhook` and never answers in time.
pub async fn serve_stalled_webhook() -> String {
    let router = Router::new().route(
        "/webhook",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK
        }),
    );
    serve(router).await
}

/// Serves `body` as `application/rss+xml` on `/feed` with `status`.
pub async fn serve_feed(status: u16, body: &'static str) -> String {
    let status = StatusCode::from_u16(status).unwrap();
    let router = Router::new().route(
        "/feed",
        get(move || async move { (status, [(header::CONTENT_TYPE, "application/rss+xml")], body) }),
    );
    serve(router).await
}
