use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use crate::normalize::normalize;
use crate::pipeline::RunContext;
use crate::telemetry::ops::run::Phase as RunPhase;
use crate::telemetry::{self};

use super::shape::WebhookResponse;
use super::{Analyzer, BatchCallError, Mode};

pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub feeds: &'a [String],
    pub max_articles: usize,
}

/// Variant B: the workflow endpoint fetches and analyzes every feed itself
/// and answers once for the whole batch.
pub struct WebhookAnalyzer {
    http: Client,
    url: String,
    timeout: Duration,
}

impl WebhookAnalyzer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build().context("build webhook http client")?;
        Ok(Self { http, url: url.into(), timeout })
    }

    /// Flat list of raw records, or the single reason the batch failed.
    pub async fn analyze_batch(&self, feeds: &[String], max_articles: usize) -> Result<Vec<Value>, BatchCallError> {
        let payload = WebhookPayload { feeds, max_articles };
        let resp = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).trim().to_string();
            return Err(BatchCallError::Status { status, body });
        }

        let body: Value = serde_json::from_slice(&bytes).map_err(BatchCallError::Decode)?;
        let shape = WebhookResponse::parse(body)?;
        tracing::debug!(shape = shape.shape_name(), "webhook response unwrapped");
        Ok(shape.into_records())
    }

    fn transport_error(&self, err: reqwest::Error) -> BatchCallError {
        if err.is_timeout() { BatchCallError::Timeout(self.timeout) } else { BatchCallError::Http(err) }
    }
}

#[async_trait]
impl Analyzer for WebhookAnalyzer {
    fn mode(&self) -> Mode { Mode::Webhook }

    async fn analyze(&self, feeds: &[String], ctx: &mut RunContext<'_>) -> Result<(), BatchCallError> {
        // fetching happens on the far side of the webhook
        ctx.begin_remote_batch();
        let span = telemetry::run().span_kv(&RunPhase::CallWebhook, [
            ("feeds", feeds.len().to_string()),
            ("timeout_secs", self.timeout.as_secs().to_string()),
        ]);
        let raw = self.analyze_batch(feeds, ctx.max_articles()).instrument(span).await?;

        ctx.begin_analysis(0);
        let _s = telemetry::run().span_kv(&RunPhase::Normalize, [("records", raw.len().to_string())]).entered();
        for value in raw {
            let record = normalize(&value);
            ctx.record_raw(record, value);
        }
        Ok(())
    }
}
