use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use crate::feeds::RawArticle;
use crate::llm::openai::OpenAiError;
use crate::pipeline::RunContext;
use crate::util::text::{plain_text, truncate_chars};

pub mod direct;
pub mod prompt;
pub mod shape;
pub mod webhook;

pub use direct::DirectAnalyzer;
pub use webhook::WebhookAnalyzer;

/// Longest summary (in characters) sent to a backend.
pub const MAX_REQUEST_SUMMARY_CHARS: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// one chat-completion call per article
    Direct,
    /// one webhook call for the whole batch
    Webhook,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Direct => "direct",
            Mode::Webhook => "webhook",
        }
    }
}

/// What a backend gets to see of an article.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub title: String,
    pub summary: String,
    pub link: String,
    #[serde(skip)]
    pub source: String,
    /// Whole plain-text body; only `summary` is cut for the backend.
    #[serde(skip)]
    pub body: String,
}

impl AnalysisRequest {
    pub fn from_article(article: &RawArticle) -> Self {
        let body = plain_text(&article.summary);
        Self {
            title: article.title.clone(),
            summary: truncate_chars(&body, MAX_REQUEST_SUMMARY_CHARS).to_string(),
            link: article.link.clone(),
            source: article.source.clone(),
            body,
        }
    }
}

/// One backend, chosen when the run is configured. Implementations push one
/// record per analyzed article into the context; a batch-level failure is
/// returned once and leaves no records behind.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn mode(&self) -> Mode;

    async fn analyze(&self, feeds: &[String], ctx: &mut RunContext<'_>) -> Result<(), BatchCallError>;
}

/// Why a single article came back as an error record.
#[derive(Debug)]
pub enum ArticleAnalysisError {
    Model(OpenAiError),
    InvalidJson(serde_json::Error),
    NotAnObject,
}

impl fmt::Display for ArticleAnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArticleAnalysisError::Model(err) => write!(f, "{err}"),
            ArticleAnalysisError::InvalidJson(err) => write!(f, "reply is not valid JSON: {err}"),
            ArticleAnalysisError::NotAnObject => write!(f, "reply is not a JSON object"),
        }
    }
}

impl std::error::Error for ArticleAnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArticleAnalysisError::Model(err) => Some(err),
            ArticleAnalysisError::InvalidJson(err) => Some(err),
            ArticleAnalysisError::NotAnObject => None,
        }
    }
}

/// The whole batch failed; no records were produced.
#[derive(Debug)]
pub enum BatchCallError {
    Timeout(Duration),
    Http(reqwest::Error),
    Status { status: StatusCode, body: String },
    Decode(serde_json::Error),
    UnexpectedShape(String),
}

impl fmt::Display for BatchCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchCallError::Timeout(after) => write!(f, "webhook timed out after {}s", after.as_secs()),
            BatchCallError::Http(err) => write!(f, "webhook request failed: {err}"),
            BatchCallError::Status { status, body } if body.is_empty() => write!(f, "webhook returned {status}"),
            BatchCallError::Status { status, body } => write!(f, "webhook returned {status}: {body}"),
            BatchCallError::Decode(err) => write!(f, "webhook response is not valid JSON: {err}"),
            BatchCallError::UnexpectedShape(what) => write!(f, "webhook response has an unexpected shape: {what}"),
        }
    }
}

impl std::error::Error for BatchCallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatchCallError::Http(err) => Some(err),
            BatchCallError::Decode(err) => Some(err),
            _ => None,
        }
    }
}
