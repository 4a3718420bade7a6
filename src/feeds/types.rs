use std::fmt;

use reqwest::StatusCode;
use serde::Serialize;

/// One feed entry, as handed to the analyzers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RawArticle {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source: String,
}

pub const UNTITLED: &str = "No title";

#[derive(Debug)]
pub struct FeedFetchError {
    pub feed_url: String,
    pub cause: FetchCause,
}

#[derive(Debug)]
pub enum FetchCause {
    InvalidUrl(url::ParseError),
    Timeout,
    Http(reqwest::Error),
    Status(StatusCode),
    Parse(String),
    Empty,
}

impl FeedFetchError {
    pub fn new(feed_url: &str, cause: FetchCause) -> Self {
        Self { feed_url: feed_url.to_string(), cause }
    }
}

impl From<reqwest::Error> for FetchCause {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { FetchCause::Timeout } else { FetchCause::Http(err) }
    }
}

impl fmt::Display for FetchCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchCause::InvalidUrl(err) => write!(f, "invalid url: {err}"),
            FetchCause::Timeout => write!(f, "request timed out"),
            FetchCause::Http(err) => write!(f, "http error: {err}"),
            FetchCause::Status(status) => write!(f, "unexpected status {status}"),
            FetchCause::Parse(msg) => write!(f, "not an RSS or Atom feed: {msg}"),
            FetchCause::Empty => write!(f, "feed has no entries"),
        }
    }
}

impl fmt::Display for FeedFetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to process feed {}: {}", self.feed_url, self.cause)
    }
}

impl std::error::Error for FeedFetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            FetchCause::InvalidUrl(err) => Some(err),
            FetchCause::Http(err) => Some(err),
            _ => None,
        }
    }
}

// Envelope types for `feedpulse fetch`
#[derive(Serialize)]
pub struct FetchListing {
    pub feed_url: String,
    pub max_articles: usize,
    pub articles: Vec<RawArticle>,
}
