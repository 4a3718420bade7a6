use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use reqwest::Client;
use tracing::Instrument;
use url::Url;

use crate::telemetry::{self};
use crate::telemetry::ops::fetch::Phase as FetchPhase;

mod fetch;
mod parse;
pub mod types;

pub use types::{FeedFetchError, FetchCause, RawArticle};

const USER_AGENT: &str = concat!("feedpulse/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where articles come from. The pipeline only sees this trait.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// At most `max_articles` entries of `feed_url`, in feed order. An empty
    /// feed is reported as `FetchCause::Empty`.
    async fn fetch(&self, feed_url: &str, max_articles: usize) -> Result<Vec<RawArticle>, FeedFetchError>;
}

#[derive(Clone)]
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("build feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, feed_url: &str, max_articles: usize) -> Result<Vec<RawArticle>, FeedFetchError> {
        let fail = |cause| FeedFetchError::new(feed_url, cause);
        let log = telemetry::fetch();
        Url::parse(feed_url).map_err(|e| fail(FetchCause::InvalidUrl(e)))?;
        let xml = fetch::fetch_feed(&self.client, feed_url)
            .instrument(log.span(&FetchPhase::Download))
            .await
            .map_err(fail)?;
        let articles = {
            let _s = log.span(&FetchPhase::Parse).entered();
            parse::parse_articles(&xml, feed_url, max_articles.max(1)).map_err(fail)?
        };
        if articles.is_empty() {
            return Err(fail(FetchCause::Empty));
        }
        Ok(articles)
    }
}

/// feedpulse fetch <url>
#[derive(Args)]
pub struct FetchCmd {
    pub url: String,
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=50))]
    pub max_articles: u32,
}

pub async fn run(args: FetchCmd) -> Result<()> {
    let log = telemetry::fetch();
    let _g = log.root_span_kv([
        ("url", args.url.clone()),
        ("max_articles", args.max_articles.to_string()),
    ]).entered();

    let max = args.max_articles as usize;
    let source = HttpFeedSource::new(DEFAULT_FETCH_TIMEOUT)?;
    let articles = source.fetch(&args.url, max).await?;

    log.info(format!("📰 Found {} article(s) in {}", articles.len(), args.url));
    for (i, a) in articles.iter().enumerate() {
        log.info(format!("  {:>2}. {} <{}>", i + 1, a.title, a.link));
    }

    if telemetry::config::json_mode() {
        let listing = types::FetchListing { feed_url: args.url, max_articles: max, articles };
        log.result(&listing)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::serve_feed;

    const THREE_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><link>https://t</link><description>d</description>
  <item><title>one</title><link>https://t/1</link></item>
  <item><title>two</title><link>https://t/2</link></item>
  <item><title>three</title><link>https://t/3</link></item>
</channel></rss>"#;

    const NO_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><link>https://t</link><description>d</description></channel></rss>"#;

    fn source() -> HttpFeedSource { HttpFeedSource::new(Duration::from_secs(5)).unwrap() }

    #[tokio::test]
    async fn caps_articles_fetched_over_http() {
        let url = format!("{}/feed", serve_feed(200, THREE_ITEMS).await);
        let articles = source().fetch(&url, 2).await.unwrap();
        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["one", "two"]);
        assert!(articles.iter().all(|a| a.source == url));
    }

    #[tokio::test]
    async fn error_status_is_a_status_failure() {
        let url = format!("{}/feed", serve_feed(500, "oops").await);
        let err = source().fetch(&url, 5).await.unwrap_err();
        assert_eq!(err.feed_url, url);
        assert!(matches!(err.cause, FetchCause::Status(s) if s.as_u16() == 500));
    }

    #[tokio::test]
    async fn feed_without_items_is_empty() {
        let url = format!("{}/feed", serve_feed(200, NO_ITEMS).await);
        let err = source().fetch(&url, 5).await.unwrap_err();
        assert!(matches!(err.cause, FetchCause::Empty));
    }

    #[tokio::test]
    async fn malformed_url_is_rejected_before_any_request() {
        let err = source().fetch("not a url", 5).await.unwrap_err();
        assert!(matches!(err.cause, FetchCause::InvalidUrl(_)));
    }
}
