use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use url::Url;

use crate::analysis::{Analyzer, DirectAnalyzer, Mode, WebhookAnalyzer};
use crate::llm::openai::{OpenAiClient, OpenAiConfig, OpenAiError};
use crate::telemetry::ops::presets::Phase as PresetsPhase;
use crate::telemetry::{self};

pub const MAX_ARTICLES_RANGE: RangeInclusive<usize> = 1..=50;
pub const DEFAULT_MAX_ARTICLES: usize = 10;

#[derive(Serialize)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    pub feeds: &'static [&'static str],
}

const AZURE_BLOG: &str = "https://azure.microsoft.com/en-us/blog/feed/";
const OPENAI_BLOG: &str = "https://openai.com/blog/rss.xml";
const GOOGLE_AI_BLOG: &str = "http://googleaiblog.blogspot.com/atom.xml";
const GOOGLE_DEVELOPERS_BLOG: &str = "https://developers.googleblog.com/feeds/posts/default";
const MICROSOFT_DEVBLOGS: &str = "https://devblogs.microsoft.com/feed/";

pub const DEFAULT_PRESET: &str = "default";

pub const PRESETS: &[Preset] = &[
    Preset {
        name: DEFAULT_PRESET,
        description: "vendor AI and cloud blogs",
        feeds: &[AZURE_BLOG, OPENAI_BLOG, GOOGLE_AI_BLOG, GOOGLE_DEVELOPERS_BLOG, MICROSOFT_DEVBLOGS],
    },
    Preset { name: "cloud", description: "Microsoft cloud and developer blogs", feeds: &[AZURE_BLOG, MICROSOFT_DEVBLOGS] },
    Preset {
        name: "ai-labs",
        description: "AI lab and research blogs",
        feeds: &[OPENAI_BLOG, GOOGLE_AI_BLOG, GOOGLE_DEVELOPERS_BLOG],
    },
];

pub fn preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name.trim()))
}

/// feedpulse presets
pub fn list_presets() -> Result<()> {
    let log = telemetry::presets();
    let _g = log.root_span().entered();
    let _s = log.span(&PresetsPhase::List).entered();

    for p in PRESETS {
        log.info(format!("📚 {} ({} feeds): {}", p.name, p.feeds.len(), p.description));
        for feed in p.feeds {
            log.info(format!("   {feed}"));
        }
    }
    if telemetry::config::json_mode() {
        log.result(&PRESETS)?;
    }
    Ok(())
}

/// One run, fully resolved before anything touches the network.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub feeds: Vec<String>,
    pub max_articles: usize,
    pub backend: BackendConfig,
}

#[derive(Clone, Debug)]
pub enum BackendConfig {
    Direct { openai: OpenAiConfig, delay: Duration },
    Webhook { url: String, timeout: Duration },
}

impl BackendConfig {
    pub fn mode(&self) -> Mode {
        match self {
            BackendConfig::Direct { .. } => Mode::Direct,
            BackendConfig::Webhook { .. } => Mode::Webhook,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    NoFeeds,
    InvalidFeedUrl { url: String, reason: String },
    MaxArticlesOutOfRange(usize),
    MissingApiKey,
    MissingWebhookUrl,
    InvalidWebhookUrl { url: String, reason: String },
    UnknownPreset(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoFeeds => write!(f, "no feeds to analyze"),
            ConfigError::InvalidFeedUrl { url, reason } => write!(f, "invalid feed url {url}: {reason}"),
            ConfigError::MaxArticlesOutOfRange(n) => write!(
                f,
                "max articles per feed must be between {} and {}, got {n}",
                MAX_ARTICLES_RANGE.start(),
                MAX_ARTICLES_RANGE.end()
            ),
            ConfigError::MissingApiKey => write!(f, "direct mode needs OPENAI_API_KEY"),
            ConfigError::MissingWebhookUrl => write!(f, "webhook mode needs --webhook-url or FEEDPULSE_WEBHOOK_URL"),
            ConfigError::InvalidWebhookUrl { url, reason } => write!(f, "invalid webhook url {url}: {reason}"),
            ConfigError::UnknownPreset(name) => {
                let known: Vec<&str> = PRESETS.iter().map(|p| p.name).collect();
                write!(f, "unknown preset `{name}` (known: {})", known.join(", "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl RunConfig {
    pub fn mode(&self) -> Mode { self.backend.mode() }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feeds.is_empty() {
            return Err(ConfigError::NoFeeds);
        }
        if !MAX_ARTICLES_RANGE.contains(&self.max_articles) {
            return Err(ConfigError::MaxArticlesOutOfRange(self.max_articles));
        }
        for feed in &self.feeds {
            check_http_url(feed).map_err(|reason| ConfigError::InvalidFeedUrl { url: feed.clone(), reason })?;
        }
        match &self.backend {
            BackendConfig::Direct { openai, .. } if openai.api_key.is_none() => Err(ConfigError::MissingApiKey),
            BackendConfig::Direct { .. } => Ok(()),
            BackendConfig::Webhook { url, .. } if url.trim().is_empty() => Err(ConfigError::MissingWebhookUrl),
            BackendConfig::Webhook { url, .. } => {
                check_http_url(url).map_err(|reason| ConfigError::InvalidWebhookUrl { url: url.clone(), reason })
            }
        }
    }

    /// The single backend this run will use.
    pub fn build_analyzer(&self) -> Result<Box<dyn Analyzer>> {
        self.validate()?;
        match &self.backend {
            BackendConfig::Direct { openai, delay } => {
                let client = OpenAiClient::new(openai.clone()).map_err(|e| match e {
                    OpenAiError::MissingApiKey => anyhow::Error::new(ConfigError::MissingApiKey),
                    other => anyhow::Error::new(other).context("build model client"),
                })?;
                Ok(Box::new(DirectAnalyzer::new(Arc::new(client), *delay)))
            }
            BackendConfig::Webhook { url, timeout } => Ok(Box::new(WebhookAnalyzer::new(url.clone(), *timeout)?)),
        }
    }
}

fn check_http_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme `{other}`")),
    }
}

/// Feed urls from a list file: one per line, blank lines and `#` comments
/// skipped.
pub fn parse_feed_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Explicit feeds first, then file entries, then presets; duplicates keep
/// their first position. Nothing given means the default preset.
pub fn collect_feeds(feeds: &[String], feeds_file: Option<&Path>, presets: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = feeds.iter().map(|f| f.trim().to_string()).filter(|f| !f.is_empty()).collect();
    if let Some(path) = feeds_file {
        let text = std::fs::read_to_string(path).with_context(|| format!("read feeds file {}", path.display()))?;
        out.extend(parse_feed_list(&text));
    }
    for name in presets {
        let p = preset(name).ok_or_else(|| ConfigError::UnknownPreset(name.clone()))?;
        out.extend(p.feeds.iter().map(|f| f.to_string()));
    }
    if out.is_empty() && feeds_file.is_none() {
        if let Some(p) = preset(DEFAULT_PRESET) {
            out.extend(p.feeds.iter().map(|f| f.to_string()));
        }
    }
    let mut seen = std::collections::HashSet::new();
    out.retain(|f| seen.insert(f.clone()));
    Ok(out)
}

pub fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<u64>().ok()).map(Duration::from_secs)
}
