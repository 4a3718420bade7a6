use rss::Channel;

use super::types::{FetchCause, RawArticle, UNTITLED};

/// Parse an RSS 2.0 or Atom document and keep the first `max` entries in
/// document order.
pub fn parse_articles(xml: &[u8], feed_url: &str, max: usize) -> Result<Vec<RawArticle>, FetchCause> {
    match Channel::read_from(xml) {
        Ok(channel) => Ok(from_rss(&channel, feed_url, max)),
        Err(rss_err) => match atom_syndication::Feed::read_from(xml) {
            Ok(feed) => Ok(from_atom(&feed, feed_url, max)),
            Err(atom_err) => Err(FetchCause::Parse(format!("rss: {rss_err}; atom: {atom_err}"))),
        },
    }
}

fn from_rss(channel: &Channel, feed_url: &str, max: usize) -> Vec<RawArticle> {
    channel
        .items()
        .iter()
        .take(max)
        .map(|item| RawArticle {
            title: non_empty(item.title()).unwrap_or(UNTITLED).to_string(),
            link: item.link().unwrap_or_default().to_string(),
            // description is the RSS summary; content:encoded is the fallback
            summary: non_empty(item.description()).or(item.content()).unwrap_or_default().to_string(),
            source: feed_url.to_string(),
        })
        .collect()
}

fn from_atom(feed: &atom_syndication::Feed, feed_url: &str, max: usize) -> Vec<RawArticle> {
    feed.entries()
        .iter()
        .take(max)
        .map(|entry| {
            let title = entry.title().as_str().to_string();
            let link = entry
                .links()
                .iter()
                .find(|l| l.rel() == "alternate")
                .or_else(|| entry.links().first())
                .map(|l| l.href().to_string())
                .unwrap_or_default();
            let summary = non_empty(entry.summary().map(|s| s.as_str()))
                .or_else(|| entry.content().and_then(|c| c.value()))
                .unwrap_or_default()
                .to_string();
            RawArticle {
                title: if title.trim().is_empty() { UNTITLED.to_string() } else { title },
                link,
                summary,
                source: feed_url.to_string(),
            }
        })
        .collect()
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}
