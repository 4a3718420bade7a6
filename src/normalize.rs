//! Coerces backend records into the canonical [`AnalysisResult`].
//!
//! Two record layouts are understood:
//! - flat: `sentiment`, `confidence`, `archetype`, `insight`/`key_insight`, ...
//!   at the top level;
//! - nested: an `ai_analysis` object holding `sentiment.{classification,
//!   confidence, reasoning}`, `archetype.{primary, reasoning}` and an
//!   `insights` list whose first entry carries `category`, `insight` and
//!   `recommendation`.
//!
//! Normalization is total. Missing fields fall back to schema defaults and a
//! [`ResponseShapeError`] is only reported, never returned as a failure.

use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::feeds::types::UNTITLED;
use crate::record::{clamp_confidence, AnalysisResult, Sentiment, NOT_AVAILABLE, UNKNOWN_ARCHETYPE};

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseShapeError {
    pub reason: String,
}

impl fmt::Display for ResponseShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected record shape: {}", self.reason)
    }
}

impl std::error::Error for ResponseShapeError {}

pub fn normalize(raw: &Value) -> AnalysisResult {
    let (record, issue) = normalize_with_issue(raw);
    if let Some(issue) = issue {
        debug!(title = %record.title, "{issue}; schema defaults applied");
    }
    record
}

pub fn normalize_all(raw: &[Value]) -> Vec<AnalysisResult> {
    raw.iter().map(normalize).collect()
}

pub fn normalize_with_issue(raw: &Value) -> (AnalysisResult, Option<ResponseShapeError>) {
    if !raw.is_object() {
        let issue = ResponseShapeError { reason: format!("expected an object, got {}", kind(raw)) };
        return (AnalysisResult { title: UNTITLED.to_string(), ..AnalysisResult::default() }, Some(issue));
    }

    let mut record = AnalysisResult {
        title: article_field(raw, &["title"]).unwrap_or(UNTITLED).to_string(),
        link: article_field(raw, &["link", "url"]).unwrap_or_default().to_string(),
        source: article_field(raw, &["source", "feed"]).unwrap_or_default().to_string(),
        summary: article_field(raw, &["summary", "content", "description"]).unwrap_or_default().to_string(),
        ..AnalysisResult::default()
    };

    let issue = match raw.get("ai_analysis").filter(|v| v.is_object()) {
        Some(analysis) => {
            fill_nested(&mut record, analysis);
            analysis.get("sentiment").is_none().then(|| ResponseShapeError {
                reason: "ai_analysis has no sentiment block".into(),
            })
        }
        None => {
            fill_flat(&mut record, raw);
            (raw.get("sentiment").is_none() && raw.get("archetype").is_none()).then(|| ResponseShapeError {
                reason: "no sentiment, archetype or ai_analysis fields".into(),
            })
        }
    };
    (record, issue)
}

fn fill_flat(record: &mut AnalysisResult, raw: &Value) {
    record.sentiment = str_at(raw, "sentiment").map(Sentiment::parse).unwrap_or(Sentiment::Unknown);
    record.confidence = confidence_at(raw, "confidence");
    record.archetype = archetype(str_at(raw, "archetype"));
    record.sentiment_reasoning = str_at(raw, "sentiment_reasoning").unwrap_or_default().to_string();
    record.archetype_reasoning = str_at(raw, "archetype_reasoning").unwrap_or_default().to_string();
    record.category = str_at(raw, "category").unwrap_or_default().to_string();
    record.insight = str_at(raw, "insight")
        .or_else(|| str_at(raw, "key_insight"))
        .unwrap_or_default()
        .to_string();
    record.recommendation = str_at(raw, "recommendation").unwrap_or(NOT_AVAILABLE).to_string();
}

fn fill_nested(record: &mut AnalysisResult, analysis: &Value) {
    let sentiment = analysis.get("sentiment");
    record.sentiment = sentiment
        .and_then(|s| str_at(s, "classification"))
        .map(Sentiment::parse)
        .unwrap_or(Sentiment::Unknown);
    record.confidence = sentiment.map(|s| confidence_at(s, "confidence")).unwrap_or(0.0);
    record.sentiment_reasoning = sentiment.and_then(|s| str_at(s, "reasoning")).unwrap_or_default().to_string();

    let archetype_block = analysis.get("archetype");
    record.archetype = archetype(archetype_block.and_then(|a| str_at(a, "primary")));
    record.archetype_reasoning = archetype_block.and_then(|a| str_at(a, "reasoning")).unwrap_or_default().to_string();

    match analysis.get("insights").and_then(Value::as_array).and_then(|xs| xs.first()) {
        Some(first) => {
            record.category = str_at(first, "category").unwrap_or_default().to_string();
            record.insight = str_at(first, "insight").unwrap_or_default().to_string();
            record.recommendation = str_at(first, "recommendation").unwrap_or(NOT_AVAILABLE).to_string();
        }
        None => {
            record.insight = NOT_AVAILABLE.to_string();
            record.recommendation = NOT_AVAILABLE.to_string();
        }
    }
}

fn archetype(raw: Option<&str>) -> String {
    raw.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(UNKNOWN_ARCHETYPE).to_string()
}

// Top level first, then a nested `article` object.
fn article_field<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a str> {
    let scopes = [Some(raw), raw.get("article")];
    scopes
        .into_iter()
        .flatten()
        .find_map(|scope| keys.iter().find_map(|k| str_at(scope, k)))
}

fn str_at<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

/// Numbers and numeric strings are accepted; anything else reads as 0.
fn confidence_at(v: &Value, key: &str) -> f64 {
    let raw = match v.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    clamp_confidence(raw.unwrap_or(0.0))
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
