use std::fmt;

use serde::{Deserialize, Serialize};

pub const UNKNOWN_ARCHETYPE: &str = "Unknown";
pub const NOT_AVAILABLE: &str = "N/A";

/// Archetypes the analysis prompt asks for. Backends may return others.
pub const KNOWN_ARCHETYPES: [&str; 5] = ["Hero", "Sage", "Innocent", "Explorer", "Rebel"];

/// Sentiment label of one article. Labels are lower-cased on the way in;
/// anything outside the well-known set is kept verbatim as `Other`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Unknown,
    Error,
    Other(String),
}

impl Sentiment {
    pub fn parse(raw: &str) -> Self {
        let label = raw.trim().to_lowercase();
        match label.as_str() {
            "positive" => Sentiment::Positive,
            "neutral" => Sentiment::Neutral,
            "negative" => Sentiment::Negative,
            "" | "unknown" => Sentiment::Unknown,
            "error" => Sentiment::Error,
            _ => Sentiment::Other(label),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
            Sentiment::Unknown => "unknown",
            Sentiment::Error => "error",
            Sentiment::Other(s) => s,
        }
    }
}

impl From<String> for Sentiment {
    fn from(s: String) -> Self { Sentiment::parse(&s) }
}

impl From<Sentiment> for String {
    fn from(s: Sentiment) -> Self { s.as_str().to_string() }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Canonical, backend-agnostic analysis record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub title: String,
    pub link: String,
    pub source: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub archetype: String,
    #[serde(default)]
    pub sentiment_reasoning: String,
    #[serde(default)]
    pub archetype_reasoning: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub insight: String,
    #[serde(default = "not_available")]
    pub recommendation: String,
    #[serde(default)]
    pub summary: String,
}

fn not_available() -> String { NOT_AVAILABLE.to_string() }

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            title: String::new(),
            link: String::new(),
            source: String::new(),
            sentiment: Sentiment::Unknown,
            confidence: 0.0,
            archetype: UNKNOWN_ARCHETYPE.to_string(),
            sentiment_reasoning: String::new(),
            archetype_reasoning: String::new(),
            category: String::new(),
            insight: String::new(),
            recommendation: not_available(),
            summary: String::new(),
        }
    }
}

impl AnalysisResult {
    /// Error-tagged record standing in for an article whose analysis failed.
    pub fn failed(title: &str, link: &str, source: &str, reason: impl fmt::Display) -> Self {
        Self {
            title: title.to_string(),
            link: link.to_string(),
            source: source.to_string(),
            sentiment: Sentiment::Error,
            insight: format!("Analysis failed: {reason}"),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool { self.sentiment == Sentiment::Error }
}

/// Clamp into [0,1]; NaN becomes 0.
pub fn clamp_confidence(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_parse_lowercases_and_keeps_unknown_labels() {
        assert_eq!(Sentiment::parse("Positive"), Sentiment::Positive);
        assert_eq!(Sentiment::parse(" NEGATIVE "), Sentiment::Negative);
        assert_eq!(Sentiment::parse(""), Sentiment::Unknown);
        assert_eq!(Sentiment::parse("Mixed"), Sentiment::Other("mixed".into()));
    }

    #[test]
    fn sentiment_serializes_as_plain_string() {
        let v = serde_json::to_value(Sentiment::Other("mixed".into())).unwrap();
        assert_eq!(v, serde_json::json!("mixed"));
        let s: Sentiment = serde_json::from_value(serde_json::json!("Error")).unwrap();
        assert_eq!(s, Sentiment::Error);
    }

    #[test]
    fn failed_record_uses_schema_defaults() {
        let r = AnalysisResult::failed("B", "https://x/b", "https://x/feed", "bad json");
        assert!(r.is_error());
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.archetype, "Unknown");
        assert_eq!(r.recommendation, "N/A");
        assert_eq!(r.insight, "Analysis failed: bad json");
    }

    #[test]
    fn clamp_confidence_bounds() {
        assert_eq!(clamp_confidence(1.5), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(0.42), 0.42);
    }
}
