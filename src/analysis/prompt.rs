use std::sync::OnceLock;

use regex::Regex;

use crate::record::KNOWN_ARCHETYPES;

use super::AnalysisRequest;

pub const SYSTEM_PROMPT: &str = "You are a brand intelligence analyst. Reply with a single JSON object and nothing else.";

pub fn build_prompt(req: &AnalysisRequest) -> String {
    let archetypes = KNOWN_ARCHETYPES
        .iter()
        .map(|a| format!("\"{a}\""))
        .collect::<Vec<_>>()
        .join(" or ");
    format!(
        "Analyze this article for brand intelligence:\n\n\
         Title: {title}\n\
         Content: {content}\n\n\
         Provide analysis in JSON format:\n\
         {{\n\
         \x20   \"sentiment\": \"positive\" or \"neutral\" or \"negative\",\n\
         \x20   \"confidence\": 0.0-1.0,\n\
         \x20   \"archetype\": {archetypes},\n\
         \x20   \"key_insight\": \"One strategic insight about market trend or brand positioning\",\n\
         \x20   \"recommendation\": \"One actionable brand strategy recommendation\"\n\
         }}",
        title = req.title,
        content = req.summary,
    )
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)\s*```$").expect("valid fence regex"))
}

/// Strip an optional ``` fence (with optional language tag) around a model
/// reply. Unfenced text is returned trimmed.
pub fn strip_code_fence(reply: &str) -> &str {
    let t = reply.trim();
    if let Some(body) = fence_re().captures(t).and_then(|c| c.get(1)) {
        return body.as_str().trim();
    }
    // opening fence without a closing one
    if let Some(rest) = t.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+');
        return rest.trim();
    }
    t
}
