use serde_json::Value;

use super::BatchCallError;

/// Top-level layouts a webhook (or an exported file) may use for its
/// records. Resolved once; everything downstream sees a plain list.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookResponse {
    /// `[record, ...]`, or a single bare record object
    Flat(Vec<Value>),
    /// `[{"data": [record, ...]}]`
    WrappedArray(Vec<Value>),
    /// `{"data": [record, ...]}`
    WrappedObject(Vec<Value>),
}

impl WebhookResponse {
    pub fn parse(body: Value) -> Result<Self, BatchCallError> {
        match body {
            Value::Array(mut items) => {
                if items.len() == 1 {
                    if let Some(data) = take_data(&mut items[0]) {
                        return Ok(WebhookResponse::WrappedArray(data));
                    }
                }
                Ok(WebhookResponse::Flat(items))
            }
            Value::Object(_) => {
                let mut body = body;
                if let Some(data) = take_data(&mut body) {
                    return Ok(WebhookResponse::WrappedObject(data));
                }
                if looks_like_record(&body) {
                    return Ok(WebhookResponse::Flat(vec![body]));
                }
                Err(BatchCallError::UnexpectedShape("object without a `data` array".into()))
            }
            Value::Null => Err(BatchCallError::UnexpectedShape("empty body".into())),
            other => Err(BatchCallError::UnexpectedShape(format!("top-level {}", type_name(&other)))),
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            WebhookResponse::Flat(_) => "flat",
            WebhookResponse::WrappedArray(_) => "wrapped_array",
            WebhookResponse::WrappedObject(_) => "wrapped_object",
        }
    }

    pub fn into_records(self) -> Vec<Value> {
        match self {
            WebhookResponse::Flat(v) | WebhookResponse::WrappedArray(v) | WebhookResponse::WrappedObject(v) => v,
        }
    }
}

fn take_data(v: &mut Value) -> Option<Vec<Value>> {
    let obj = v.as_object_mut()?;
    if !obj.get("data").is_some_and(Value::is_array) {
        return None;
    }
    match obj.remove("data") {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    }
}

fn looks_like_record(v: &Value) -> bool {
    v.get("sentiment").is_some() || v.get("ai_analysis").is_some()
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        _ => "value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_all;
    use serde_json::json;

    fn records() -> Value {
        json!([
            {"title": "A", "link": "https://x/a", "sentiment": "positive", "confidence": 0.8, "archetype": "Sage"},
            {"title": "B", "ai_analysis": {"sentiment": {"classification": "negative", "confidence": 0.4},
                                           "archetype": {"primary": "Rebel"}}}
        ])
    }

    #[test]
    fn detects_all_three_layouts() {
        let flat = WebhookResponse::parse(records()).unwrap();
        let wrapped_array = WebhookResponse::parse(json!([{ "data": records() }])).unwrap();
        let wrapped_object = WebhookResponse::parse(json!({ "data": records() })).unwrap();
        assert_eq!(flat.shape_name(), "flat");
        assert_eq!(wrapped_array.shape_name(), "wrapped_array");
        assert_eq!(wrapped_object.shape_name(), "wrapped_object");
    }

    #[test]
    fn all_layouts_normalize_to_the_same_records() {
        let expected = normalize_all(&WebhookResponse::parse(records()).unwrap().into_records());
        for body in [json!([{ "data": records() }]), json!({ "data": records() })] {
            let got = normalize_all(&WebhookResponse::parse(body).unwrap().into_records());
            assert_eq!(got, expected);
        }
        assert_eq!(expected.len(), 2);
        assert_eq!(expected[1].archetype, "Rebel");
    }

    #[test]
    fn single_record_array_is_flat_not_wrapped() {
        let body = json!([{"title": "A", "sentiment": "neutral", "data": "not a list"}]);
        let parsed = WebhookResponse::parse(body).unwrap();
        assert_eq!(parsed.shape_name(), "flat");
        assert_eq!(parsed.into_records().len(), 1);
    }

    #[test]
    fn bare_record_object_is_accepted() {
        let parsed = WebhookResponse::parse(json!({"title": "A", "sentiment": "neutral"})).unwrap();
        assert_eq!(parsed, WebhookResponse::Flat(vec![json!({"title": "A", "sentiment": "neutral"})]));
    }

    #[test]
    fn empty_array_is_an_empty_batch() {
        let parsed = WebhookResponse::parse(json!([])).unwrap();
        assert!(parsed.into_records().is_empty());
    }

    #[test]
    fn other_bodies_are_rejected() {
        assert!(matches!(WebhookResponse::parse(json!({"status": "ok"})), Err(BatchCallError::UnexpectedShape(_))));
        assert!(matches!(WebhookResponse::parse(json!("done")), Err(BatchCallError::UnexpectedShape(_))));
        assert!(matches!(WebhookResponse::parse(Value::Null), Err(BatchCallError::UnexpectedShape(_))));
    }
}
