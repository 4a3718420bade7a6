use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::Instrument;

use crate::llm::openai::{ChatMessage, ChatRequest, ChatRole, LlmClient};
use crate::normalize::normalize;
use crate::pipeline::RunContext;
use crate::record::AnalysisResult;
use crate::telemetry::ops::run::Phase as RunPhase;
use crate::telemetry::{self};

use super::prompt::{build_prompt, strip_code_fence, SYSTEM_PROMPT};
use super::{AnalysisRequest, Analyzer, ArticleAnalysisError, BatchCallError, Mode};

/// Floor for the pause after each model call.
pub const MIN_CALL_DELAY: Duration = Duration::from_millis(500);

/// Holds the next call back until `delay` has passed since the previous
/// call finished, however long that call took.
struct Pacer {
    delay: Duration,
    last_done: Mutex<Option<Instant>>,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self { delay, last_done: Mutex::new(None) }
    }

    async fn wait(&self) {
        let last = *self.last_done.lock().await;
        if let Some(done) = last {
            sleep_until(done + self.delay).await;
        }
    }

    async fn finished(&self) {
        *self.last_done.lock().await = Some(Instant::now());
    }
}

/// Variant A: one chat completion per article, strictly sequential.
pub struct DirectAnalyzer {
    client: Arc<dyn LlmClient>,
    pacer: Pacer,
}

impl DirectAnalyzer {
    pub fn new(client: Arc<dyn LlmClient>, delay: Duration) -> Self {
        Self { client, pacer: Pacer::new(delay.max(MIN_CALL_DELAY)) }
    }

    /// One record per request, in request order. Failures become error
    /// records and never stop the remaining requests. `on_done` sees the
    /// running count after each record.
    pub async fn analyze_requests<F>(&self, requests: &[AnalysisRequest], mut on_done: F) -> Vec<AnalysisResult>
    where
        F: FnMut(usize, &AnalysisResult) + Send,
    {
        let mut out = Vec::with_capacity(requests.len());
        for req in requests {
            let record = self.analyze_one(req).await;
            on_done(out.len() + 1, &record);
            out.push(record);
        }
        out
    }

    async fn analyze_one(&self, req: &AnalysisRequest) -> AnalysisResult {
        self.pacer.wait().await;
        let span = telemetry::run().span(&RunPhase::CallModel);
        let reply = self.call(req).instrument(span).await;
        self.pacer.finished().await;
        match reply {
            Ok(mut reply) => {
                for (key, value) in article_fields(req) {
                    reply.insert(key, value);
                }
                normalize(&Value::Object(reply))
            }
            Err(err) => {
                tracing::debug!(title = %req.title, error = %err, "article analysis failed");
                let mut failed = AnalysisResult::failed(&req.title, &req.link, &req.source, &err);
                failed.summary = req.body.clone();
                failed
            }
        }
    }

    async fn call(&self, req: &AnalysisRequest) -> Result<Map<String, Value>, ArticleAnalysisError> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::new(ChatRole::System, SYSTEM_PROMPT),
                ChatMessage::new(ChatRole::User, build_prompt(req)),
            ],
        };
        let reply = self.client.complete(request).await.map_err(ArticleAnalysisError::Model)?;
        parse_reply(&reply)
    }
}

pub(crate) fn parse_reply(reply: &str) -> Result<Map<String, Value>, ArticleAnalysisError> {
    match serde_json::from_str::<Value>(strip_code_fence(reply)) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ArticleAnalysisError::NotAnObject),
        Err(err) => Err(ArticleAnalysisError::InvalidJson(err)),
    }
}

// Article identity always comes from the feed, never from the model reply.
fn article_fields(req: &AnalysisRequest) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("title".into(), Value::String(req.title.clone()));
    m.insert("link".into(), Value::String(req.link.clone()));
    m.insert("source".into(), Value::String(req.source.clone()));
    m.insert("summary".into(), Value::String(req.body.clone()));
    m
}

#[async_trait]
impl Analyzer for DirectAnalyzer {
    fn mode(&self) -> Mode { Mode::Direct }

    async fn analyze(&self, feeds: &[String], ctx: &mut RunContext<'_>) -> Result<(), BatchCallError> {
        let total_feeds = feeds.len();
        for (index, feed_url) in feeds.iter().enumerate() {
            let Some(articles) = ctx.fetch_feed(index, feed_url).await else { continue };
            ctx.begin_analysis(index);

            let requests: Vec<AnalysisRequest> = articles.iter().map(AnalysisRequest::from_article).collect();
            let span = telemetry::run().span_kv(&RunPhase::Analyze, [
                ("feed_url", feed_url.clone()),
                ("articles", requests.len().to_string()),
            ]);
            let total = requests.len();
            let records = self
                .analyze_requests(&requests, |done, _| {
                    ctx.article_done(index, done, &format!(
                        "Analyzing article {}/{} from feed {}/{}", done, total, index + 1, total_feeds
                    ));
                })
                .instrument(span)
                .await;

            let errors = records.iter().filter(|r| r.is_error()).count();
            for record in records {
                ctx.record(record);
            }
            ctx.feed_done(index, feed_url, total, errors);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::RawArticle;
    use crate::llm::openai::{MockClient, OpenAiError};
    use crate::record::Sentiment;

    fn req(title: &str) -> AnalysisRequest {
        AnalysisRequest {
            title: title.into(),
            summary: format!("{title} body"),
            link: format!("https://x/{title}"),
            source: "https://x/feed".into(),
            body: format!("{title} body, in full"),
        }
    }

    /// Answers `{}` after a fixed delay.
    struct SlowClient(Duration);

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn complete(&self, _request: ChatRequest) -> Result<String, OpenAiError> {
            tokio::time::sleep(self.0).await;
            Ok("{}".into())
        }
    }

    #[test]
    fn parse_reply_accepts_fenced_object() {
        let map = parse_reply("```json\n{\"sentiment\": \"neutral\", \"confidence\": 0.5}\n```").unwrap();
        assert_eq!(map["sentiment"], "neutral");
    }

    #[test]
    fn parse_reply_rejects_non_objects_and_garbage() {
        assert!(matches!(parse_reply("[1, 2]"), Err(ArticleAnalysisError::NotAnObject)));
        assert!(matches!(parse_reply("I think it is positive"), Err(ArticleAnalysisError::InvalidJson(_))));
    }

    #[tokio::test]
    async fn one_record_per_request_in_order_with_isolated_failures() {
        let mock = Arc::new(MockClient::new());
        mock.push_reply(Ok(r#"{"sentiment": "positive", "confidence": 0.9, "archetype": "Hero", "key_insight": "k", "recommendation": "r"}"#.into()));
        mock.push_reply(Err(OpenAiError::Timeout));
        mock.push_reply(Ok("```json\n{\"sentiment\": \"Negative\", \"confidence\": 2, \"archetype\": \"Sage\"}\n```".into()));

        let analyzer = DirectAnalyzer::new(mock.clone(), Duration::ZERO);
        let requests = vec![req("A"), req("B"), req("C")];
        let mut seen = Vec::new();
        let out = analyzer.analyze_requests(&requests, |done, r| seen.push((done, r.title.clone()))).await;

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].sentiment, Sentiment::Positive);
        assert_eq!(out[0].title, "A");
        assert_eq!(out[0].source, "https://x/feed");
        assert_eq!(out[0].insight, "k");
        assert_eq!(out[1].sentiment, Sentiment::Error);
        assert_eq!(out[1].title, "B");
        assert_eq!(out[1].recommendation, "N/A");
        assert!(out[1].insight.contains("timed out"));
        assert_eq!(out[2].sentiment, Sentiment::Negative);
        assert_eq!(out[2].confidence, 1.0);
        assert_eq!(mock.calls().len(), 3);
        assert_eq!(seen, vec![(1, "A".to_string()), (2, "B".to_string()), (3, "C".to_string())]);
    }

    #[tokio::test]
    async fn prompt_carries_title_and_summary() {
        let mock = Arc::new(MockClient::new());
        mock.push_reply(Ok("{}".into()));
        let analyzer = DirectAnalyzer::new(mock.clone(), Duration::ZERO);
        analyzer.analyze_requests(&[req("Azure")], |_, _| {}).await;

        let calls = mock.calls();
        let user = &calls[0].messages[1];
        assert_eq!(user.role, ChatRole::User);
        assert!(user.content.contains("Title: Azure"));
        assert!(user.content.contains("Content: Azure body"));
    }

    #[tokio::test]
    async fn records_keep_the_full_body_while_the_prompt_is_cut() {
        let article = RawArticle {
            title: "Long".into(),
            link: "https://x/long".into(),
            summary: format!("<p>{}</p>", "word ".repeat(400)),
            source: "https://x/feed".into(),
        };
        let request = AnalysisRequest::from_article(&article);
        let mock = Arc::new(MockClient::new());
        mock.push_reply(Ok(r#"{"sentiment": "neutral", "summary": "model says"}"#.into()));
        mock.push_reply(Err(OpenAiError::Timeout));
        let analyzer = DirectAnalyzer::new(mock.clone(), Duration::ZERO);

        let out = analyzer.analyze_requests(&[request.clone(), request], |_, _| {}).await;
        for record in &out {
            assert!(record.summary.chars().count() > 1000);
            assert!(record.summary.starts_with("word word"));
        }
        let prompt = &mock.calls()[0].messages[1].content;
        assert!(!prompt.contains(out[0].summary.as_str()));
    }

    #[tokio::test]
    async fn every_call_is_followed_by_the_full_pause() {
        let call = Duration::from_millis(600);
        let analyzer = DirectAnalyzer::new(Arc::new(SlowClient(call)), Duration::ZERO);

        let started = Instant::now();
        analyzer.analyze_requests(&[req("A"), req("B")], |_, _| {}).await;
        assert!(started.elapsed() >= call * 2 + MIN_CALL_DELAY);
    }

    #[tokio::test]
    async fn configured_delay_above_the_floor_is_kept() {
        let mock = Arc::new(MockClient::new());
        mock.push_reply(Ok("{}".into()));
        mock.push_reply(Ok("{}".into()));
        let analyzer = DirectAnalyzer::new(mock, Duration::from_millis(700));

        let started = Instant::now();
        analyzer.analyze_requests(&[req("A"), req("B")], |_, _| {}).await;
        assert!(started.elapsed() >= Duration::from_millis(700));
    }
}
