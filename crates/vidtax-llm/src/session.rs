use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace};

use super::*;
use crate::response::{OpenAiResponse, TokenUsage};
use crate::router::completion_url;

pub const HTTP_REFERER: &str = "https://github.com/vidtax/vidtax";
pub const HTTP_TITLE: &str = "vidtax";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatHttpConfig {
    pub referer: &'static str,
    pub title: &'static str,
    pub timeout: Duration,
}

impl Default for ChatHttpConfig {
    fn default() -> Self {
        Self {
            referer: HTTP_REFERER,
            title: HTTP_TITLE,
            timeout: Duration::from_secs(LLM_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestMessage {
    pub role: String,
    pub content: String,
}

impl RequestMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Assistant text plus whatever usage the provider reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub usage: Option<TokenUsage>,
    pub elapsed: Duration,
}

/// A configured chat-completions endpoint: url, key and model.
#[derive(Clone, Debug)]
pub struct ChatClient {
    http: reqwest::Client,
    url: url::Url,
    api_key: String,
    model: String,
    cfg: ChatHttpConfig,
    temperature: Option<f32>,
}

impl ChatClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            http,
            url: completion_url(base_url)?,
            api_key: api_key.into(),
            model: model.into(),
            cfg: ChatHttpConfig::default(),
            temperature: None,
        })
    }

    /// Client for router `R`, with the key read from `key_env` or the router's
    /// default variable.
    pub fn for_router<R: Router>(
        http: reqwest::Client,
        model: impl Into<String>,
        base_url: Option<&str>,
        key_env: Option<&str>,
    ) -> Result<Self, LlmError> {
        let api_key = match key_env {
            Some(name) => std::env::var(name).map_err(|_| LlmError::MissingApiKey(name.into()))?,
            None => R::resolve_api_key()
                .map_err(|_| LlmError::MissingApiKey(R::API_KEY_NAME.into()))?,
        };
        Self::new(http, base_url.unwrap_or(R::BASE_URL), api_key, model)
    }

    pub fn with_config(mut self, cfg: ChatHttpConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a single user message and return the assistant text.
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.len()))]
    pub async fn complete(&self, prompt: &str) -> Result<ChatReply, LlmError> {
        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![RequestMessage::user(prompt)],
            temperature: self.temperature,
        };
        let started = Instant::now();
        let (content, usage) = chat_step(&self.http, &self.url, &self.api_key, &req, &self.cfg).await?;
        let elapsed = started.elapsed();
        debug!(elapsed_ms = elapsed.as_millis() as u64, "chat completion returned");
        trace!(target: "llm_raw", model = %self.model, content = %content);
        Ok(ChatReply {
            content,
            usage,
            elapsed,
        })
    }
}

pub async fn chat_step(
    client: &reqwest::Client,
    url: &url::Url,
    api_key: &str,
    req: &ChatRequest,
    cfg: &ChatHttpConfig,
) -> Result<(String, Option<TokenUsage>), LlmError> {
    let resp = client
        .post(url.clone())
        .bearer_auth(api_key)
        .header("Accept", "application/json")
        .header("HTTP-Referer", cfg.referer)
        .header("X-Title", cfg.title)
        .json(req)
        .timeout(cfg.timeout)
        .send()
        .await
        .map_err(|e| LlmError::Request {
            message: e.to_string(),
            url: Some(url.to_string()),
            is_timeout: e.is_timeout(),
        })?;

    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(|e| LlmError::Request {
        message: e.to_string(),
        url: Some(url.to_string()),
        is_timeout: e.is_timeout(),
    })?;

    match status {
        200..=299 => parse_chat_outcome(&body),
        401 | 403 => Err(LlmError::Authentication),
        429 => Err(LlmError::RateLimited),
        _ => Err(LlmError::Api {
            status,
            message: format!("provider returned status {status}"),
            url: Some(url.to_string()),
            body_snippet: Some(truncate_for_error(&body, 500)),
        }),
    }
}

/// Parse a non-streaming OpenAI/OpenRouter-style body into assistant text.
///
/// Some providers return `{ "error": ... }` in a 200 OK body. That is
/// detected first and surfaced as [`LlmError::Api`].
pub fn parse_chat_outcome(body_text: &str) -> Result<(String, Option<TokenUsage>), LlmError> {
    use serde_json::Value;

    if let Ok(v) = serde_json::from_str::<Value>(body_text) {
        if let Some(err) = v.get("error") {
            let msg = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown provider error");
            // Provider "code" is often not an HTTP status; prefer an explicit `status`.
            let status = err
                .get("status")
                .or_else(|| err.get("code"))
                .and_then(|s| s.as_u64())
                .unwrap_or(200) as u16;
            return Err(LlmError::Api {
                status,
                message: msg.to_string(),
                url: None,
                body_snippet: Some(truncate_for_error(body_text, 500)),
            });
        }
    }

    let parsed: OpenAiResponse =
        serde_json::from_str(body_text).map_err(|e| LlmError::Deserialization {
            message: e.to_string(),
            body_snippet: Some(truncate_for_error(body_text, 2_000)),
        })?;

    let usage = parsed.usage;
    for choice in parsed.choices {
        if let Some(text) = choice.message.and_then(|m| m.content) {
            return Ok((text, usage));
        }
        if let Some(text) = choice.text {
            return Ok((text, usage));
        }
    }

    Err(LlmError::Deserialization {
        message: "No usable choice in LLM response (no message/text)".into(),
        body_snippet: Some(truncate_for_error(body_text, 500)),
    })
}

/// Truncate large response bodies so error strings remain bounded.
pub(crate) fn truncate_for_error(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let head_end = floor_char_boundary(s, max.saturating_sub(200));
    let tail_start = floor_char_boundary(s, s.len().saturating_sub(200));
    format!("{}…<snip>…{}", &s[..head_end], &s[tail_start..])
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    fn ok_body(content: &str) -> String {
        serde_json::json!({
            "id": "gen-1",
            "model": "google/gemini-2.0-flash-001",
            "choices": [{"finish_reason": "stop", "message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        })
        .to_string()
    }

    #[test]
    fn parses_content_and_usage() {
        let (text, usage) = parse_chat_outcome(&ok_body("[\"gaming\"]")).unwrap();
        assert_eq!(text, "[\"gaming\"]");
        assert_eq!(usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn embedded_error_in_200_is_api_error() {
        let body = r#"{"error": {"message": "upstream overloaded", "code": 502}}"#;
        match parse_chat_outcome(body).unwrap_err() {
            LlmError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream overloaded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_choices_is_deserialization_error() {
        let err = parse_chat_outcome(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, LlmError::Deserialization { .. }));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(2_000);
        let t = truncate_for_error(&s, 500);
        assert!(t.contains("<snip>"));
    }

    #[tokio::test]
    async fn complete_posts_with_bearer_auth() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key")
                .body_contains("\"model\":\"test-model\"");
            then.status(200)
                .header("content-type", "application/json")
                .body(ok_body("hello"));
        });
        let client = ChatClient::new(
            reqwest::Client::new(),
            &server.url("/v1"),
            "test-key",
            "test-model",
        )
        .unwrap();
        let reply = client.complete("hi").await.unwrap();
        m.assert();
        assert_eq!(reply.content, "hello");
    }

    #[tokio::test]
    async fn status_codes_map_to_variants() {
        let server = MockServer::start();
        let _limited = server.mock(|when, then| {
            when.method(POST).path("/limited/chat/completions");
            then.status(429).body("slow down");
        });
        let _down = server.mock(|when, then| {
            when.method(POST).path("/down/chat/completions");
            then.status(503).body("unavailable");
        });
        let _auth = server.mock(|when, then| {
            when.method(POST).path("/auth/chat/completions");
            then.status(401).body("nope");
        });
        let http = reqwest::Client::new();
        let call = |prefix: &str| {
            ChatClient::new(http.clone(), &server.url(prefix), "k", "m").unwrap()
        };

        let err = call("/limited").complete("x").await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited));
        let err = call("/down").complete("x").await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 503, .. }));
        assert!(err.is_retryable());
        let err = call("/auth").complete("x").await.unwrap_err();
        assert!(matches!(err, LlmError::Authentication));
        assert!(!err.is_retryable());
    }
}
