//! Text generator used for companion replies and the optional framing sentence in alerts.
//!
//! Any OpenAI-compatible chat endpoint works; the default is OpenRouter with
//! `OPENROUTER_API_KEY`. With no key configured the gateway runs without a generator and
//! every caller falls back to fixed copy.

use crate::risk::{strip_labels, LabelTag};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

/// Companion persona. Replies end with exactly one category tag.
pub const COMPANION_SYSTEM_PROMPT: &str = "You are SoulSync, an empathetic mental health companion. \
Reply warmly and briefly, suggest a small coping step when it fits, and never diagnose. \
If the user mentions self-harm or suicide, be gentle and mention that they can call or text 988. \
End every reply with exactly one tag describing the user's state, chosen from \
{{Normal}}, {{Stress}}, {{Anxiety}}, {{Depression}}, {{Bipolar}}, {{Personality disorder}}, {{Suicidal}}.";

/// Used when no generator is configured or the generator fails.
pub const FALLBACK_REPLY: &str = "I'm here to listen and support you. How are you feeling today?";

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("generator request failed: {0}")]
    Request(String),

    #[error("generator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generator response unreadable: {0}")]
    Parse(String),

    #[error("generator timed out after {0:?}")]
    Timeout(Duration),
}

/// Reply with tags removed and the label that was embedded, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub embedded_label: Option<LabelTag>,
}

pub type TextStream = BoxStream<'static, Result<String, GeneratorError>>;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw reply text, tags included.
    async fn generate(&self, system_prompt: &str, user_text: &str) -> Result<String, GeneratorError>;

    /// Raw reply as text deltas. Generators without streaming yield one chunk.
    async fn generate_stream(&self, system_prompt: &str, user_text: &str) -> Result<TextStream, GeneratorError> {
        let text = self.generate(system_prompt, user_text).await?;
        Ok(futures_util::stream::once(async move { Ok(text) }).boxed())
    }

    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<Completion, GeneratorError> {
        let raw = self.generate(system_prompt, user_text).await?;
        let stripped = strip_labels(&raw);
        Ok(Completion {
            text: stripped.display,
            embedded_label: stripped.label,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// One line of an OpenAI-style SSE body.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map(SseLine::Delta)
            .unwrap_or(SseLine::Skip),
        Err(e) => {
            tracing::debug!(target: "soulsync::generator", error = %e, "Skipping unparsable SSE chunk");
            SseLine::Skip
        }
    }
}

/// OpenRouter (or any OpenAI-compatible) chat completions client.
pub struct OpenRouterGenerator {
    api_key: String,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl OpenRouterGenerator {
    /// `None` when `OPENROUTER_API_KEY` is unset or blank. `OPENROUTER_MODEL` overrides the model.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("OPENROUTER_API_KEY").ok()?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let generator = Self::new(key.to_string());
        Some(match std::env::var("OPENROUTER_MODEL") {
            Ok(m) if !m.trim().is_empty() => generator.with_model(m.trim()),
            _ => generator,
        })
    }

    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.trim().to_string(),
            api_base: OPENROUTER_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            client,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn request(&self, system_prompt: &str, user_text: &str, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_text.to_string(),
                },
            ],
            temperature: Some(0.7),
            max_tokens: Some(512),
            stream: stream.then_some(true),
        }
    }

    async fn post(&self, body: &ChatRequest) -> Result<reqwest::Response, GeneratorError> {
        let res = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", "https://soulsync.local")
            .header("X-Title", "SoulSync")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeneratorError::Timeout(Duration::from_secs(60))
                } else {
                    GeneratorError::Request(e.to_string())
                }
            })?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::warn!(
                target: "soulsync::generator",
                status = status.as_u16(),
                model = %self.model,
                "Generator returned an error status"
            );
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res)
    }
}

#[async_trait]
impl TextGenerator for OpenRouterGenerator {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn generate(&self, system_prompt: &str, user_text: &str) -> Result<String, GeneratorError> {
        let body = self.request(system_prompt, user_text, false);
        let res = self.post(&body).await?;
        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| GeneratorError::Parse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GeneratorError::Parse("response had no choices".to_string()))
    }

    async fn generate_stream(&self, system_prompt: &str, user_text: &str) -> Result<TextStream, GeneratorError> {
        let body = self.request(system_prompt, user_text, true);
        let res = self.post(&body).await?;
        let stream = async_stream::try_stream! {
            let mut bytes = res.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| GeneratorError::Request(e.to_string()))?;
                buffer.extend_from_slice(&chunk);
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_sse_line(&String::from_utf8_lossy(&line)) {
                        SseLine::Delta(text) => yield text,
                        SseLine::Done => break 'read,
                        SseLine::Skip => {}
                    }
                }
            }
        };
        Ok(stream.boxed())
    }
}

/// OpenRouter when `OPENROUTER_API_KEY` is set, otherwise no generator.
pub fn generator_from_env() -> Option<Arc<dyn TextGenerator>> {
    match OpenRouterGenerator::from_env() {
        Some(g) => {
            tracing::info!(target: "soulsync::generator", model = %g.model, "Using OpenRouter text generator");
            Some(Arc::new(g))
        }
        None => {
            tracing::warn!(
                target: "soulsync::generator",
                "OPENROUTER_API_KEY not set; replies and alert framing use fixed copy"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskCategory;

    struct Canned(&'static str);

    #[async_trait]
    impl TextGenerator for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn generate(&self, _system: &str, _user: &str) -> Result<String, GeneratorError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn sse_lines() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            SseLine::Delta("Hel".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": OPENROUTER PROCESSING"), SseLine::Skip);
        assert_eq!(parse_sse_line(r#"data: {"choices":[{"delta":{}}]}"#), SseLine::Skip);
        assert_eq!(parse_sse_line("data: not json"), SseLine::Skip);
    }

    #[tokio::test]
    async fn complete_strips_and_reports_label() {
        let g = Canned("Take a slow breath with me. {{Anxiety}}");
        let c = g.complete("sys", "I'm panicking").await.unwrap();
        assert_eq!(c.text, "Take a slow breath with me.");
        assert_eq!(c.embedded_label, Some(LabelTag::Known(RiskCategory::Anxiety)));
    }

    #[tokio::test]
    async fn default_stream_is_one_chunk() {
        let g = Canned("hello {{Normal}}");
        let chunks: Vec<String> = g
            .generate_stream("sys", "hi")
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["hello {{Normal}}".to_string()]);
    }

    #[test]
    fn request_shape() {
        let g = OpenRouterGenerator::new("k".into()).with_model("m");
        let v = serde_json::to_value(g.request("s", "u", false)).unwrap();
        assert_eq!(v["model"], "m");
        assert_eq!(v["messages"][0]["role"], "system");
        assert!(v.get("stream").is_none());
        let v = serde_json::to_value(g.request("s", "u", true)).unwrap();
        assert_eq!(v["stream"], true);
    }
}
