//! Chat-completions HTTP Provider
//!
//! Implementation of `LlmProvider` over the common chat-completions wire
//! shape: JSON POST for requests, SSE `data:` lines for streaming. Works
//! against any endpoint speaking that shape; the base URL and key come from
//! the environment.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crew_core::{
    error::{CrewError, Result},
    message::Message,
    provider::{Completion, CompletionStream, GenerationOptions, LlmProvider, StreamChunk, TokenUsage},
};

/// Provider configuration
#[derive(Clone, Debug)]
pub struct ChatApiConfig {
    /// API base URL, e.g. `http://localhost:11434/v1`
    pub api_base: String,

    /// Bearer token; may be empty for local endpoints
    pub api_key: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:11434/v1".into(),
            api_key: String::new(),
            timeout_secs: 120,
        }
    }
}

impl ChatApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("LLM_API_BASE").unwrap_or(defaults.api_base),
            api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            timeout_secs: std::env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

/// HTTP provider for chat-completions endpoints
pub struct ChatApiProvider {
    client: reqwest::Client,
    config: ChatApiConfig,
}

impl ChatApiProvider {
    /// Create from configuration
    pub fn from_config(config: ChatApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CrewError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(ChatApiConfig::from_env())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Convert core messages to the wire format
    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    /// Build a request body
    fn build_request(
        messages: &[Message],
        options: &GenerationOptions,
        stream: bool,
    ) -> ChatRequest {
        ChatRequest {
            model: options.model.clone(),
            messages: Self::convert_messages(messages),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            stop: options.stop_sequences.clone(),
            response_format: options.json_mode.then(|| ResponseFormat {
                kind: "json_object".into(),
            }),
            stream,
        }
    }

    async fn post_chat(&self, body: &ChatRequest) -> Result<reqwest::Response> {
        let mut request = self.client.post(self.endpoint("chat/completions")).json(body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CrewError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CrewError::Provider(format!("{status}: {detail}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for ChatApiProvider {
    fn name(&self) -> &str {
        "chat-api"
    }

    async fn health_check(&self) -> Result<bool> {
        let mut request = self.client.get(self.endpoint("models"));
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }
        match request.send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!(error = %e, "health check failed");
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let body = Self::build_request(messages, options, false);
        let response = self.post_chat(&body).await?;
        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| CrewError::Provider(e.to_string()))?;

        let content = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CrewError::Provider("response carried no choices".into()))?;

        Ok(Completion {
            content,
            model: payload.model.unwrap_or_else(|| options.model.clone()),
            usage: payload.usage.map(TokenUsage::from),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let body = Self::build_request(messages, options, true);
        let response = self.post_chat(&body).await?;

        let (tx, rx) = mpsc::channel::<Result<StreamChunk>>(32);

        tokio::spawn(async move {
            let bytes = response.bytes_stream();
            tokio::pin!(bytes);
            // SSE lines can split anywhere across byte chunks; buffer until
            // a newline completes one.
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(CrewError::Provider(e.to_string()))).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_sse_line(line.trim()) {
                        SseLine::Delta(delta) => {
                            let chunk = StreamChunk { delta, done: false, usage: None };
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                        }
                        SseLine::Done => {
                            let done = StreamChunk { delta: String::new(), done: true, usage: None };
                            let _ = tx.send(Ok(done)).await;
                            return;
                        }
                        SseLine::Skip => {}
                    }
                }
            }
            // Connection closed without a [DONE] sentinel; end the stream
            // cleanly anyway.
            let done = StreamChunk { delta: String::new(), done: true, usage: None };
            let _ = tx.send(Ok(done)).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

enum SseLine {
    Delta(String),
    Done,
    Skip,
}

/// Interpret one SSE line from a streaming response
fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => {
            let delta = event
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .unwrap_or_default();
            SseLine::Delta(delta)
        }
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed stream event");
            SseLine::Skip
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct StreamEvent {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ChatApiConfig::default();
        assert_eq!(config.api_base, "http://localhost:11434/v1");
        assert_eq!(config.timeout_secs, 120);
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_request_body() {
        let messages = vec![Message::system("be terse"), Message::user("hi")];
        let options = GenerationOptions::for_model("test-model").json();
        let body = ChatApiProvider::build_request(&messages, &options, false);

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "test-model");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["stream"], false);
        assert!(value.get("stop").is_none());
    }

    #[test]
    fn test_parse_sse_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"hel"}}]}"#;
        assert!(matches!(parse_sse_line(line), SseLine::Delta(d) if d == "hel"));

        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
        assert!(matches!(parse_sse_line(""), SseLine::Skip));
        assert!(matches!(parse_sse_line(": keep-alive"), SseLine::Skip));
        assert!(matches!(parse_sse_line("data: not json"), SseLine::Skip));

        // Role-only first event carries no content delta
        let first = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(matches!(parse_sse_line(first), SseLine::Delta(d) if d.is_empty()));
    }

    #[test]
    fn test_endpoint_join() {
        let provider = ChatApiProvider::from_config(ChatApiConfig {
            api_base: "http://host/v1/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(provider.endpoint("chat/completions"), "http://host/v1/chat/completions");
    }
}
