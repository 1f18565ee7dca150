//! LLM Provider Abstraction
//!
//! Defines the interface every model backend implements, plus the handle
//! type that pairs a backend with a concrete model id. The team carries a
//! default handle; individual agents may own an override.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// Configuration for a single model call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    pub top_p: f32,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,

    /// Request a strict-JSON response from the provider
    #[serde(default)]
    pub json_mode: bool,
}

impl GenerationOptions {
    /// Options for the given model with the core's defaults
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            max_tokens: 1024,
            top_p: 0.9,
            stop_sequences: Vec::new(),
            json_mode: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Ask the provider for a strict-JSON response
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Response from a completed (non-streaming) model call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if the provider reports them)
    pub usage: Option<TokenUsage>,
}

/// Token usage statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A chunk from a streaming completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamChunk {
    /// The text delta
    pub delta: String,

    /// Whether this is the final chunk
    pub done: bool,

    /// Token usage (typically only on the final chunk)
    pub usage: Option<TokenUsage>,
}

/// Stream type for completion streaming
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Strategy trait for LLM providers
///
/// The execution core works exclusively through this interface; implement it
/// to add support for a new backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, for logs
    fn name(&self) -> &str;

    /// Check if the provider is reachable and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion from messages
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion>;

    /// Generate a streaming completion
    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream>;
}

/// A provider paired with a concrete model id
///
/// Cheap to clone; the provider itself is shared by reference.
#[derive(Clone)]
pub struct ModelHandle {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl ModelHandle {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// The model id this handle targets
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The backing provider
    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    /// Default generation options for this handle's model
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions::for_model(&self.model)
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}
