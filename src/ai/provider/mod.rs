//! Completion Provider Abstraction
//!
//! Defines the `CompletionProvider` trait for chat completions, batched or
//! streamed. Providers are wrapped in [`RetryingProvider`] so every caller
//! gets the same backoff and error classification.
//!
//! ## Modules
//!
//! - `openai`: OpenAI-compatible Chat Completions client
//! - `retry`: Exponential backoff policy and retrying decorator
//! - `sse`: Server-sent event decoder for streamed responses

mod openai;
mod retry;
mod sse;

pub use openai::OpenAiProvider;
pub use retry::{RetryPolicy, RetryingProvider};
pub use sse::{SseDecoder, SseFrame};

pub use crate::types::{ErrorCategory, ErrorClassifier};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::types::{FairError, Result};

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// =============================================================================
// Options and Results
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl From<&LlmConfig> for CompletionOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Token usage reported by the upstream API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt)
    pub input_tokens: u32,
    /// Output tokens (response)
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A finished, non-streamed completion
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// One item of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Delta(String),
    /// Usage totals, sent by some providers just before the stream ends
    Usage(TokenUsage),
}

pub type CompletionStream = BoxStream<'static, Result<StreamChunk>>;

/// Shared provider type for concurrent access across requests.
pub type SharedProvider = Arc<dyn CompletionProvider>;

// =============================================================================
// Provider Trait
// =============================================================================

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion>;

    /// Open a token stream. Errors before the first chunk are returned here;
    /// errors mid-stream arrive as stream items.
    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionStream>;
}

/// Create a shared, retrying provider from configuration.
///
/// A missing API key is a configuration error, surfaced at startup.
pub fn create_provider(config: &LlmConfig) -> Result<SharedProvider> {
    let policy = RetryPolicy::from_config(config);
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(RetryingProvider::new(
            OpenAiProvider::new(config)?,
            policy,
        ))),
        other => Err(FairError::Config(format!(
            "Unknown provider: {}. Supported: openai",
            other
        ))),
    }
}
