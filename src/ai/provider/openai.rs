//! OpenAI API Provider
//!
//! Chat Completions client for OpenAI and compatible endpoints. Failures
//! are classified into [`AiServiceError`]s so the retry layer can decide
//! what to do with them.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{
    ChatMessage, Completion, CompletionOptions, CompletionProvider, CompletionStream, SseDecoder,
    StreamChunk, TokenUsage,
};
use crate::config::LlmConfig;
use crate::constants::llm::DEFAULT_API_BASE;
use crate::types::{AiServiceError, ErrorCategory, ErrorClassifier, FairError, Result, UPSTREAM_FAILURE_STATUS};

const PROVIDER: &str = "openai";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                FairError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY or llm.api_key".to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FairError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base,
            model: config.model.clone(),
            client,
        })
    }

    fn build_request<'a>(
        &self,
        messages: &'a [ChatMessage],
        options: &CompletionOptions,
        stream: bool,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: options.model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: Some(options.max_tokens),
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn send(&self, request: &ChatCompletionRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| FairError::from(ErrorClassifier::classify_transport(&e, PROVIDER)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = upstream_message(&body).unwrap_or_else(|| status.to_string());
            return Err(ErrorClassifier::classify_http_status(status.as_u16(), &message, PROVIDER).into());
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let start = Instant::now();
        let request = self.build_request(messages, options, false);
        let response = self.send(&request).await?;

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| FairError::from(ErrorClassifier::classify_transport(&e, PROVIDER)))?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                AiServiceError::new(
                    ErrorCategory::ParseError,
                    UPSTREAM_FAILURE_STATUS,
                    "No content in completion response",
                )
                .provider(PROVIDER)
            })?;

        info!(
            model = %options.model,
            latency_ms = start.elapsed().as_millis() as u64,
            tokens = usage.total(),
            "Completion received"
        );

        Ok(Completion {
            content,
            usage,
            model: body.model.unwrap_or_else(|| options.model.clone()),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionStream> {
        let request = self.build_request(messages, options, true);
        let response = self.send(&request).await?;
        debug!(model = %options.model, "Completion stream opened");

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(FairError::from(ErrorClassifier::classify_transport(&e, PROVIDER)));
                        break;
                    }
                };

                for frame in decoder.push(&chunk) {
                    if frame.is_done() {
                        break 'outer;
                    }
                    let parsed: StreamResponse = match frame.parse() {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            yield Err(e);
                            break 'outer;
                        }
                    };
                    for choice in parsed.choices {
                        if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
                            yield Ok(StreamChunk::Delta(delta));
                        }
                    }
                    if let Some(u) = parsed.usage {
                        yield Ok(StreamChunk::Usage(TokenUsage {
                            input_tokens: u.prompt_tokens,
                            output_tokens: u.completion_tokens,
                        }));
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Pull `error.message` out of an OpenAI error body.
fn upstream_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
        .filter(|m| !m.is_empty())
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: String,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        LlmConfig {
            api_key: Some("sk-test".into()),
            api_base: Some("http://localhost:9/v1/".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let provider = OpenAiProvider::new(&config()).unwrap();
        let debug = format!("{:?}", provider);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-test"));
        assert_eq!(provider.api_base, "http://localhost:9/v1");
    }

    #[test]
    fn test_blank_key_is_config_error() {
        let config = LlmConfig {
            api_key: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(OpenAiProvider::new(&config), Err(FairError::Config(_))));
    }

    #[test]
    fn test_stream_request_shape() {
        let provider = OpenAiProvider::new(&config()).unwrap();
        let messages = vec![ChatMessage::user("hi")];
        let options = CompletionOptions::from(&config());
        let value = serde_json::to_value(provider.build_request(&messages, &options, true)).unwrap();

        assert_eq!(value["stream"], true);
        assert_eq!(value["stream_options"]["include_usage"], true);
        assert_eq!(value["messages"][0]["role"], "user");

        let value = serde_json::to_value(provider.build_request(&messages, &options, false)).unwrap();
        assert!(value.get("stream_options").is_none());
    }

    #[test]
    fn test_stream_frame_parsing() {
        let frame: StreamResponse =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#).unwrap();
        assert_eq!(frame.choices[0].delta.content.as_deref(), Some("Hel"));

        let usage: StreamResponse = serde_json::from_str(
            r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#,
        )
        .unwrap();
        assert_eq!(usage.usage.unwrap().completion_tokens, 5);
    }

    #[test]
    fn test_upstream_message() {
        assert_eq!(
            upstream_message(r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#),
            Some("Rate limit reached".to_string())
        );
        assert_eq!(upstream_message("<html>bad gateway</html>"), None);
    }
}
