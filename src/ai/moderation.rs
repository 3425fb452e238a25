//! Content moderation.
//!
//! A [`Moderator`] returns a verdict for a piece of text. A failing
//! moderator is a `ModerationFailure`, never a block: callers must be able
//! to tell "the service said no" apart from "the service is down".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, ModerationProvider};
use crate::constants::llm::DEFAULT_API_BASE;
use crate::types::{FairError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub flagged: bool,
    pub blocked: bool,
    pub categories: Vec<String>,
}

impl ModerationVerdict {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn block(categories: Vec<String>) -> Self {
        Self {
            flagged: true,
            blocked: true,
            categories,
        }
    }
}

#[async_trait]
pub trait Moderator: Send + Sync {
    fn name(&self) -> &str;

    async fn moderate(&self, text: &str) -> Result<ModerationVerdict>;
}

pub type SharedModerator = Arc<dyn Moderator>;

/// Build the configured moderator.
pub fn create_moderator(config: &Config) -> Result<SharedModerator> {
    match config.moderation.provider {
        ModerationProvider::OpenAi => Ok(Arc::new(OpenAiModerator::new(config)?)),
        ModerationProvider::Keyword => Ok(Arc::new(KeywordModerator::new(
            config.moderation.blocked_terms.clone(),
        ))),
        ModerationProvider::Disabled => Ok(Arc::new(DisabledModerator)),
    }
}

// =============================================================================
// Disabled
// =============================================================================

#[derive(Debug, Default)]
pub struct DisabledModerator;

#[async_trait]
impl Moderator for DisabledModerator {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn moderate(&self, _text: &str) -> Result<ModerationVerdict> {
        Ok(ModerationVerdict::pass())
    }
}

// =============================================================================
// Keyword
// =============================================================================

/// Blocks text containing any configured term (case-insensitive, whole words).
#[derive(Debug)]
pub struct KeywordModerator {
    terms: Vec<String>,
}

impl KeywordModerator {
    pub fn new(terms: Vec<String>) -> Self {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

#[async_trait]
impl Moderator for KeywordModerator {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();

        let hits: Vec<String> = self
            .terms
            .iter()
            .filter(|term| {
                if term.contains(' ') {
                    lowered.contains(term.as_str())
                } else {
                    words.contains(&term.as_str())
                }
            })
            .map(|term| format!("keyword:{}", term))
            .collect();

        if hits.is_empty() {
            Ok(ModerationVerdict::pass())
        } else {
            debug!(hits = hits.len(), "Keyword moderator blocked text");
            Ok(ModerationVerdict::block(hits))
        }
    }
}

// =============================================================================
// OpenAI
// =============================================================================

const MODERATION_TIMEOUT_SECS: u64 = 15;

pub struct OpenAiModerator {
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiModerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiModerator")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiModerator {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .llm
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                FairError::Config(
                    "OpenAI moderation requires an API key. Set OPENAI_API_KEY or use moderation.provider = \"keyword\"".to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(MODERATION_TIMEOUT_SECS))
            .build()
            .map_err(|e| FairError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base: config
                .llm
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.moderation.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl Moderator for OpenAiModerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        let url = format!("{}/moderations", self.api_base);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&ModerationRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| FairError::ModerationFailure(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(status = status.as_u16(), "Moderation endpoint returned error");
            return Err(FairError::ModerationFailure(format!(
                "moderation endpoint returned {}",
                status
            )));
        }

        let body: ModerationResponse = response
            .json()
            .await
            .map_err(|e| FairError::ModerationFailure(format!("invalid response: {}", e)))?;

        Ok(verdict_from_response(body))
    }
}

fn verdict_from_response(body: ModerationResponse) -> ModerationVerdict {
    let mut categories: Vec<String> = body
        .results
        .iter()
        .flat_map(|r| r.categories.iter().filter(|(_, hit)| **hit).map(|(name, _)| name.clone()))
        .collect();
    categories.sort();
    categories.dedup();

    if body.results.iter().any(|r| r.flagged) {
        ModerationVerdict::block(categories)
    } else {
        ModerationVerdict::pass()
    }
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: std::collections::BTreeMap<String, bool>,
}
