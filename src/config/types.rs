//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (XDG config dir) and project (.fairform/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{cache, conversation, llm, retry};
use crate::types::{FairError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Completion API settings
    pub llm: LlmConfig,

    /// Moderation collaborator settings
    pub moderation: ModerationConfig,

    /// Persistence settings
    pub storage: StorageConfig,

    /// Conversation pipeline settings
    pub conversation: ConversationConfig,

    /// Snapshot cache settings
    pub cache: CacheConfig,

    /// Bearer credential settings
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            moderation: ModerationConfig::default(),
            storage: StorageConfig::default(),
            conversation: ConversationConfig::default(),
            cache: CacheConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `FairError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(FairError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(FairError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(FairError::Config(
                "LLM max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.llm.base_delay_ms > self.llm.max_delay_ms {
            return Err(FairError::Config(format!(
                "LLM base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.llm.base_delay_ms, self.llm.max_delay_ms
            )));
        }

        if let Some(base) = &self.llm.api_base {
            url::Url::parse(base)
                .map_err(|e| FairError::Config(format!("Invalid llm.api_base '{}': {}", base, e)))?;
        }

        if self.conversation.history_window == 0 {
            return Err(FairError::Config(
                "conversation.history_window must be greater than 0".to_string(),
            ));
        }

        if self.cache.max_entries == 0 {
            return Err(FairError::Config(
                "cache.max_entries must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    pub bind: String,
    /// Allow any origin (development only)
    pub permissive_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            permissive_cors: false,
        }
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

/// Completion API configuration.
///
/// The API key is never serialized to output and is redacted in debug output.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider type: "openai"
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    /// Retries after the first attempt for 5xx and network failures
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_retries", &self.max_retries)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: llm::DEFAULT_MODEL.to_string(),
            temperature: llm::DEFAULT_TEMPERATURE,
            max_tokens: llm::DEFAULT_MAX_TOKENS,
            timeout_secs: llm::DEFAULT_TIMEOUT_SECS,
            api_key: None,
            api_base: None,
            max_retries: retry::DEFAULT_MAX_RETRIES,
            base_delay_ms: retry::BASE_DELAY_MS,
            max_delay_ms: retry::MAX_DELAY_MS,
        }
    }
}

// =============================================================================
// Moderation Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModerationProvider {
    /// OpenAI moderation endpoint (shares the LLM credentials)
    #[default]
    OpenAi,
    /// Local term list
    Keyword,
    /// Pass-through; every text passes
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub provider: ModerationProvider,
    pub model: String,
    /// Terms blocked by the keyword moderator (case-insensitive, whole word)
    pub blocked_terms: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            provider: ModerationProvider::OpenAi,
            model: "omni-moderation-latest".to_string(),
            blocked_terms: Vec::new(),
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".fairform/fairform.db"),
        }
    }
}

// =============================================================================
// Conversation Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Prior messages replayed into each prompt
    pub history_window: usize,
    pub max_message_chars: usize,
    /// Reply substituted when output moderation blocks
    pub fallback_reply: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: conversation::HISTORY_WINDOW,
            max_message_chars: conversation::MAX_MESSAGE_CHARS,
            fallback_reply: conversation::SAFE_FALLBACK_REPLY.to_string(),
        }
    }
}

// =============================================================================
// Cache Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: cache::MAX_ENTRIES,
            ttl_secs: cache::TTL_SECS,
        }
    }
}

// =============================================================================
// Auth Configuration
// =============================================================================

/// One accepted bearer credential
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiToken {
    pub user_id: String,
    #[serde(skip_serializing)]
    pub token: String,
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiToken")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<ApiToken>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_invalid_temperature_rejected() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_invalid_api_base_rejected() {
        let mut config = Config::default();
        config.llm.api_base = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_delay_bounds_checked() {
        let mut config = Config::default();
        config.llm.base_delay_ms = 10_000;
        config.llm.max_delay_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secrets_not_serialized_or_debugged() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());
        config.auth.tokens.push(ApiToken {
            user_id: "u1".to_string(),
            token: "tok-secret".to_string(),
        });

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(!json.contains("tok-secret"));

        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("tok-secret"));
    }
}
