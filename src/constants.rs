//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Completion API retry constants
pub mod retry {
    /// Default number of retries after the first attempt
    pub const DEFAULT_MAX_RETRIES: usize = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (milliseconds)
    pub const MAX_DELAY_MS: u64 = 8_000;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;
}

/// Completion request defaults
pub mod llm {
    pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub const DEFAULT_TEMPERATURE: f32 = 0.3;
    pub const DEFAULT_MAX_TOKENS: usize = 800;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
}

/// Conversation constants
pub mod conversation {
    /// Number of prior messages replayed into the prompt
    pub const HISTORY_WINDOW: usize = 12;

    /// Maximum accepted length of a single user message (characters)
    pub const MAX_MESSAGE_CHARS: usize = 4_000;

    /// User snippets forwarded to the case-creation request
    pub const CASE_DESCRIPTION_SNIPPETS: usize = 3;

    /// Maximum characters kept per forwarded snippet
    pub const SNIPPET_MAX_CHARS: usize = 280;

    /// Reply substituted when output moderation blocks the assistant text
    pub const SAFE_FALLBACK_REPLY: &str = "I'm sorry, I can't help with that request. \
        I can help you understand your case, your deadlines, or which court forms you may need.";
}

/// Message listing constants
pub mod pagination {
    pub const DEFAULT_PAGE_SIZE: usize = 50;
    pub const MAX_PAGE_SIZE: usize = 200;
}

/// Snapshot cache constants
pub mod cache {
    /// Maximum sessions held in the snapshot cache
    pub const MAX_ENTRIES: usize = 1_000;

    /// Time-to-live for a cached snapshot (seconds)
    pub const TTL_SECS: u64 = 900;
}

/// Streaming constants
pub mod streaming {
    /// Buffered events between the turn task and the SSE writer
    pub const CHANNEL_CAPACITY: usize = 64;

    /// Maximum SSE decoder buffer (bytes)
    pub const MAX_DECODER_BUFFER: usize = 1024 * 1024;
}
