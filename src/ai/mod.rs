//! AI Integration Layer
//!
//! Completion providers (with retry) and content moderation.

pub mod moderation;
pub mod provider;

pub use moderation::{
    DisabledModerator, KeywordModerator, ModerationVerdict, Moderator, OpenAiModerator,
    SharedModerator, create_moderator,
};
pub use provider::{
    ChatMessage, ChatRole, Completion, CompletionOptions, CompletionProvider, CompletionStream,
    RetryPolicy, RetryingProvider, SharedProvider, StreamChunk, TokenUsage, create_provider,
};
