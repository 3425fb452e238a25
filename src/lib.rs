//! FairForm - Intake Copilot for Self-Represented Litigants
//!
//! A conversational API that turns free-form messages into structured case
//! facts, walks the user through a small stage machine, and creates a case
//! once the minimum information is confirmed.
//!
//! ## Core Features
//!
//! - **Deterministic Extraction**: regex and keyword rules, no model calls
//! - **Stage Machine**: GREET → GATHER_MIN → CONFIRM_CREATE → POST_CREATE_COACH
//! - **Ambiguity Checks**: duplicate cases, missing jurisdiction, vague requests
//! - **Streaming Replies**: SSE with form suggestions split out of the text
//! - **Moderation**: input and output screening with a safe fallback reply
//!
//! ## Quick Start
//!
//! ```ignore
//! use fairform::{AppState, ConfigLoader, server};
//!
//! let config = ConfigLoader::load()?;
//! let state = AppState::from_config(&config)?;
//! server::serve(state, &config.server.bind, false).await?;
//! ```
//!
//! ## Modules
//!
//! - [`copilot`]: extraction, stages, follow-ups, prompts and the turn pipeline
//! - [`ai`]: completion providers with retry, moderation
//! - [`storage`]: SQLite sessions, messages and cases; snapshot cache
//! - [`server`]: axum routes, bearer auth, SSE
//! - [`config`]: Figment-based layered configuration

pub mod ai;
pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod copilot;
pub mod server;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{Config, ConfigLoader};

pub use types::{ErrorCategory, ErrorPayload, FairError, Result, ResultExt, SessionId, UserIdentity};

pub use storage::{Database, PoolConfig, SharedDatabase, SnapshotCache};

pub use copilot::{
    CollectedInfo, ContextSnapshot, ConversationStage, TurnEvent, TurnOutcome, TurnProcessor,
    TurnRequest,
};

pub use ai::{CompletionProvider, Moderator, SharedModerator, SharedProvider};

pub use auth::{Authenticator, StaticTokenAuthenticator};

pub use server::{AppState, router};
