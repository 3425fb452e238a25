//! Chat Command
//!
//! Run a single copilot turn from the terminal against the configured
//! database and provider. Useful for trying prompts without the HTTP layer.
//!
//! Usage:
//!   fairform chat "I got an eviction notice" [--session <id>] [--json]

use std::sync::Arc;

use tracing::info;

use crate::ai::{create_moderator, create_provider};
use crate::config::ConfigLoader;
use crate::copilot::{CaseManager, TurnProcessor, TurnRequest};
use crate::storage::{Database, LocalCaseStore, SharedDatabase, SnapshotCache};
use crate::types::{Result, SessionId, UserIdentity};

/// Identity used for terminal turns
pub const OPERATOR_USER: &str = "local-operator";
const OPERATOR_TOKEN: &str = "local";

pub async fn run(message: String, session: Option<String>, json: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    config.validate()?;

    let db: SharedDatabase = Arc::new(Database::open(&config.storage.path)?);
    let cases: Arc<dyn CaseManager> = Arc::new(LocalCaseStore::new(db.clone()));
    let processor = TurnProcessor::new(
        &config,
        create_provider(&config.llm)?,
        create_moderator(&config)?,
        db,
        Arc::new(SnapshotCache::from_config(&config.cache)),
        cases,
    );

    let user = UserIdentity::new(OPERATOR_USER, OPERATOR_TOKEN);
    let request = TurnRequest {
        message,
        session_id: session.map(SessionId::new),
        case_id: None,
    };
    let outcome = processor.handle(&user, request).await?;
    info!(session_id = %outcome.session_id, "Turn complete");

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("{}", outcome.reply);
    println!();
    println!("Stage:   {}", outcome.meta.turn.stage);
    if let Some(question) = &outcome.meta.turn.next_question {
        println!("Next:    {}", question.question);
    }
    if let Some(suggestion) = outcome.form_suggestion() {
        println!("Form:    {}", suggestion.form_id);
    }
    println!("Session: {}", outcome.session_id);
    Ok(())
}
