//! Serve Command
//!
//! Run the copilot HTTP API.
//!
//! Usage:
//!   fairform serve [--bind 0.0.0.0:8787]

use tracing::warn;

use crate::config::ConfigLoader;
use crate::server::{self, AppState};
use crate::types::Result;

pub async fn run(bind: Option<String>) -> Result<()> {
    let mut config = ConfigLoader::load()?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    config.validate()?;

    if config.auth.tokens.is_empty() {
        warn!("No API tokens configured; every request will be rejected");
    }

    let state = AppState::from_config(&config)?;
    server::serve(state, &config.server.bind, config.server.permissive_cors).await
}
