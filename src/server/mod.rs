//! HTTP Server
//!
//! Axum front end for the copilot:
//! - POST /api/chat - one turn, JSON or SSE
//! - GET /api/sessions/{id} - session with context snapshot
//! - DELETE /api/sessions/{id} - archive a session
//! - GET /api/sessions/{id}/messages - paginated history, newest first
//! - GET /api/health - liveness and cache stats

pub mod error;
pub mod extract;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::http::{Method, header};
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::ai::{SharedModerator, SharedProvider, create_moderator, create_provider};
use crate::auth::{SharedAuthenticator, StaticTokenAuthenticator};
use crate::config::Config;
use crate::copilot::{CaseManager, TurnProcessor};
use crate::storage::{Database, LocalCaseStore, SharedDatabase, SnapshotCache};
use crate::types::{FairError, Result};

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<TurnProcessor>,
    pub auth: SharedAuthenticator,
    pub cache: Arc<SnapshotCache>,
}

impl AppState {
    /// Wire every collaborator from configuration. Fails fast on a missing
    /// API key or an unusable database.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db: SharedDatabase = Arc::new(Database::open(&config.storage.path)?);
        let provider = create_provider(&config.llm)?;
        let moderator = create_moderator(config)?;
        let cases: Arc<dyn CaseManager> = Arc::new(LocalCaseStore::new(db.clone()));
        let auth: SharedAuthenticator = Arc::new(StaticTokenAuthenticator::from_config(&config.auth));

        info!(
            provider = provider.name(),
            model = provider.model(),
            moderation = moderator.name(),
            database = %config.storage.path.display(),
            "Copilot initialized"
        );

        Ok(Self::assemble(config, db, provider, moderator, cases, auth))
    }

    pub fn assemble(
        config: &Config,
        db: SharedDatabase,
        provider: SharedProvider,
        moderator: SharedModerator,
        cases: Arc<dyn CaseManager>,
        auth: SharedAuthenticator,
    ) -> Self {
        let cache = Arc::new(SnapshotCache::from_config(&config.cache));
        let processor = TurnProcessor::new(config, provider, moderator, db, cache.clone(), cases);
        Self {
            processor: Arc::new(processor),
            auth,
            cache,
        }
    }
}

pub fn router(state: AppState, permissive_cors: bool) -> Router {
    let cors = if permissive_cors {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
    };

    Router::new()
        .route("/api/chat", post(handlers::chat))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session).delete(handlers::archive_session),
        )
        .route("/api/sessions/{id}/messages", get(handlers::list_messages))
        .route("/api/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: AppState, bind: &str, permissive_cors: bool) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "Listening");

    axum::serve(listener, router(state, permissive_cors))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(FairError::Io)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
