//! HTTP handlers for chat turns and session history

use std::convert::Infallible;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::http::header::ACCEPT;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::debug;

use super::AppState;
use super::error::ApiError;
use super::extract::AuthUser;
use crate::constants::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::constants::streaming::CHANNEL_CAPACITY;
use crate::copilot::TurnRequest;
use crate::storage::{MessagePage, SessionRecord};
use crate::types::{FairError, SessionId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub case_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<usize>,
    pub before: Option<String>,
}

fn wants_stream(headers: &HeaderMap, query: &ChatQuery) -> bool {
    query.stream
        || headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/event-stream"))
}

/// `POST /api/chat`
///
/// Request-level failures (auth, validation, blocked input) are returned as
/// JSON errors before any stream is opened. Once streaming, failures arrive
/// as an `error` event and the stream still ends with `[DONE]`.
pub async fn chat(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ChatQuery>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| FairError::validation("body", e.body_text()))?;

    let request = TurnRequest {
        message: body.message,
        session_id: body.session_id.filter(|s| !s.is_empty()).map(SessionId::new),
        case_id: body.case_id.filter(|s| !s.is_empty()),
    };
    let prepared = state.processor.prepare(&user, request).await?;

    if !wants_stream(&headers, &query) {
        let outcome = state.processor.complete(prepared).await?;
        return Ok(Json(outcome).into_response());
    }

    debug!(session_id = %prepared.session_id(), "Streaming reply");
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let processor = state.processor.clone();
    tokio::spawn(async move {
        processor.stream(prepared, tx).await;
    });

    let stream = async_stream::stream! {
        let mut rx = rx;
        while let Some(event) = rx.recv().await {
            yield Ok::<_, Infallible>(
                Event::default().event(event.name()).data(event.data().to_string()),
            );
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
}

/// `GET /api/sessions/{id}`
pub async fn get_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    let session = state.processor.load_session(&SessionId::new(id), &user.user_id)?;
    Ok(Json(session))
}

/// `DELETE /api/sessions/{id}`, archives rather than deletes
pub async fn archive_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .processor
        .archive_session(&SessionId::new(id), &user.user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/sessions/{id}/messages?limit&before`, newest first
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagePage>, ApiError> {
    let id = SessionId::new(id);
    state.processor.load_session(&id, &user.user_id)?;

    let limit = match query.limit {
        Some(0) => return Err(FairError::validation("limit", "limit must be at least 1").into()),
        Some(limit) => limit.min(MAX_PAGE_SIZE),
        None => DEFAULT_PAGE_SIZE,
    };

    let page = state
        .processor
        .db()
        .list_messages(&id, limit, query.before.as_deref())?;
    Ok(Json(page))
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let stats = state.cache.stats();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cache": {
            "entries": state.cache.len(),
            "hits": stats.hits,
            "misses": stats.misses,
            "evictions": stats.evictions,
            "invalidations": stats.invalidations,
            "hitRate": stats.hit_rate(),
        },
    }))
}
