//! Case-creation bridge.
//!
//! Translates what the conversation collected into a [`NewCaseRequest`] and
//! normalizes whatever the [`CaseManager`] returns into a
//! [`CaseCreationResult`] the prompt assembler can surface as-is.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ambiguity::ActiveCase;
use super::collected::{CaseType, CollectedInfo};
use crate::constants::conversation::{CASE_DESCRIPTION_SNIPPETS, SNIPPET_MAX_CHARS};
use crate::types::{ErrorPayload, Result, truncate_chars};

pub const INCOMPLETE_CASE_INFO: &str = "INCOMPLETE_CASE_INFO";

/// Case-management collaborator
#[async_trait]
pub trait CaseManager: Send + Sync {
    /// Create a case and return its id.
    async fn create_case(&self, request: &NewCaseRequest, auth_token: &str) -> Result<String>;

    /// Cases the user currently has open.
    async fn active_cases(&self, user_id: &str) -> Result<Vec<ActiveCase>>;
}

/// Creation request in the collaborator's shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCaseRequest {
    pub user_id: String,
    pub title: String,
    pub case_type: CaseType,
    pub jurisdiction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hearing_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opposing_party: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_in_dispute: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseCreationError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseCreationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CaseCreationError>,
}

impl CaseCreationResult {
    pub fn created(case_id: impl Into<String>) -> Self {
        Self {
            success: true,
            case_id: Some(case_id.into()),
            error: None,
        }
    }

    pub fn failed(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            case_id: None,
            error: Some(CaseCreationError {
                code: code.into(),
                message: message.into(),
                retryable,
            }),
        }
    }
}

/// What the bridge needs from the conversation
#[derive(Debug, Clone, Copy)]
pub struct ConversationState<'a> {
    pub collected: &'a CollectedInfo,
    /// User-authored messages, oldest first
    pub user_messages: &'a [String],
}

/// Build the creation request, or `None` if minimum info is missing.
pub fn build_request(state: ConversationState<'_>, user_id: &str) -> Option<NewCaseRequest> {
    let info = state.collected;
    if !info.has_minimum_info() {
        return None;
    }
    let case_type = info.case_type?;
    let jurisdiction = info.jurisdiction.clone()?;

    let title = match &info.case_number {
        Some(number) => format!("{} - {} ({})", case_type.display_name(), jurisdiction, number),
        None => format!("{} - {}", case_type.display_name(), jurisdiction),
    };

    let skip = state.user_messages.len().saturating_sub(CASE_DESCRIPTION_SNIPPETS);
    let description = state.user_messages[skip..]
        .iter()
        .map(|m| truncate_chars(m.trim(), SNIPPET_MAX_CHARS))
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Some(NewCaseRequest {
        user_id: user_id.to_string(),
        title,
        case_type,
        jurisdiction,
        case_number: info.case_number.clone(),
        hearing_date: info.hearing_date.clone(),
        opposing_party: info.opposing_party.clone(),
        amount_in_dispute: info.amount_in_dispute.clone(),
        description,
    })
}

/// Create a case from the conversation. Never fails; errors are folded
/// into the result.
pub async fn create_from_conversation(
    manager: &dyn CaseManager,
    state: ConversationState<'_>,
    user_id: &str,
    auth_token: &str,
) -> CaseCreationResult {
    let Some(request) = build_request(state, user_id) else {
        return CaseCreationResult::failed(
            INCOMPLETE_CASE_INFO,
            "Case type, jurisdiction, and a case number or hearing date are required",
            false,
        );
    };

    match manager.create_case(&request, auth_token).await {
        Ok(case_id) => {
            info!(case_id = %case_id, case_type = %request.case_type, "Created case from conversation");
            CaseCreationResult::created(case_id)
        }
        Err(e) => {
            warn!(error = %e, code = e.code(), "Case creation failed");
            let payload = ErrorPayload::from(&e);
            CaseCreationResult::failed(payload.code, payload.message, payload.retryable)
        }
    }
}
