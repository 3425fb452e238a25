//! Persisted per-session conversation state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::collected::{CollectedInfo, FieldKey};
use super::language::Language;
use super::stage::ConversationStage;
use crate::types::{Result, ValidationError, ValidationErrorKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub conversation_stage: ConversationStage,
    pub collected_info: CollectedInfo,
    pub asked_questions: BTreeSet<FieldKey>,
    /// Follow-up asked on the previous turn, used to read bare answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_question: Option<FieldKey>,
    /// Language of the most recent user message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

impl ContextSnapshot {
    /// Rebuild a snapshot from stored JSON.
    ///
    /// Unknown stage labels fall back to `GREET`, unknown question keys are
    /// dropped, and `collectedInfo` goes through [`CollectedInfo::from_stored`].
    pub fn from_stored(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            _ => {
                return Err(ValidationError::new(
                    ValidationErrorKind::Schema,
                    "contextSnapshot must be an object",
                )
                .with_field("contextSnapshot")
                .into());
            }
        };

        let conversation_stage = match map.get("conversationStage").and_then(Value::as_str) {
            Some(label) => ConversationStage::from_label(label).unwrap_or_else(|| {
                warn!(stage = label, "Unknown stored conversation stage, resetting to GREET");
                ConversationStage::Greet
            }),
            None => ConversationStage::Greet,
        };

        let collected_info =
            CollectedInfo::from_stored(map.get("collectedInfo").unwrap_or(&Value::Null))?;

        let asked_questions = map
            .get("askedQuestions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(FieldKey::from_key)
                    .collect()
            })
            .unwrap_or_default();

        let last_question = map
            .get("lastQuestion")
            .and_then(Value::as_str)
            .and_then(FieldKey::from_key);

        let language = map
            .get("language")
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        Ok(Self {
            conversation_stage,
            collected_info,
            asked_questions,
            last_question,
            language,
        })
    }

    pub fn to_stored(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
