//! Conversation stage machine.
//!
//! ```text
//! GREET ──any field──▶ GATHER_MIN ──minimum info──▶ CONFIRM_CREATE ──"yes"──▶ POST_CREATE_COACH
//!                           ▲                              │
//!                           └──── minimum info lost ───────┘
//! ```
//!
//! [`next_stage`] performs exactly one move. [`settle`] chains moves within a
//! turn so a message carrying every field lands on `CONFIRM_CREATE`, but it
//! never confirms on the user's behalf.

use serde::{Deserialize, Serialize};

use super::collected::CollectedInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationStage {
    #[default]
    Greet,
    GatherMin,
    ConfirmCreate,
    PostCreateCoach,
}

impl ConversationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greet => "GREET",
            Self::GatherMin => "GATHER_MIN",
            Self::ConfirmCreate => "CONFIRM_CREATE",
            Self::PostCreateCoach => "POST_CREATE_COACH",
        }
    }

    /// Position on the happy path, used for ordering checks
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Greet => 0,
            Self::GatherMin => 1,
            Self::ConfirmCreate => 2,
            Self::PostCreateCoach => 3,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "GREET" => Some(Self::Greet),
            "GATHER_MIN" => Some(Self::GatherMin),
            "CONFIRM_CREATE" => Some(Self::ConfirmCreate),
            "POST_CREATE_COACH" => Some(Self::PostCreateCoach),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConversationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transition step. Pure.
pub fn next_stage(
    current: ConversationStage,
    collected: &CollectedInfo,
    latest_message: &str,
) -> ConversationStage {
    use ConversationStage::*;

    match current {
        Greet if !collected.is_empty() => GatherMin,
        Greet => Greet,
        GatherMin if collected.has_minimum_info() => ConfirmCreate,
        GatherMin => GatherMin,
        ConfirmCreate if !collected.has_minimum_info() => GatherMin,
        ConfirmCreate if is_affirmative(latest_message) => PostCreateCoach,
        ConfirmCreate => ConfirmCreate,
        PostCreateCoach => PostCreateCoach,
    }
}

/// Apply [`next_stage`] until it stops moving.
///
/// Stops at `CONFIRM_CREATE` unless the turn began there, so the user always
/// sees a confirmation prompt before a case is created. `corrected` marks a
/// turn that changed collected facts: from `CONFIRM_CREATE` it holds there
/// so the corrected facts are confirmed again.
pub fn settle(
    current: ConversationStage,
    collected: &CollectedInfo,
    latest_message: &str,
    corrected: bool,
) -> ConversationStage {
    if current == ConversationStage::ConfirmCreate && corrected {
        return if collected.has_minimum_info() {
            ConversationStage::ConfirmCreate
        } else {
            ConversationStage::GatherMin
        };
    }

    let started = current;
    let mut stage = current;

    loop {
        if stage == ConversationStage::ConfirmCreate && started != ConversationStage::ConfirmCreate {
            return stage;
        }
        let next = next_stage(stage, collected, latest_message);
        if next == stage {
            return stage;
        }
        // A regression out of CONFIRM_CREATE is final for this turn.
        if next.ordinal() < stage.ordinal() {
            return next;
        }
        stage = next;
    }
}

// =============================================================================
// Confirmation heuristic
// =============================================================================

const AFFIRMATIVE_PHRASES: &[&str] = &[
    "yes", "yeah", "yep", "yup", "sure", "ok", "okay", "correct", "confirm", "confirmed",
    "go ahead", "sounds good", "please do", "create it", "do it", "that's right", "thats right",
    "that is right", "absolutely", "of course", "si", "sí", "claro", "correcto",
    "confirmo", "de acuerdo", "adelante", "está bien", "esta bien", "dale", "por supuesto",
];

/// Matched as whole words anywhere in the message
const NEGATION_PHRASES: &[&str] = &[
    "no", "nope", "nah", "not", "never", "wrong", "incorrect", "don't", "dont", "do not", "wait",
    "cancel", "hold on", "espera", "cancela", "incorrecto", "nunca",
];

/// Whether the message reads as a confirmation: it opens with a yes-word
/// (English or Spanish) and carries no negation anywhere.
pub fn is_affirmative(message: &str) -> bool {
    let normalized = normalize(message);
    if normalized.is_empty() {
        return false;
    }

    if NEGATION_PHRASES.iter().any(|p| contains_phrase(&normalized, p)) {
        return false;
    }

    AFFIRMATIVE_PHRASES
        .iter()
        .any(|p| normalized == *p || normalized.starts_with(&format!("{} ", p)))
}

fn normalize(message: &str) -> String {
    message
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack == phrase
        || haystack.starts_with(&format!("{} ", phrase))
        || haystack.ends_with(&format!(" {}", phrase))
        || haystack.contains(&format!(" {} ", phrase))
}
