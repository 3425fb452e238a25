//! Follow-up question selection.

use std::collections::BTreeSet;

use serde::Serialize;

use super::collected::{CollectedInfo, FieldKey};
use super::stage::ConversationStage;

/// A system-initiated question for one missing field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpQuestion {
    pub key: FieldKey,
    pub question: &'static str,
    pub reason: &'static str,
    /// Lower asks first
    pub priority: u8,
}

struct Candidate {
    key: FieldKey,
    question: &'static str,
    reason: &'static str,
}

/// Fixed priority order: minimum-info fields first, then supplementary ones.
const CANDIDATES: &[Candidate] = &[
    Candidate {
        key: FieldKey::Jurisdiction,
        question: "Which county (or city) is your case in?",
        reason: "Court forms and deadlines depend on the jurisdiction.",
    },
    Candidate {
        key: FieldKey::CaseNumber,
        question: "Do you have a case number? It is usually printed at the top of court papers.",
        reason: "The case number links your record to the court's docket.",
    },
    Candidate {
        key: FieldKey::HearingDate,
        question: "Has the court scheduled a hearing? If so, what is the date?",
        reason: "The hearing date drives every deadline before it.",
    },
    Candidate {
        key: FieldKey::CaseType,
        question: "What kind of legal issue is this, for example an eviction, small claims, or a debt collection case?",
        reason: "The case type determines which forms apply.",
    },
    Candidate {
        key: FieldKey::OpposingParty,
        question: "Who is the other party, such as your landlord or the company suing you?",
        reason: "Forms ask for the name of the opposing party.",
    },
    Candidate {
        key: FieldKey::AmountInDispute,
        question: "How much money is being claimed?",
        reason: "The amount in dispute affects which court and forms apply.",
    },
];

/// First candidate whose field is missing and that has not been asked before.
///
/// Pure: the caller records the returned key in `asked` before persisting.
pub fn select_next(collected: &CollectedInfo, asked: &BTreeSet<FieldKey>) -> Option<FollowUpQuestion> {
    CANDIDATES
        .iter()
        .enumerate()
        .find(|(_, c)| !collected.has(c.key) && !asked.contains(&c.key))
        .map(|(priority, c)| FollowUpQuestion {
            key: c.key,
            question: c.question,
            reason: c.reason,
            priority: priority as u8,
        })
}

/// Stage-aware selection. A pending confirmation is the only question while
/// in `CONFIRM_CREATE`, and nothing is asked once the case exists.
pub fn select_for_stage(
    stage: ConversationStage,
    collected: &CollectedInfo,
    asked: &BTreeSet<FieldKey>,
) -> Option<FollowUpQuestion> {
    match stage {
        ConversationStage::ConfirmCreate | ConversationStage::PostCreateCoach => None,
        ConversationStage::Greet | ConversationStage::GatherMin => select_next(collected, asked),
    }
}
