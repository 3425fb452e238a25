//! Conversation Copilot
//!
//! Intake pipeline for self-represented litigants: extraction, stage
//! machine, follow-up selection, ambiguity detection, case creation and
//! prompt assembly. [`turn::TurnProcessor`] wires them together per message.

pub mod ambiguity;
pub mod bridge;
pub mod collected;
pub mod extractor;
pub mod followup;
pub mod language;
pub mod prompt;
pub mod reply;
pub mod snapshot;
pub mod stage;
pub mod turn;

pub use ambiguity::{ActiveCase, AmbiguityResult, AmbiguityType};
pub use bridge::{CaseCreationResult, CaseManager, NewCaseRequest};
pub use collected::{CaseType, CollectedInfo, FieldKey};
pub use followup::FollowUpQuestion;
pub use language::Language;
pub use reply::{FormSuggestion, ParsedReply, parse_reply};
pub use snapshot::ContextSnapshot;
pub use stage::ConversationStage;
pub use turn::{PreparedTurn, TurnEvent, TurnMeta, TurnOutcome, TurnProcessor, TurnRequest};
