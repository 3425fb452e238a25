//! Prompt Assembly
//!
//! Builds the message list sent to the completion API:
//! `[system, ...history, user]`.
//!
//! The system block is rendered from ordered sections (role, stage goal,
//! collected info, next question, ambiguity, case creation, language,
//! form-suggestion protocol). Identical inputs always render byte-identical
//! text; nothing here depends on map iteration order or the clock.

use super::ambiguity::AmbiguityResult;
use super::bridge::CaseCreationResult;
use super::collected::CollectedInfo;
use super::followup::FollowUpQuestion;
use super::language::Language;
use super::reply::{FORM_SUGGESTION_CLOSE, FORM_SUGGESTION_OPEN};
use super::stage::ConversationStage;
use crate::ai::provider::ChatMessage;

/// Prompt section types
#[derive(Debug, Clone)]
enum PromptSection {
    Role(String),
    Objectives(Vec<String>),
    Text { header: String, content: String },
    Rules { header: String, items: Vec<String> },
}

/// Ordered section builder for the system block
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, description: &str) -> Self {
        self.sections.push(PromptSection::Role(description.to_string()));
        self
    }

    pub fn objectives<I, S>(mut self, objectives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sections.push(PromptSection::Objectives(
            objectives.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn section(mut self, header: &str, content: impl Into<String>) -> Self {
        self.sections.push(PromptSection::Text {
            header: header.to_string(),
            content: content.into(),
        });
        self
    }

    pub fn rules<I, S>(mut self, header: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sections.push(PromptSection::Rules {
            header: header.to_string(),
            items: items.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role(description) => {
                    prompt.push_str("<ROLE>\n");
                    prompt.push_str(&description);
                    prompt.push_str("\n</ROLE>\n\n");
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("<OBJECTIVES>\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push_str("</OBJECTIVES>\n\n");
                }
                PromptSection::Text { header, content } => {
                    prompt.push_str(&format!("# {}\n\n", header));
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::Rules { header, items } => {
                    prompt.push_str(&format!("# {}\n\n", header));
                    for item in items {
                        prompt.push_str(&format!("- {}\n", item));
                    }
                    prompt.push('\n');
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

/// Everything the assembler needs for one turn
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub stage: ConversationStage,
    pub collected: &'a CollectedInfo,
    pub next_question: Option<&'a FollowUpQuestion>,
    pub ambiguity: &'a AmbiguityResult,
    pub case_creation: Option<&'a CaseCreationResult>,
    pub language: Language,
    /// Prior turns, oldest first, already windowed
    pub history: &'a [ChatMessage],
    pub message: &'a str,
}

const ROLE: &str = "You are FairForm Copilot, a plain-language assistant that helps people \
without a lawyer understand and move their court case forward. You give legal information, \
not legal advice, and you never claim to be a lawyer.";

fn stage_goal(stage: ConversationStage) -> &'static str {
    match stage {
        ConversationStage::Greet => {
            "Welcome the user and invite them to describe their legal situation in their own words."
        }
        ConversationStage::GatherMin => {
            "Gather the minimum case details: case type, jurisdiction, and a case number or hearing date. Ask for at most one missing detail per reply."
        }
        ConversationStage::ConfirmCreate => {
            "Summarize the collected details and ask the user to confirm (yes/no) that you should create their case record. If they correct a detail, restate the corrected summary and ask again."
        }
        ConversationStage::PostCreateCoach => {
            "The case record exists. Coach the user on next steps, deadlines, and which court forms they may need."
        }
    }
}

/// Render the deterministic system block.
pub fn system_prompt(input: &PromptInput<'_>) -> String {
    let collected = if input.collected.is_empty() {
        "Nothing collected yet.".to_string()
    } else {
        input.collected.summary_lines().join("\n")
    };

    let mut builder = PromptBuilder::new()
        .role(ROLE)
        .section(
            "Conversation Stage",
            format!("{}: {}", input.stage, stage_goal(input.stage)),
        )
        .section("Collected Case Information", collected);

    if let Some(question) = input.next_question {
        builder = builder.section(
            "Next Question",
            format!(
                "If it fits naturally, ask: \"{}\" (why it matters: {})",
                question.question, question.reason
            ),
        );
    }

    if input.ambiguity.is_ambiguous
        && let Some(clarifying) = &input.ambiguity.clarifying_question
    {
        builder = builder.section(
            "Clarification Needed",
            format!(
                "The latest message is ambiguous ({}). Before anything else, ask: \"{}\"",
                input.ambiguity.reason.as_deref().unwrap_or("unclear reference"),
                clarifying
            ),
        );
    }

    if let Some(result) = input.case_creation {
        let outcome = match (&result.case_id, &result.error) {
            (Some(case_id), _) if result.success => format!(
                "The case record was created (id {}). Tell the user it is saved and move on to next steps.",
                case_id
            ),
            (_, Some(error)) if error.retryable => format!(
                "Creating the case record failed ({}: {}). Apologize briefly and ask the user to confirm again so you can retry.",
                error.code, error.message
            ),
            (_, Some(error)) => format!(
                "Creating the case record failed ({}: {}). Explain what is missing or wrong without technical detail.",
                error.code, error.message
            ),
            _ => "Case creation did not complete. Ask the user to confirm again.".to_string(),
        };
        builder = builder.section("Case Creation", outcome);
    }

    builder
        .rules(
            "Language",
            [format!(
                "Reply in {} ({}), using short sentences at a 6th-grade reading level.",
                input.language.name(),
                input.language.code()
            )],
        )
        .rules(
            "Form Suggestions",
            [
                format!(
                    "When a specific court form would help, end your reply with exactly one block: {}{{\"formId\": \"...\", \"title\": \"...\", \"reason\": \"...\"}}{}",
                    FORM_SUGGESTION_OPEN, FORM_SUGGESTION_CLOSE
                ),
                "The block must be the last thing in the reply and contain only that JSON object.".to_string(),
                "Omit the block entirely when no form applies.".to_string(),
            ],
        )
        .build()
}

/// Assemble `[system, ...history, user]`.
pub fn assemble(input: &PromptInput<'_>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(input.history.len() + 2);
    messages.push(ChatMessage::system(system_prompt(input)));
    messages.extend(input.history.iter().cloned());
    messages.push(ChatMessage::user(input.message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::ChatRole;
    use crate::copilot::ambiguity::AmbiguityType;
    use crate::copilot::collected::{CaseType, FieldKey};

    fn question() -> FollowUpQuestion {
        FollowUpQuestion {
            key: FieldKey::HearingDate,
            question: "When is the hearing?",
            reason: "Deadlines",
            priority: 2,
        }
    }

    #[test]
    fn test_builder_sections_in_order() {
        let prompt = PromptBuilder::new()
            .role("assistant")
            .objectives(["one", "two"])
            .section("Header", "body")
            .rules("Rules", ["a"])
            .build();

        let role = prompt.find("<ROLE>").unwrap();
        let objectives = prompt.find("1. one").unwrap();
        let header = prompt.find("# Header").unwrap();
        let rules = prompt.find("- a").unwrap();
        assert!(role < objectives && objectives < header && header < rules);
    }

    #[test]
    fn test_system_prompt_is_deterministic() {
        let info = CollectedInfo {
            case_type: Some(CaseType::Eviction),
            jurisdiction: Some("Marion County".into()),
            opposing_party: Some("Oak Ridge LLC".into()),
            ..Default::default()
        };
        let q = question();
        let ambiguity = AmbiguityResult::default();
        let input = PromptInput {
            stage: ConversationStage::GatherMin,
            collected: &info,
            next_question: Some(&q),
            ambiguity: &ambiguity,
            case_creation: None,
            language: Language::Spanish,
            history: &[],
            message: "hola",
        };

        let first = system_prompt(&input);
        let second = system_prompt(&input.clone());
        assert_eq!(first, second);
        assert!(first.contains("GATHER_MIN"));
        assert!(first.contains("Jurisdiction: Marion County"));
        assert!(first.contains("When is the hearing?"));
        assert!(first.contains("Spanish (es)"));
        assert!(!first.contains("Clarification Needed"));
    }

    #[test]
    fn test_system_prompt_includes_ambiguity_and_case_result() {
        let info = CollectedInfo::default();
        let ambiguity = AmbiguityResult {
            is_ambiguous: true,
            kind: Some(AmbiguityType::RelativeTime),
            clarifying_question: Some("What is the exact date?".into()),
            reason: Some("Relative time".into()),
        };
        let created = CaseCreationResult::created("case-9");
        let input = PromptInput {
            stage: ConversationStage::PostCreateCoach,
            collected: &info,
            next_question: None,
            ambiguity: &ambiguity,
            case_creation: Some(&created),
            language: Language::English,
            history: &[],
            message: "yes",
        };

        let prompt = system_prompt(&input);
        assert!(prompt.contains("What is the exact date?"));
        assert!(prompt.contains("case-9"));
        assert!(prompt.contains("Nothing collected yet."));
    }

    #[test]
    fn test_assemble_order() {
        let info = CollectedInfo::default();
        let ambiguity = AmbiguityResult::default();
        let history = vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")];
        let input = PromptInput {
            stage: ConversationStage::Greet,
            collected: &info,
            next_question: None,
            ambiguity: &ambiguity,
            case_creation: None,
            language: Language::English,
            history: &history,
            message: "now",
        };

        let messages = assemble(&input);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1].content, "earlier");
        assert_eq!(messages[2].role, ChatRole::Assistant);
        assert_eq!(messages[3], ChatMessage::user("now"));
    }
}
