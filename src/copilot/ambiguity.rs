//! Vague-referent detection.
//!
//! Reports at most one ambiguity per turn, in this priority order:
//! multiple cases, relative time, vague amount, unqualified location,
//! unclear pronoun. Results are computed per turn and never persisted.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::collected::CollectedInfo;
use super::extractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityType {
    MultipleCases,
    RelativeTime,
    VagueAmount,
    UnqualifiedLocation,
    UnclearPronoun,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbiguityResult {
    pub is_ambiguous: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<AmbiguityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarifying_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AmbiguityResult {
    pub fn clear() -> Self {
        Self::default()
    }

    fn found(kind: AmbiguityType, question: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            is_ambiguous: true,
            kind: Some(kind),
            clarifying_question: Some(question.into()),
            reason: Some(reason.into()),
        }
    }
}

/// A user's open case, as seen by the detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCase {
    pub id: String,
    pub title: String,
    pub case_number: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct AmbiguityContext<'a> {
    pub active_cases: &'a [ActiveCase],
    pub collected: &'a CollectedInfo,
}

static CASE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(my|the|this|that)\s+case\b|\bmi\s+caso\b|\bel\s+caso\b").expect("valid regex")
});

static RELATIVE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(tomorrow|tonight|yesterday|next\s+(week|month|monday|tuesday|wednesday|thursday|friday)|this\s+(week|weekend|month)|in\s+a\s+(few|couple(\s+of)?)\s+(days|weeks)|soon|later\s+this\s+(week|month)|mañana|la\s+próxima\s+semana|la\s+semana\s+que\s+viene|pronto)\b",
    )
    .expect("valid regex")
});

static VAGUE_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(some\s+money|a\s+lot(\s+of\s+money)?|a\s+few\s+(hundred|thousand)|several\s+(hundred|thousand)|too\s+much|mucho\s+dinero|algo\s+de\s+dinero)\b",
    )
    .expect("valid regex")
});

static VAGUE_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(the\s+court(house)?|downtown|here|around\s+here|la\s+corte|aquí|aqui)\b")
        .expect("valid regex")
});

static LEADING_PRONOUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(it|they|that|this|them|he|she|eso|ellos)\b").expect("valid regex")
});

/// Messages this short that open with a pronoun have nothing to anchor it
const PRONOUN_MAX_WORDS: usize = 6;

pub fn detect(text: &str, ctx: AmbiguityContext<'_>) -> AmbiguityResult {
    if ctx.active_cases.len() > 1
        && CASE_REFERENCE.is_match(text)
        && extractor::extract_case_number(text).is_none()
    {
        let titles: Vec<&str> = ctx.active_cases.iter().map(|c| c.title.as_str()).collect();
        return AmbiguityResult::found(
            AmbiguityType::MultipleCases,
            format!("You have more than one open case ({}). Which one do you mean?", titles.join("; ")),
            "Message refers to a case but the user has several active cases",
        );
    }

    if RELATIVE_TIME.is_match(text) && extractor::extract_date(text).is_none() {
        return AmbiguityResult::found(
            AmbiguityType::RelativeTime,
            "Could you tell me the exact date (month, day and year)?",
            "Relative time expression without an explicit date",
        );
    }

    if VAGUE_AMOUNT.is_match(text) && extractor::extract_amount(text).is_none() {
        return AmbiguityResult::found(
            AmbiguityType::VagueAmount,
            "About how much money is involved, in dollars?",
            "Amount mentioned without a dollar figure",
        );
    }

    if VAGUE_LOCATION.is_match(text)
        && extractor::extract_jurisdiction(text).is_none()
        && ctx.collected.jurisdiction.is_none()
    {
        return AmbiguityResult::found(
            AmbiguityType::UnqualifiedLocation,
            "Which county or city is that court in?",
            "Location mentioned without a jurisdiction",
        );
    }

    if LEADING_PRONOUN.is_match(text) && text.split_whitespace().count() <= PRONOUN_MAX_WORDS {
        return AmbiguityResult::found(
            AmbiguityType::UnclearPronoun,
            "Just to make sure I follow, what are you referring to?",
            "Short message opening with a pronoun",
        );
    }

    AmbiguityResult::clear()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cases(n: usize) -> Vec<ActiveCase> {
        (0..n)
            .map(|i| ActiveCase {
                id: format!("case-{i}"),
                title: format!("Case {i}"),
                case_number: None,
            })
            .collect()
    }

    fn ctx<'a>(active: &'a [ActiveCase], collected: &'a CollectedInfo) -> AmbiguityContext<'a> {
        AmbiguityContext {
            active_cases: active,
            collected,
        }
    }

    #[test]
    fn test_multiple_cases() {
        let active = cases(2);
        let info = CollectedInfo::default();
        let result = detect("What is happening with my case?", ctx(&active, &info));
        assert!(result.is_ambiguous);
        assert_eq!(result.kind, Some(AmbiguityType::MultipleCases));
        assert!(result.clarifying_question.unwrap().contains("Case 1"));
    }

    #[test]
    fn test_single_case_is_not_ambiguous() {
        let active = cases(1);
        let info = CollectedInfo::default();
        assert!(!detect("What is happening with my case?", ctx(&active, &info)).is_ambiguous);
    }

    #[test]
    fn test_case_number_disambiguates() {
        let active = cases(3);
        let info = CollectedInfo::default();
        let result = detect("my case 49K01-2510-EV-001234 got moved", ctx(&active, &info));
        assert!(!result.is_ambiguous);
    }

    #[test]
    fn test_priority_multiple_cases_over_relative_time() {
        let active = cases(2);
        let info = CollectedInfo::default();
        let result = detect("my case hearing is tomorrow", ctx(&active, &info));
        assert_eq!(result.kind, Some(AmbiguityType::MultipleCases));
    }

    #[test]
    fn test_relative_time_vs_explicit_date() {
        let info = CollectedInfo::default();
        let result = detect("the hearing is next week", ctx(&[], &info));
        assert_eq!(result.kind, Some(AmbiguityType::RelativeTime));

        let result = detect("the hearing is next week, on 2025-11-03", ctx(&[], &info));
        assert_ne!(result.kind, Some(AmbiguityType::RelativeTime));
    }

    #[test]
    fn test_vague_amount() {
        let info = CollectedInfo::default();
        let result = detect("They say I owe a few hundred", ctx(&[], &info));
        assert_eq!(result.kind, Some(AmbiguityType::VagueAmount));
        assert!(!detect("The landlord says I owe $450", ctx(&[], &info)).is_ambiguous);
    }

    #[test]
    fn test_unqualified_location_uses_collected_jurisdiction() {
        let empty = CollectedInfo::default();
        let result = detect("I need to go to the courthouse", ctx(&[], &empty));
        assert_eq!(result.kind, Some(AmbiguityType::UnqualifiedLocation));

        let known = CollectedInfo {
            jurisdiction: Some("Marion County".into()),
            ..Default::default()
        };
        assert!(!detect("I need to go to the courthouse", ctx(&[], &known)).is_ambiguous);
    }

    #[test]
    fn test_unclear_pronoun_only_when_short() {
        let info = CollectedInfo::default();
        assert_eq!(
            detect("It says I have to leave", ctx(&[], &info)).kind,
            Some(AmbiguityType::UnclearPronoun)
        );
        assert!(
            !detect(
                "It is a letter from my landlord saying I must move out by the end of the month",
                ctx(&[], &info)
            )
            .is_ambiguous
        );
    }

    #[test]
    fn test_clear_message_serializes_minimal() {
        let info = CollectedInfo::default();
        let result = detect("I got an eviction notice in Marion County", ctx(&[], &info));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({"isAmbiguous": false})
        );
    }
}
