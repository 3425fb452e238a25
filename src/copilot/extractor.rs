//! Field extraction from free-text messages.
//!
//! Pattern-based scan for case type, jurisdiction, case number, hearing
//! date, opposing party and amount. Only confident matches are returned;
//! a message with nothing recognisable yields an empty [`CollectedInfo`].
//! Extraction is pure and never fails.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::collected::{CaseType, CollectedInfo, FieldKey};

// =============================================================================
// Patterns
// =============================================================================

/// Indiana uniform case number, e.g. `49K01-2510-EV-001234`
static UNIFORM_CASE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{2}[A-Z]\d{2}-\d{4}-([A-Z]{2})-\d{1,6})\b").expect("valid regex")
});

static LABELED_CASE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:case|caso|docket|cause)\s*(?:number|no\.?|num\.?|n[uú]mero|#)?\s*(?:is|es)?\s*[:#]?\s*([A-Z0-9][A-Z0-9-]{3,})",
    )
    .expect("valid regex")
});

static COUNTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:[a-z][a-z.'-]*\s+){1,3})(county|parish|township)\b").expect("valid regex")
});

static CONDADO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcondado\s+de\s+([a-z][a-z'-]+(?:\s+[a-z][a-z'-]+)?)").expect("valid regex")
});

static CITY_OF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcity\s+of\s+([a-z][a-z'-]+)").expect("valid regex"));

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid regex"));

static US_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b").expect("valid regex")
});

static MONTH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b(?:,?\s+(\d{4})\b)?",
    )
    .expect("valid regex")
});

static HEARING_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(hearing|court\s+date|trial|appear(?:ance)?|audiencia|juicio|corte)\b")
        .expect("valid regex")
});

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s?(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{2}))?").expect("valid regex")
});

static OPPOSING_PARTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?i:my\s+landlord\s+is|my\s+landlord,|sued\s+by|being\s+sued\s+by|against|mi\s+casero\s+es)\s+([A-Z][\w&'.-]*(?:\s+(?:[A-Z][\w&'.-]*|of|and|&)){0,5})",
    )
    .expect("valid regex")
});

/// Ordered keyword table; the first matching row decides the case type.
static CASE_TYPE_KEYWORDS: LazyLock<Vec<(Regex, CaseType)>> = LazyLock::new(|| {
    [
        (
            r"(?i)\b(protective|restraining|protection)\s+order\b|\borden\s+de\s+protecci[oó]n\b",
            CaseType::ProtectiveOrder,
        ),
        (r"(?i)\bsmall[\s-]+claims?\b|\breclamos?\s+menores\b", CaseType::SmallClaims),
        (
            r"(?i)\bevict(ed|ion|ing)?\b|\bnotice\s+to\s+(vacate|quit)\b|\bdesalojo\b|\bdesahucio\b",
            CaseType::Eviction,
        ),
        (
            r"(?i)\b(custody|divorce|child\s+support|visitation|custodia|divorcio)\b",
            CaseType::Family,
        ),
        (
            r"(?i)\b(debt\s+collector|collection\s+agency|debt|deuda|cobranza)\b",
            CaseType::DebtCollection,
        ),
        (r"(?i)\b(landlord|casero|back\s+rent)\b", CaseType::Eviction),
    ]
    .into_iter()
    .map(|(pattern, case_type)| (Regex::new(pattern).expect("valid regex"), case_type))
    .collect()
});

/// Words that end a jurisdiction name when scanning backwards from "County".
const JURISDICTION_STOPWORDS: &[&str] = &[
    "in", "at", "the", "of", "for", "from", "to", "notice", "eviction", "court", "filed", "case",
    "my", "a", "an", "and", "is", "was", "by", "on", "with", "small", "claims", "live", "lives",
];

// =============================================================================
// Extraction
// =============================================================================

/// Extract every field we are confident about.
pub fn extract(text: &str) -> CollectedInfo {
    extract_with_expectation(text, None)
}

/// Extract fields, relaxing the hearing-date rule when the message answers
/// a hearing-date follow-up (a bare date is then accepted without a
/// "hearing" keyword).
pub fn extract_with_expectation(text: &str, expected: Option<FieldKey>) -> CollectedInfo {
    let case_number = extract_case_number(text);

    let case_type = extract_case_type(text).or_else(|| {
        UNIFORM_CASE_NUMBER
            .captures(text)
            .and_then(|caps| case_type_from_code(&caps[2]))
    });

    let hearing_date = if HEARING_CONTEXT.is_match(text) || expected == Some(FieldKey::HearingDate)
    {
        extract_date(text)
    } else {
        None
    };

    CollectedInfo {
        case_type,
        jurisdiction: extract_jurisdiction(text),
        case_number,
        hearing_date,
        opposing_party: extract_opposing_party(text),
        amount_in_dispute: extract_amount(text),
    }
    .normalized()
}

pub fn extract_case_type(text: &str) -> Option<CaseType> {
    CASE_TYPE_KEYWORDS
        .iter()
        .find(|(pattern, _)| pattern.is_match(text))
        .map(|(_, case_type)| *case_type)
}

fn case_type_from_code(code: &str) -> Option<CaseType> {
    match code.to_uppercase().as_str() {
        "EV" => Some(CaseType::Eviction),
        "SC" => Some(CaseType::SmallClaims),
        "CC" => Some(CaseType::DebtCollection),
        "DC" | "DR" => Some(CaseType::Family),
        "PO" => Some(CaseType::ProtectiveOrder),
        _ => None,
    }
}

pub fn extract_case_number(text: &str) -> Option<String> {
    if let Some(caps) = UNIFORM_CASE_NUMBER.captures(text) {
        return Some(caps[1].to_uppercase());
    }

    LABELED_CASE_NUMBER
        .captures_iter(text)
        .map(|caps| caps[1].trim_end_matches('-').to_uppercase())
        .find(|candidate| candidate.len() >= 4 && candidate.chars().any(|c| c.is_ascii_digit()))
}

pub fn extract_jurisdiction(text: &str) -> Option<String> {
    if let Some(caps) = COUNTY.captures(text) {
        let words: Vec<&str> = caps[1].split_whitespace().collect();
        let name: Vec<&str> = words
            .iter()
            .rev()
            .take_while(|w| !JURISDICTION_STOPWORDS.contains(&w.to_lowercase().as_str()))
            .copied()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        if !name.is_empty() {
            return Some(format!("{} {}", title_case(&name.join(" ")), title_case(&caps[2])));
        }
    }

    if let Some(caps) = CONDADO.captures(text) {
        return Some(format!("{} County", title_case(&caps[1])));
    }

    CITY_OF
        .captures(text)
        .map(|caps| format!("City of {}", title_case(&caps[1])))
}

/// First date in the message following a hearing keyword, else the first
/// date at all. Fully specified dates are normalized to `YYYY-MM-DD`;
/// month-day phrases without a year are kept verbatim.
pub fn extract_date(text: &str) -> Option<String> {
    let anchor = HEARING_CONTEXT.find(text).map(|m| m.start()).unwrap_or(0);

    let mut candidates: Vec<(usize, String)> = Vec::new();

    for caps in ISO_DATE.captures_iter(text) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            candidates.push((caps.get(0).map_or(0, |m| m.start()), date));
        }
    }

    for caps in US_DATE.captures_iter(text) {
        let year = if caps[3].len() == 2 {
            format!("20{}", &caps[3])
        } else {
            caps[3].to_string()
        };
        if let Some(date) = ymd(&year, &caps[1], &caps[2]) {
            candidates.push((caps.get(0).map_or(0, |m| m.start()), date));
        }
    }

    for caps in MONTH_DATE.captures_iter(text) {
        let start = caps.get(0).map_or(0, |m| m.start());
        let month = month_number(&caps[1]);
        let day = &caps[2];
        match (month, caps.get(3)) {
            (Some(month), Some(year)) => {
                if let Some(date) = ymd(year.as_str(), &month.to_string(), day) {
                    candidates.push((start, date));
                }
            }
            (Some(month), None) => {
                // Leap day is the widest a year-less date can be.
                if NaiveDate::from_ymd_opt(2024, month, day.parse().unwrap_or(0)).is_some() {
                    candidates.push((start, caps[0].trim().to_string()));
                }
            }
            _ => {}
        }
    }

    candidates.sort_by_key(|(pos, _)| *pos);
    candidates
        .iter()
        .find(|(pos, _)| *pos >= anchor)
        .or_else(|| candidates.first())
        .map(|(_, date)| date.clone())
}

fn ymd(year: &str, month: &str, day: &str) -> Option<String> {
    let date = NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let month = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

pub fn extract_opposing_party(text: &str) -> Option<String> {
    let caps = OPPOSING_PARTY.captures(text)?;
    let mut words: Vec<&str> = caps[1].split_whitespace().collect();
    while matches!(words.last(), Some(&"of") | Some(&"and") | Some(&"&")) {
        words.pop();
    }
    let name = words.join(" ");
    let name = name.trim_end_matches(['.', ',']);
    (!name.is_empty()).then(|| name.to_string())
}

pub fn extract_amount(text: &str) -> Option<String> {
    let caps = AMOUNT.captures(text)?;
    let whole = caps[1].replace(',', "");
    let whole: u64 = whole.parse().ok()?;
    let cents = caps.get(2).map(|m| m.as_str()).unwrap_or("00");
    Some(format!("${}.{}", group_thousands(whole), cents))
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marion_county_eviction_scenario() {
        let info = extract(
            "I got a 30-day eviction notice in Marion County, case 49K01-2510-EV-001234",
        );
        assert_eq!(info.case_type, Some(CaseType::Eviction));
        assert!(info.jurisdiction.as_deref().unwrap().contains("Marion County"));
        assert_eq!(info.case_number.as_deref(), Some("49K01-2510-EV-001234"));
        assert!(info.has_minimum_info());
    }

    #[test]
    fn test_no_fields_yields_empty() {
        let info = extract("Hi there, can you help me?");
        assert!(info.is_empty());
        assert_eq!(info, CollectedInfo::default());
    }

    #[test]
    fn test_extract_is_idempotent() {
        let text = "My hearing is on October 15, 2025 in Lake County small claims court";
        assert_eq!(extract(text), extract(text));
    }

    #[test]
    fn test_case_type_priority() {
        assert_eq!(
            extract_case_type("I want to sue my landlord in small claims"),
            Some(CaseType::SmallClaims)
        );
        assert_eq!(extract_case_type("my landlord wants me out"), Some(CaseType::Eviction));
        assert_eq!(
            extract_case_type("I need a restraining order"),
            Some(CaseType::ProtectiveOrder)
        );
        assert_eq!(extract_case_type("a collection agency keeps calling"), Some(CaseType::DebtCollection));
        assert_eq!(extract_case_type("tengo un desalojo"), Some(CaseType::Eviction));
        assert_eq!(extract_case_type("hello"), None);
    }

    #[test]
    fn test_case_type_from_case_number_code() {
        let info = extract("case 49D07-2401-SC-000123");
        assert_eq!(info.case_type, Some(CaseType::SmallClaims));
    }

    #[test]
    fn test_labeled_case_number() {
        assert_eq!(
            extract_case_number("My case number is CV-2024-0042"),
            Some("CV-2024-0042".to_string())
        );
        assert_eq!(extract_case_number("my case is about rent"), None);
        assert_eq!(extract_case_number("case #: 12345"), Some("12345".to_string()));
    }

    #[test]
    fn test_jurisdiction_variants() {
        assert_eq!(
            extract_jurisdiction("the notice was filed in marion county"),
            Some("Marion County".to_string())
        );
        assert_eq!(
            extract_jurisdiction("I live in St. Joseph County"),
            Some("St. Joseph County".to_string())
        );
        assert_eq!(
            extract_jurisdiction("vivo en el condado de marion"),
            Some("Marion County".to_string())
        );
        assert_eq!(
            extract_jurisdiction("the City of Indianapolis sent a letter"),
            Some("City of Indianapolis".to_string())
        );
        assert_eq!(extract_jurisdiction("in the county"), None);
    }

    #[test]
    fn test_hearing_date_requires_context() {
        let info = extract("I paid rent on 10/01/2025");
        assert_eq!(info.hearing_date, None);

        let info = extract("My hearing is 11/3/2025");
        assert_eq!(info.hearing_date.as_deref(), Some("2025-11-03"));
    }

    #[test]
    fn test_hearing_date_prefers_date_after_keyword() {
        let info = extract("I got the notice on March 1, 2025 and the hearing is March 20, 2025");
        assert_eq!(info.hearing_date.as_deref(), Some("2025-03-20"));
    }

    #[test]
    fn test_hearing_date_expected_answer() {
        let info = extract_with_expectation("November 3, 2025", Some(FieldKey::HearingDate));
        assert_eq!(info.hearing_date.as_deref(), Some("2025-11-03"));

        let info = extract("November 3, 2025");
        assert_eq!(info.hearing_date, None);
    }

    #[test]
    fn test_yearless_date_kept_verbatim() {
        let info = extract("court date is Nov 3rd");
        assert_eq!(info.hearing_date.as_deref(), Some("Nov 3rd"));
    }

    #[test]
    fn test_invalid_dates_rejected() {
        assert_eq!(extract_date("hearing 2025-02-30"), None);
        assert_eq!(extract_date("hearing 13/45/2025"), None);
    }

    #[test]
    fn test_amount_normalized() {
        assert_eq!(extract_amount("they want $1200"), Some("$1,200.00".to_string()));
        assert_eq!(extract_amount("owed $ 2,450.50 total"), Some("$2,450.50".to_string()));
        assert_eq!(extract_amount("a lot of money"), None);
    }

    #[test]
    fn test_opposing_party() {
        assert_eq!(
            extract_opposing_party("My landlord is Oak Ridge Properties LLC and he"),
            Some("Oak Ridge Properties LLC".to_string())
        );
        assert_eq!(
            extract_opposing_party("I was sued by Midland Credit."),
            Some("Midland Credit".to_string())
        );
        assert_eq!(extract_opposing_party("I'm fighting against eviction"), None);
    }
}
