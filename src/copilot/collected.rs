//! Collected case information.
//!
//! `CollectedInfo` is the explicit optional-field record gathered over a
//! conversation. Absent fields are `None` and are omitted on serialization;
//! [`CollectedInfo::from_stored`] is the single choke point that turns
//! persisted JSON (which may contain `null`, empty strings or unknown case
//! types) back into a normalized record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Result, ValidationError, ValidationErrorKind};

/// Coarse case category recognised by the intake flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    Eviction,
    SmallClaims,
    DebtCollection,
    Family,
    ProtectiveOrder,
    Other,
}

impl CaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eviction => "eviction",
            Self::SmallClaims => "small_claims",
            Self::DebtCollection => "debt_collection",
            Self::Family => "family",
            Self::ProtectiveOrder => "protective_order",
            Self::Other => "other",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Eviction => "Eviction",
            Self::SmallClaims => "Small Claims",
            Self::DebtCollection => "Debt Collection",
            Self::Family => "Family Law",
            Self::ProtectiveOrder => "Protective Order",
            Self::Other => "Other",
        }
    }

    /// Lenient parse used at the persistence boundary; unknown labels map to `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "eviction" => Self::Eviction,
            "small_claims" => Self::SmallClaims,
            "debt_collection" | "debt" => Self::DebtCollection,
            "family" => Self::Family,
            "protective_order" => Self::ProtectiveOrder,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for CaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifiers for the fields the copilot tracks.
///
/// These keys double as follow-up question keys in `askedQuestions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKey {
    CaseType,
    Jurisdiction,
    CaseNumber,
    HearingDate,
    OpposingParty,
    AmountInDispute,
}

impl FieldKey {
    pub const ALL: [FieldKey; 6] = [
        FieldKey::CaseType,
        FieldKey::Jurisdiction,
        FieldKey::CaseNumber,
        FieldKey::HearingDate,
        FieldKey::OpposingParty,
        FieldKey::AmountInDispute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaseType => "caseType",
            Self::Jurisdiction => "jurisdiction",
            Self::CaseNumber => "caseNumber",
            Self::HearingDate => "hearingDate",
            Self::OpposingParty => "opposingParty",
            Self::AmountInDispute => "amountInDispute",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key.trim())
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial case information collected from the conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_type: Option<CaseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_number: Option<String>,
    /// `YYYY-MM-DD` when the date was fully specified, otherwise the user's phrase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hearing_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opposing_party: Option<String>,
    /// Amount in dispute, formatted as `$1,234.56`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_in_dispute: Option<String>,
}

impl CollectedInfo {
    pub fn is_empty(&self) -> bool {
        FieldKey::ALL.iter().all(|key| !self.has(*key))
    }

    pub fn has(&self, key: FieldKey) -> bool {
        match key {
            FieldKey::CaseType => self.case_type.is_some(),
            FieldKey::Jurisdiction => self.jurisdiction.is_some(),
            FieldKey::CaseNumber => self.case_number.is_some(),
            FieldKey::HearingDate => self.hearing_date.is_some(),
            FieldKey::OpposingParty => self.opposing_party.is_some(),
            FieldKey::AmountInDispute => self.amount_in_dispute.is_some(),
        }
    }

    /// Case type, jurisdiction, and at least one of case number / hearing date.
    pub fn has_minimum_info(&self) -> bool {
        self.case_type.is_some()
            && self.jurisdiction.is_some()
            && (self.case_number.is_some() || self.hearing_date.is_some())
    }

    /// Merge newly extracted fields; later values win so users can correct
    /// earlier answers. Returns the keys whose value changed.
    pub fn merge(&mut self, update: CollectedInfo) -> Vec<FieldKey> {
        let update = update.normalized();
        let mut changed = Vec::new();

        fn apply<T: PartialEq>(
            slot: &mut Option<T>,
            value: Option<T>,
            key: FieldKey,
            changed: &mut Vec<FieldKey>,
        ) {
            if let Some(value) = value
                && slot.as_ref() != Some(&value)
            {
                *slot = Some(value);
                changed.push(key);
            }
        }

        apply(&mut self.case_type, update.case_type, FieldKey::CaseType, &mut changed);
        apply(&mut self.jurisdiction, update.jurisdiction, FieldKey::Jurisdiction, &mut changed);
        apply(&mut self.case_number, update.case_number, FieldKey::CaseNumber, &mut changed);
        apply(&mut self.hearing_date, update.hearing_date, FieldKey::HearingDate, &mut changed);
        apply(&mut self.opposing_party, update.opposing_party, FieldKey::OpposingParty, &mut changed);
        apply(
            &mut self.amount_in_dispute,
            update.amount_in_dispute,
            FieldKey::AmountInDispute,
            &mut changed,
        );

        changed
    }

    /// Trim string fields and drop empty ones.
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|v| !v.is_empty())
        }

        Self {
            case_type: self.case_type,
            jurisdiction: clean(self.jurisdiction),
            case_number: clean(self.case_number),
            hearing_date: clean(self.hearing_date),
            opposing_party: clean(self.opposing_party),
            amount_in_dispute: clean(self.amount_in_dispute),
        }
    }

    /// Validate and normalize persisted JSON.
    ///
    /// Accepts a JSON object (or `null`, treated as empty). `null`,
    /// non-string and blank values are dropped rather than stored; unknown
    /// case-type labels become [`CaseType::Other`].
    pub fn from_stored(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(ValidationError::new(
                    ValidationErrorKind::Schema,
                    format!("collectedInfo must be an object, got {}", json_kind(other)),
                )
                .with_field("collectedInfo")
                .into());
            }
        };

        let text = |key: FieldKey| -> Option<String> {
            map.get(key.as_str())
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let info = Self {
            case_type: text(FieldKey::CaseType)
                .filter(|v| !v.trim().is_empty())
                .map(|v| CaseType::from_label(&v)),
            jurisdiction: text(FieldKey::Jurisdiction),
            case_number: text(FieldKey::CaseNumber),
            hearing_date: text(FieldKey::HearingDate),
            opposing_party: text(FieldKey::OpposingParty),
            amount_in_dispute: text(FieldKey::AmountInDispute),
        };

        Ok(info.normalized())
    }

    /// Short human-readable summary, used in prompts and case titles
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(case_type) = self.case_type {
            lines.push(format!("Case type: {}", case_type.display_name()));
        }
        if let Some(v) = &self.jurisdiction {
            lines.push(format!("Jurisdiction: {}", v));
        }
        if let Some(v) = &self.case_number {
            lines.push(format!("Case number: {}", v));
        }
        if let Some(v) = &self.hearing_date {
            lines.push(format!("Hearing date: {}", v));
        }
        if let Some(v) = &self.opposing_party {
            lines.push(format!("Opposing party: {}", v));
        }
        if let Some(v) = &self.amount_in_dispute {
            lines.push(format!("Amount in dispute: {}", v));
        }
        lines
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_minimum_info_requires_number_or_date() {
        let mut info = CollectedInfo {
            case_type: Some(CaseType::Eviction),
            jurisdiction: Some("Marion County".into()),
            ..Default::default()
        };
        assert!(!info.has_minimum_info());

        info.hearing_date = Some("2025-11-03".into());
        assert!(info.has_minimum_info());

        info.hearing_date = None;
        info.case_number = Some("49K01-2510-EV-001234".into());
        assert!(info.has_minimum_info());
    }

    #[test]
    fn test_serialization_omits_absent_fields() {
        let info = CollectedInfo {
            jurisdiction: Some("Marion County".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value, json!({"jurisdiction": "Marion County"}));
    }

    #[test]
    fn test_merge_later_value_wins() {
        let mut info = CollectedInfo {
            case_number: Some("49K01-2510-EV-001234".into()),
            ..Default::default()
        };
        let changed = info.merge(CollectedInfo {
            case_number: Some("49K01-2510-EV-009999".into()),
            jurisdiction: Some("  Marion   County ".into()),
            ..Default::default()
        });

        assert_eq!(info.case_number.as_deref(), Some("49K01-2510-EV-009999"));
        assert_eq!(info.jurisdiction.as_deref(), Some("Marion County"));
        assert_eq!(changed, vec![FieldKey::Jurisdiction, FieldKey::CaseNumber]);
    }

    #[test]
    fn test_merge_ignores_blank_values() {
        let mut info = CollectedInfo {
            jurisdiction: Some("Marion County".into()),
            ..Default::default()
        };
        let changed = info.merge(CollectedInfo {
            jurisdiction: Some("   ".into()),
            ..Default::default()
        });
        assert!(changed.is_empty());
        assert_eq!(info.jurisdiction.as_deref(), Some("Marion County"));
    }

    #[test]
    fn test_from_stored_drops_nulls_and_blanks() {
        let stored = json!({
            "caseType": "Eviction",
            "jurisdiction": null,
            "caseNumber": "",
            "hearingDate": "2025-11-03",
            "opposingParty": 42,
        });
        let info = CollectedInfo::from_stored(&stored).unwrap();
        assert_eq!(info.case_type, Some(CaseType::Eviction));
        assert_eq!(info.jurisdiction, None);
        assert_eq!(info.case_number, None);
        assert_eq!(info.opposing_party, None);

        let round = serde_json::to_value(&info).unwrap();
        assert_eq!(round, json!({"caseType": "eviction", "hearingDate": "2025-11-03"}));
    }

    #[test]
    fn test_from_stored_unknown_case_type() {
        let info = CollectedInfo::from_stored(&json!({"caseType": "landlord dispute"})).unwrap();
        assert_eq!(info.case_type, Some(CaseType::Other));
    }

    #[test]
    fn test_from_stored_rejects_non_object() {
        let err = CollectedInfo::from_stored(&json!(["eviction"])).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(CollectedInfo::from_stored(&Value::Null).unwrap(), CollectedInfo::default());
    }

    fn arb_field() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some(String::new())),
            Just(Some("   ".to_string())),
            "[ a-zA-Z0-9-]{0,20}".prop_map(Some),
        ]
    }

    proptest! {
        #[test]
        fn prop_serialized_info_never_contains_null_or_blank(
            jurisdiction in arb_field(),
            case_number in arb_field(),
            hearing_date in arb_field(),
            opposing_party in arb_field(),
        ) {
            let mut info = CollectedInfo::default();
            info.merge(CollectedInfo {
                jurisdiction,
                case_number,
                hearing_date,
                opposing_party,
                ..Default::default()
            });

            let value = serde_json::to_value(&info).unwrap();
            let map = value.as_object().unwrap();
            for (key, v) in map {
                prop_assert!(!v.is_null(), "{} was null", key);
                prop_assert!(!v.as_str().unwrap_or("x").trim().is_empty(), "{} was blank", key);
            }

            let reloaded = CollectedInfo::from_stored(&value).unwrap();
            prop_assert_eq!(reloaded, info);
        }
    }
}
