//! Language detection for inbound messages.
//!
//! Stopword scoring between English and Spanish, the two languages the
//! copilot answers in. Short or inconclusive input falls back to the
//! session's previous language, then English.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "es")]
    Spanish,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Spanish => "es",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Spanish => "Spanish",
        }
    }
}

const SPANISH_MARKERS: &[&str] = &[
    "el", "la", "los", "las", "de", "del", "que", "y", "en", "un", "una", "por", "para", "con",
    "mi", "tengo", "desalojo", "casero", "corte", "audiencia", "caso", "condado", "necesito",
    "ayuda", "dueño", "renta", "aviso", "es", "no", "sí", "qué", "cómo", "cuándo",
];

const ENGLISH_MARKERS: &[&str] = &[
    "the", "a", "an", "and", "of", "to", "in", "my", "i", "is", "for", "with", "have", "got",
    "eviction", "landlord", "court", "hearing", "case", "county", "need", "help", "rent",
    "notice", "what", "how", "when", "no", "yes",
];

/// Minimum number of marker hits before we trust a detection
const MIN_EVIDENCE: usize = 2;

/// Detect the language of `text`, falling back to `previous` when unsure.
pub fn detect_language(text: &str, previous: Option<Language>) -> Language {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != 'ñ')
        .filter(|w| !w.is_empty())
        .collect();

    let spanish_chars = lowered.chars().any(|c| matches!(c, 'ñ' | '¿' | '¡'));

    let es = words.iter().filter(|w| SPANISH_MARKERS.contains(w)).count()
        + if spanish_chars { 2 } else { 0 };
    let en = words.iter().filter(|w| ENGLISH_MARKERS.contains(w)).count();

    let fallback = previous.unwrap_or_default();
    if es.max(en) < MIN_EVIDENCE || es == en {
        return fallback;
    }
    if es > en {
        Language::Spanish
    } else {
        Language::English
    }
}
