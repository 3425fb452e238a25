//! Reply post-processing.
//!
//! The model may end a reply with a single
//! `<form_suggestion>{"formId": …, "title": …, "reason": …}</form_suggestion>`
//! block. Parsing is strict and fails closed: anything other than one
//! well-formed trailing block yields no suggestion. Delimited blocks are
//! always removed from the text shown to the user.

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const FORM_SUGGESTION_OPEN: &str = "<form_suggestion>";
pub const FORM_SUGGESTION_CLOSE: &str = "</form_suggestion>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FormSuggestion {
    pub form_id: String,
    pub title: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// Display text with every suggestion block removed
    pub text: String,
    pub form_suggestion: Option<FormSuggestion>,
}

pub fn parse_reply(raw: &str) -> ParsedReply {
    let mut text = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut last_block: Option<&str> = None;
    let mut trailing = false;

    while let Some(start) = rest.find(FORM_SUGGESTION_OPEN) {
        text.push_str(&rest[..start]);
        let after_open = &rest[start + FORM_SUGGESTION_OPEN.len()..];
        match after_open.find(FORM_SUGGESTION_CLOSE) {
            Some(end) => {
                last_block = Some(&after_open[..end]);
                rest = &after_open[end + FORM_SUGGESTION_CLOSE.len()..];
                trailing = rest.trim().is_empty();
            }
            None => {
                // Unterminated block: hide it, never parse it.
                last_block = None;
                rest = "";
                trailing = false;
            }
        }
    }
    text.push_str(rest);

    let form_suggestion = match last_block {
        Some(body) if trailing => parse_suggestion(body),
        Some(_) => {
            debug!("Form suggestion block not at end of reply, ignoring");
            None
        }
        None => None,
    };

    ParsedReply {
        text: text.trim_end().to_string(),
        form_suggestion,
    }
}

fn parse_suggestion(body: &str) -> Option<FormSuggestion> {
    match serde_json::from_str::<FormSuggestion>(body.trim()) {
        Ok(s) if !s.form_id.trim().is_empty() && !s.title.trim().is_empty() => Some(s),
        Ok(_) => {
            debug!("Form suggestion missing formId or title");
            None
        }
        Err(e) => {
            debug!(error = %e, "Malformed form suggestion");
            None
        }
    }
}

/// Incremental filter that hides suggestion blocks from streamed deltas.
///
/// Text that might be the start of an opening tag is held back until it can
/// be decided, so a tag split across chunks never leaks to the client.
#[derive(Debug, Default)]
pub struct ReplyStreamFilter {
    pending: String,
    in_block: bool,
}

impl ReplyStreamFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a delta, returning the part that is safe to display now.
    pub fn push(&mut self, delta: &str) -> String {
        self.pending.push_str(delta);
        let mut out = String::new();

        loop {
            if self.in_block {
                match self.pending.find(FORM_SUGGESTION_CLOSE) {
                    Some(end) => {
                        self.pending.drain(..end + FORM_SUGGESTION_CLOSE.len());
                        self.in_block = false;
                    }
                    None => {
                        // Keep only a possible partial closing tag.
                        let keep = partial_tag_suffix(&self.pending, FORM_SUGGESTION_CLOSE);
                        let cut = self.pending.len() - keep;
                        self.pending.drain(..cut);
                        return out;
                    }
                }
            } else {
                match self.pending.find(FORM_SUGGESTION_OPEN) {
                    Some(start) => {
                        out.push_str(&self.pending[..start]);
                        self.pending.drain(..start + FORM_SUGGESTION_OPEN.len());
                        self.in_block = true;
                    }
                    None => {
                        let keep = partial_tag_suffix(&self.pending, FORM_SUGGESTION_OPEN);
                        let cut = self.pending.len() - keep;
                        out.extend(self.pending.drain(..cut));
                        return out;
                    }
                }
            }
        }
    }

    /// Flush whatever is held back once the stream ends.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        if self.in_block { String::new() } else { rest }
    }
}

/// Length of the longest suffix of `s` that is a proper prefix of `tag`.
fn partial_tag_suffix(s: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| s.len() >= n && s.is_char_boundary(s.len() - n) && s.ends_with(&tag[..n]))
        .unwrap_or(0)
}
