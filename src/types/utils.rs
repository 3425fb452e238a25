//! Shared utility functions for common operations.

use std::fmt::Display;

// =============================================================================
// String Utilities
// =============================================================================

/// Truncate a string to at most `max_chars` characters, appending an
/// ellipsis when anything was cut. Never splits a UTF-8 code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

// =============================================================================
// Error Filtering
// =============================================================================

/// Drop an error after logging it at warn level.
///
/// # Example
/// ```ignore
/// let cases = log_filter_warn(cases.active_cases(&user).await, "listing cases")
///     .unwrap_or_default();
/// ```
pub fn log_filter_warn<T, E: Display>(result: Result<T, E>, context: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("{}: {}", context, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_short_input_untouched() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        let s = "desalojo en el condado de Marión";
        let out = truncate_chars(s, 10);
        assert_eq!(out.chars().count(), 10);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_log_filter_warn_drops_errors() {
        let results: Vec<Result<i32, String>> = vec![Ok(1), Err("bad".into()), Ok(3)];
        let kept: Vec<i32> = results
            .into_iter()
            .filter_map(|r| log_filter_warn(r, "test"))
            .collect();
        assert_eq!(kept, vec![1, 3]);
    }
}
