//! Shared helpers for the chumsky grammars.

use std::fmt;

use chumsky::error::Rich;

/// Describe the first parse error as `expected X, found Y`.
///
/// `end` names the end of input in the caller's terms.
pub(crate) fn describe<T: fmt::Display>(errors: &[Rich<'_, T>], end: &str) -> String {
    let Some(error) = errors.first() else {
        return "invalid input".to_string();
    };

    let found = match error.found() {
        Some(token) => format!("'{}'", token),
        None => end.to_string(),
    };

    let mut expected: Vec<String> = error.expected().map(ToString::to_string).collect();
    expected.sort();
    expected.dedup();

    if expected.is_empty() {
        format!("unexpected {}", found)
    } else {
        format!("expected {}, found {}", expected.join(" or "), found)
    }
}
