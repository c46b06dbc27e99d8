//! Validated code block values.
//!
//! Markup renderers hand us loosely-shaped properties: the block text and
//! either a class attribute (`language-python extra`) or a fence info string
//! (`python title=x`). Both are normalised here, once, into a [`CodeBlock`];
//! everything downstream works on the typed value.

use std::fmt;

/// Position of a block within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    pub fn new(position: usize) -> Self {
        Self(position)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block_{}", self.0)
    }
}

/// One fenced code block as sourced from content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Position in the document
    pub id: BlockId,
    /// Verbatim block text
    pub raw_text: String,
    /// Normalised, lower-cased language identifier
    pub language: Option<String>,
    /// Remainder of the fence info string after the language
    pub meta: Option<String>,
}

impl CodeBlock {
    /// Build a block from an already-normalised language tag.
    pub fn new(id: BlockId, raw_text: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            id,
            raw_text: raw_text.into(),
            language: language.and_then(normalize_token),
            meta: None,
        }
    }

    /// Build a block from a fence info string such as `python no-run`.
    pub fn from_info_string(id: BlockId, raw_text: impl Into<String>, info: &str) -> Self {
        let info = info.trim();
        let (language, meta) = match info.split_once(char::is_whitespace) {
            Some((lang, rest)) => (lang, Some(rest.trim()).filter(|m| !m.is_empty())),
            None => (info, None),
        };

        Self {
            id,
            raw_text: raw_text.into(),
            language: normalize_token(language),
            meta: meta.map(str::to_string),
        }
    }

    /// Build a block from renderer properties: the text child and a class
    /// attribute that may carry several tokens besides `language-<x>`.
    pub fn from_props(id: BlockId, children: Option<&str>, class_name: Option<&str>) -> Self {
        let language = class_name.and_then(language_from_class);

        Self {
            id,
            raw_text: children.unwrap_or_default().to_string(),
            language,
            meta: None,
        }
    }

    /// Language tag as a string slice, if present.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Whether the fence meta carries the given flag token.
    pub fn has_meta_flag(&self, flag: &str) -> bool {
        self.meta
            .as_deref()
            .is_some_and(|meta| meta.split_whitespace().any(|token| token.eq_ignore_ascii_case(flag)))
    }
}

/// Pick the language out of a class attribute.
///
/// The first `language-<x>` token wins; without one, the first token is
/// taken as the language.
fn language_from_class(class_name: &str) -> Option<String> {
    let mut tokens = class_name.split_whitespace();
    let first = tokens.clone().next()?;

    tokens
        .find_map(|token| token.strip_prefix("language-"))
        .or(Some(first))
        .and_then(normalize_token)
}

fn normalize_token(token: &str) -> Option<String> {
    let token = token.trim();
    let token = token.strip_prefix("language-").unwrap_or(token);
    if token.is_empty() {
        None
    } else {
        Some(token.to_ascii_lowercase())
    }
}
