//! Directive lines at the top of a code block.
//!
//! A directive is a leading comment line of the form `// <key>: <value>`.
//! Extraction is pure: it never touches the block, it returns the value and
//! the residual code with the directive line removed. Directives stack only
//! when each one is the first line after the previous ones were removed.

/// Sentinel first line that stops a sandboxed block from running on load.
pub const NO_RUN_SENTINEL: &str = "# no-run";

/// Keys understood for diagram blocks, in the order they are extracted.
pub const DIAGRAM_KEYS: [&str; 3] = ["title", "caption", "css"];

/// Extract a single `// <key>: <value>` directive from the first line.
///
/// The key is matched case-insensitively. On a match the trimmed value and
/// the code without that line are returned; otherwise `None` and the
/// original code, unchanged.
pub fn extract(code: &str, key: &str) -> (Option<String>, String) {
    let trimmed = code.trim_start();
    let (first, rest) = split_first_line(trimmed);

    match directive_value(first, key) {
        Some(value) => (Some(value.to_string()), rest.to_string()),
        None => (None, code.to_string()),
    }
}

/// Strip the auto-run suppression sentinel.
///
/// Returns whether the sentinel was present and the code to execute.
pub fn strip_no_run(code: &str) -> (bool, String) {
    let trimmed = code.trim_start();
    let (first, rest) = split_first_line(trimmed);

    if first.trim() == NO_RUN_SENTINEL {
        (true, rest.to_string())
    } else {
        (false, code.to_string())
    }
}

/// Presentation directives of a diagram block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagramMeta {
    /// Heading shown above the diagram
    pub title: Option<String>,
    /// Caption shown below the diagram
    pub caption: Option<String>,
    /// Extra CSS class for the diagram container
    pub css: Option<String>,
}

/// Extract `title`, `caption` and `css` in that fixed order.
pub fn extract_diagram_meta(code: &str) -> (DiagramMeta, String) {
    let (title, code) = extract(code, DIAGRAM_KEYS[0]);
    let (caption, code) = extract(&code, DIAGRAM_KEYS[1]);
    let (css, code) = extract(&code, DIAGRAM_KEYS[2]);

    (DiagramMeta { title, caption, css }, code)
}

fn split_first_line(text: &str) -> (&str, &str) {
    match text.split_once('\n') {
        Some((first, rest)) => (first.strip_suffix('\r').unwrap_or(first), rest),
        None => (text, ""),
    }
}

/// Match `// <key>: <value>` and return the trimmed, non-empty value.
fn directive_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let body = line.trim_end().strip_prefix("//")?.trim_start();
    let (found_key, value) = body.split_once(':')?;

    if !found_key.eq_ignore_ascii_case(key) {
        return None;
    }

    let value = value.trim();
    if value.is_empty() { None } else { Some(value) }
}
