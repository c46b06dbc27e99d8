//! Language tag classification.
//!
//! Maps a block's declared language onto the surface that renders it. The
//! mapping is total: no tag, however odd, can fail classification.

use std::fmt;

/// Language executed in an isolated context.
pub const SANDBOX_LANGUAGE: &str = "python";

/// Languages evaluated live in the host against injected bindings.
pub const LIVE_LANGUAGES: [&str; 2] = ["jsx", "live"];

/// Declarative diagram language.
pub const DIAGRAM_LANGUAGE: &str = "mermaid";

/// The rendering strategy chosen for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// Run off-thread in an isolated execution context.
    Sandboxed,
    /// Evaluate in the host with injected runtime bindings.
    LiveEval,
    /// Compile to a diagram.
    Diagram,
    /// Highlighted, editable, never executed.
    Editor,
    /// Plain preformatted text.
    Passthrough,
}

impl SurfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceKind::Sandboxed => "sandboxed",
            SurfaceKind::LiveEval => "live",
            SurfaceKind::Diagram => "diagram",
            SurfaceKind::Editor => "editor",
            SurfaceKind::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a language tag.
///
/// Absent or blank tags are passthrough; unknown tags become editors.
pub fn classify(language: Option<&str>) -> SurfaceKind {
    let Some(tag) = language.map(str::trim).filter(|t| !t.is_empty()) else {
        return SurfaceKind::Passthrough;
    };

    if tag.eq_ignore_ascii_case(SANDBOX_LANGUAGE) {
        SurfaceKind::Sandboxed
    } else if LIVE_LANGUAGES.iter().any(|l| tag.eq_ignore_ascii_case(l)) {
        SurfaceKind::LiveEval
    } else if tag.eq_ignore_ascii_case(DIAGRAM_LANGUAGE) {
        SurfaceKind::Diagram
    } else {
        SurfaceKind::Editor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_languages() {
        assert_eq!(classify(Some("python")), SurfaceKind::Sandboxed);
        assert_eq!(classify(Some("jsx")), SurfaceKind::LiveEval);
        assert_eq!(classify(Some("live")), SurfaceKind::LiveEval);
        assert_eq!(classify(Some("mermaid")), SurfaceKind::Diagram);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify(Some("Python")), SurfaceKind::Sandboxed);
        assert_eq!(classify(Some("MERMAID")), SurfaceKind::Diagram);
    }

    #[test]
    fn test_absent_or_blank_is_passthrough() {
        assert_eq!(classify(None), SurfaceKind::Passthrough);
        assert_eq!(classify(Some("")), SurfaceKind::Passthrough);
        assert_eq!(classify(Some(" \t")), SurfaceKind::Passthrough);
    }

    #[test]
    fn test_unknown_tags_fall_through_to_editor() {
        let odd = [
            "rust",
            "bash",
            "py",
            "python3",
            "language-python",
            "c++",
            "{.weird}",
            "\u{1F980}",
            "a\0b",
            "mermaid-ish",
        ];
        for tag in odd {
            assert_eq!(classify(Some(tag)), SurfaceKind::Editor, "tag {:?}", tag);
        }
    }
}
