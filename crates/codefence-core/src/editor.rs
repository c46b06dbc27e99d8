//! Non-executing views: the highlighted editor and the plain passthrough.

use std::sync::LazyLock;

use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);

/// Class style for highlighted spans (prefix avoids CSS conflicts).
const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hl-" };

/// Escape text for HTML element content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Map a block language tag to a token the bundled syntaxes know.
fn syntax_token(language: &str) -> &str {
    match language {
        "ts" | "tsx" | "typescript" | "jsx" | "javascript" => "js",
        "shell" | "bash" | "zsh" | "console" => "sh",
        "yml" => "yaml",
        "rust" => "rs",
        "python" | "py3" => "py",
        other => other,
    }
}

fn find_syntax(language: &str) -> &'static SyntaxReference {
    SYNTAX_SET
        .find_syntax_by_token(syntax_token(language))
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text())
}

/// Highlight `code` as class-annotated HTML spans.
///
/// Unknown languages use the plain-text syntax; a highlighter fault falls
/// back to escaped text.
pub fn highlight(language: &str, code: &str) -> String {
    let syntax = find_syntax(language);
    let mut generator = ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, CLASS_STYLE);

    for line in LinesWithEndings::from(code) {
        if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
            tracing::debug!("Highlighting {} failed: {}", language, e);
            return escape_html(code);
        }
    }
    generator.finalize()
}

/// Editable, highlighted, never-executed view of a block.
#[derive(Debug, Clone)]
pub struct EditorSurface {
    language: String,
    buffer: String,
}

impl EditorSurface {
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            buffer: code.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn code(&self) -> &str {
        &self.buffer
    }

    /// Replace the buffer.
    pub fn edit(&mut self, code: impl Into<String>) {
        self.buffer = code.into();
    }

    pub fn highlighted(&self) -> String {
        highlight(&self.language, &self.buffer)
    }

    pub fn to_html(&self) -> String {
        format!(
            "<pre class=\"codefence-editor\" data-language=\"{}\"><code>{}</code></pre>",
            escape_html(&self.language),
            self.highlighted()
        )
    }
}

/// Plain code view for blocks without a language.
#[derive(Debug, Clone)]
pub struct PassthroughView {
    code: String,
}

impl PassthroughView {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn to_html(&self) -> String {
        format!("<pre><code>{}</code></pre>", escape_html(&self.code))
    }
}
