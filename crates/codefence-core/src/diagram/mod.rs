//! Diagram render surface.
//!
//! Compiles flowchart text to standalone SVG. The compiler's process-wide
//! configuration is initialised once; every render after that is
//! independent and shares nothing mutable.

mod layout;
mod parser;
mod svg;

use std::sync::OnceLock;

use thiserror::Error;

pub use layout::{Layout, Placement, layout, ranks};
pub use parser::{Direction, Edge, Flowchart, LinkStyle, Node, Shape};

use crate::editor::escape_html;
use crate::metadata::{DiagramMeta, extract_diagram_meta};

/// Diagram compile fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagramError {
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unsupported diagram type: {0}")]
    Unsupported(String),

    #[error("No diagram type detected")]
    NoDiagram,

    #[error("Render task failed: {0}")]
    Task(String),
}

/// Sizes and colors used for every render.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub font_family: &'static str,
    pub font_size: u32,
    /// Approximate advance of one label character
    pub char_width: f64,
    pub node_padding: f64,
    pub min_node_width: f64,
    pub node_height: f64,
    /// Space between nodes of one rank
    pub node_gap: f64,
    /// Space between ranks
    pub rank_gap: f64,
    /// Margin around the whole drawing
    pub padding: f64,
    pub fill: &'static str,
    pub stroke: &'static str,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            font_family: "trebuchet ms, verdana, arial, sans-serif",
            font_size: 14,
            char_width: 8.0,
            node_padding: 15.0,
            min_node_width: 60.0,
            node_height: 40.0,
            node_gap: 30.0,
            rank_gap: 50.0,
            padding: 8.0,
            fill: "#ECECFF",
            stroke: "#9370DB",
        }
    }
}

/// Outcome of one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramRenderResult {
    Svg { svg_markup: String },
    Error { error_message: String },
}

impl DiagramRenderResult {
    pub fn is_svg(&self) -> bool {
        matches!(self, DiagramRenderResult::Svg { .. })
    }
}

/// Flowchart compiler.
#[derive(Debug)]
pub struct DiagramCompiler {
    theme: Theme,
}

static COMPILER: OnceLock<DiagramCompiler> = OnceLock::new();

impl DiagramCompiler {
    /// Initialise the process-wide compiler. Later calls return the same
    /// instance without reconfiguring.
    pub fn initialize() -> &'static DiagramCompiler {
        COMPILER.get_or_init(|| {
            tracing::debug!("Initializing diagram compiler");
            DiagramCompiler {
                theme: Theme::default(),
            }
        })
    }

    /// Compile diagram text to SVG markup under a fresh element id.
    pub fn compile(&self, text: &str) -> Result<String, DiagramError> {
        let chart = Flowchart::parse(text.trim())?;
        let layout = layout(&chart, &self.theme);
        let id = format!("mermaid-svg-{}", uuid::Uuid::new_v4().simple());
        Ok(svg::emit(&chart, &layout, &self.theme, &id))
    }

    /// Compile off the async runtime's worker threads.
    pub async fn render(&'static self, text: &str) -> DiagramRenderResult {
        let text = text.to_string();
        let compiled = tokio::task::spawn_blocking(move || self.compile(&text))
            .await
            .unwrap_or_else(|e| Err(DiagramError::Task(e.to_string())));

        match compiled {
            Ok(svg_markup) => DiagramRenderResult::Svg { svg_markup },
            Err(e) => {
                tracing::debug!("Diagram render failed: {}", e);
                DiagramRenderResult::Error {
                    error_message: e.to_string(),
                }
            }
        }
    }
}

/// Render diagram text with the process-wide compiler.
pub async fn render(text: &str) -> DiagramRenderResult {
    DiagramCompiler::initialize().render(text).await
}

/// Surface for a diagram block.
#[derive(Debug, Clone)]
pub struct DiagramSurface {
    meta: DiagramMeta,
    code: String,
    result: Option<DiagramRenderResult>,
}

impl DiagramSurface {
    /// Mount from raw block text. Nothing renders until [`refresh`](Self::refresh).
    pub fn new(raw_text: &str) -> Self {
        let (meta, code) = extract_diagram_meta(raw_text);
        Self {
            meta,
            code,
            result: None,
        }
    }

    pub fn meta(&self) -> &DiagramMeta {
        &self.meta
    }

    /// Diagram text with directives removed.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Latest render, or `None` before the first one completes.
    pub fn result(&self) -> Option<&DiagramRenderResult> {
        self.result.as_ref()
    }

    /// Render the current code, replacing the previous result.
    pub async fn refresh(&mut self) -> &DiagramRenderResult {
        let result = render(&self.code).await;
        self.result.insert(result)
    }

    /// Replace the block text and render again.
    pub async fn update(&mut self, raw_text: &str) -> &DiagramRenderResult {
        let (meta, code) = extract_diagram_meta(raw_text);
        self.meta = meta;
        self.code = code;
        self.refresh().await
    }

    /// HTML figure: title, rendered diagram or inline error, caption.
    pub fn to_html(&self) -> String {
        let mut html = String::from("<figure class=\"codefence-diagram\">\n");

        if let Some(title) = &self.meta.title {
            html.push_str(&format!("<div class=\"diagram-title\">{}</div>\n", escape_html(title)));
        }

        let class = match &self.meta.css {
            Some(css) => format!("diagram-body {}", escape_html(css)),
            None => "diagram-body".to_string(),
        };
        html.push_str(&format!(
            "<div class=\"{}\" aria-label=\"Mermaid diagram\">",
            class
        ));
        match &self.result {
            Some(DiagramRenderResult::Svg { svg_markup }) => html.push_str(svg_markup),
            Some(DiagramRenderResult::Error { error_message }) => {
                html.push_str(&format!(
                    "<pre style=\"color:red;\">Mermaid render error: {}</pre>",
                    escape_html(error_message)
                ));
            }
            None => {}
        }
        html.push_str("</div>\n");

        if let Some(caption) = &self.meta.caption {
            html.push_str(&format!("<figcaption>{}</figcaption>\n", escape_html(caption)));
        }

        html.push_str("</figure>");
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_once() {
        let first = DiagramCompiler::initialize();
        let second = DiagramCompiler::initialize();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_each_compile_gets_fresh_id() {
        let compiler = DiagramCompiler::initialize();
        let a = compiler.compile("graph TD; A-->B").unwrap();
        let b = compiler.compile("graph TD; A-->B").unwrap();
        assert_ne!(a, b);
        assert!(a.contains("id=\"mermaid-svg-"));
    }

    #[tokio::test]
    async fn test_title_directive_then_compile() {
        let mut surface = DiagramSurface::new("// title: Flow\ngraph TD; A-->B");
        assert_eq!(surface.meta().title.as_deref(), Some("Flow"));
        assert_eq!(surface.code(), "graph TD; A-->B");
        assert!(surface.result().is_none());

        assert!(surface.refresh().await.is_svg());
        let html = surface.to_html();
        assert!(html.contains("<div class=\"diagram-title\">Flow</div>"));
        assert!(html.contains("<svg"));
        assert!(!html.contains("figcaption"));
    }

    #[tokio::test]
    async fn test_all_directives() {
        let mut surface =
            DiagramSurface::new("// title: T\n// caption: C & D\n// css: wide\ngraph LR\nA --> B");
        surface.refresh().await;
        let html = surface.to_html();
        assert!(html.contains("<figcaption>C &amp; D</figcaption>"));
        assert!(html.contains("class=\"diagram-body wide\""));
    }

    #[tokio::test]
    async fn test_error_replaces_previous_markup() {
        let mut surface = DiagramSurface::new("graph TD; A-->B");
        assert!(surface.refresh().await.is_svg());

        let result = surface.update("pie title Pets").await.clone();
        assert_eq!(
            result,
            DiagramRenderResult::Error {
                error_message: "Unsupported diagram type: pie".into()
            }
        );

        let html = surface.to_html();
        assert!(html.contains("Mermaid render error: Unsupported diagram type: pie"));
        assert!(!html.contains("<svg"));
    }

    #[tokio::test]
    async fn test_render_parse_error() {
        let result = render("graph TD\nA -> B").await;
        match result {
            DiagramRenderResult::Error { error_message } => {
                assert!(error_message.starts_with("Parse error on line 2:"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }
}
