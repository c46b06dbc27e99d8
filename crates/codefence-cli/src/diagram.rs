//! Diagram command: compile one diagram file.

use std::fs;

use codefence_core::{DiagramRenderResult, DiagramSurface};

use crate::output::emit;

/// Compile the diagram at `path`, honouring title/caption/css directives.
pub async fn execute(path: &str, out: Option<&str>) -> anyhow::Result<()> {
    let text = fs::read_to_string(path)
        .map_err(|e| codefence_core::Error::Document(format!("failed to read {}: {}", path, e)))?;

    let mut surface = DiagramSurface::new(&text);
    if let DiagramRenderResult::Error { error_message } = surface.refresh().await {
        anyhow::bail!("Mermaid render error: {}", error_message);
    }

    emit(&surface.to_html(), out)
}
