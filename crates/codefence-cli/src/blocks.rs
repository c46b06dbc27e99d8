//! Blocks command: list a document's code blocks and their surfaces.

use codefence_core::{Document, classify};

use crate::colors;

/// List every code block of the document.
pub fn execute(document_path: &str) -> anyhow::Result<()> {
    let document = Document::load(document_path)?;

    if document.is_empty() {
        println!("{}No code blocks found in {}.{}", colors::YELLOW, document_path, colors::RESET);
        return Ok(());
    }

    println!(
        "{}{:<10} {:<12} {:<14} {}{}",
        colors::BOLD,
        "BLOCK",
        "LANGUAGE",
        "SURFACE",
        "META",
        colors::RESET
    );

    for block in &document.blocks {
        let kind = classify(block.language());
        println!(
            "{:<10} {:<12} {}{:<14}{} {}{}{}",
            block.id.to_string(),
            block.language().unwrap_or("-"),
            colors::CYAN,
            kind.as_str(),
            colors::RESET,
            colors::DIM,
            block.meta.as_deref().unwrap_or(""),
            colors::RESET
        );
    }

    println!("\n{} blocks", document.len());
    Ok(())
}
