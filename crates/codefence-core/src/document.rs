//! Markdown content documents.
//!
//! Only the fenced and indented code blocks matter to the execution
//! subsystem; prose is left to whatever renders the page.

use std::fs;
use std::path::{Path, PathBuf};

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};

use crate::block::{BlockId, CodeBlock};
use crate::error::{Error, Result};

/// A parsed content document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Where the document was loaded from, if anywhere.
    pub source_path: Option<PathBuf>,
    /// Code blocks in document order.
    pub blocks: Vec<CodeBlock>,
}

impl Document {
    /// Load and parse a markdown file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|e| Error::Document(format!("failed to read {}: {}", path.display(), e)))?;

        let mut document = Self::parse(&source);
        document.source_path = Some(path.to_path_buf());
        Ok(document)
    }

    /// Parse markdown source, collecting code blocks.
    pub fn parse(source: &str) -> Self {
        let mut blocks = Vec::new();
        let mut current: Option<(Option<String>, String)> = None;

        for event in Parser::new(source) {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let info = match kind {
                        CodeBlockKind::Fenced(info) => Some(info.to_string()),
                        CodeBlockKind::Indented => None,
                    };
                    current = Some((info, String::new()));
                }
                Event::Text(text) => {
                    if let Some((_, body)) = current.as_mut() {
                        body.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((info, body)) = current.take() {
                        let id = BlockId::new(blocks.len());
                        let block = match info {
                            Some(info) => CodeBlock::from_info_string(id, body, &info),
                            None => CodeBlock::new(id, body, None),
                        };
                        blocks.push(block);
                    }
                }
                _ => {}
            }
        }

        tracing::debug!("Parsed document with {} code blocks", blocks.len());

        Self {
            source_path: None,
            blocks,
        }
    }

    /// Number of code blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
