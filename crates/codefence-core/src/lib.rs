//! Core engine for codefence interactive code blocks.
//!
//! This crate provides:
//! - Code block normalisation, directive extraction and classification
//! - Sandboxed interpreter surfaces backed by isolated execution contexts
//! - The isolated-context protocol, launchers and worker-side server
//! - Live evaluation against injected state bindings
//! - Flowchart diagram compilation to SVG
//! - Highlighted editor and passthrough views
//! - Dispatch of whole documents to mounted surfaces

pub mod block;
pub mod classify;
pub mod config;
pub mod diagram;
pub mod dispatch;
pub mod document;
pub mod editor;
pub mod error;
mod grammar;
pub mod ipc;
pub mod live;
pub mod metadata;
pub mod sandbox;

pub use block::{BlockId, CodeBlock};
pub use classify::{SurfaceKind, classify};
pub use config::RuntimeConfig;
pub use diagram::{DiagramCompiler, DiagramError, DiagramRenderResult, DiagramSurface};
pub use dispatch::{Dispatcher, MountedDocument, Surface};
pub use document::Document;
pub use editor::{EditorSurface, PassthroughView};
pub use error::{Error, Result};
pub use ipc::{ContextLauncher, InProcessLauncher, IsolatedContext, WorkerLauncher};
pub use live::{EvalError, LiveSurface};
pub use metadata::{DiagramMeta, extract, extract_diagram_meta, strip_no_run};
pub use sandbox::{ExecutionRequest, Lifecycle, SandboxSnapshot, SandboxSurface};
