//! Routing blocks to surfaces.
//!
//! [`Dispatcher`] is the single entry point for content rendering. It holds
//! no per-document state: every call strips directives, classifies the
//! block and mounts a fresh surface. [`MountedDocument`] owns the surfaces
//! of one document and tears them all down on navigation.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::block::{BlockId, CodeBlock};
use crate::classify::{SurfaceKind, classify};
use crate::diagram::DiagramSurface;
use crate::document::Document;
use crate::editor::{EditorSurface, PassthroughView, escape_html};
use crate::error::{Error, Result};
use crate::ipc::ContextLauncher;
use crate::live::LiveSurface;
use crate::metadata::strip_no_run;
use crate::sandbox::{ExecutionRequest, SandboxSurface};

/// Fence meta flag with the same effect as the no-run sentinel line.
pub const NO_RUN_FLAG: &str = "no-run";

/// A mounted surface of any kind.
pub enum Surface {
    Sandboxed(SandboxSurface),
    Live(LiveSurface),
    Diagram(DiagramSurface),
    Editor(EditorSurface),
    Passthrough(PassthroughView),
}

impl Surface {
    pub fn kind(&self) -> SurfaceKind {
        match self {
            Surface::Sandboxed(_) => SurfaceKind::Sandboxed,
            Surface::Live(_) => SurfaceKind::LiveEval,
            Surface::Diagram(_) => SurfaceKind::Diagram,
            Surface::Editor(_) => SurfaceKind::Editor,
            Surface::Passthrough(_) => SurfaceKind::Passthrough,
        }
    }

    /// Wait for the surface's initial asynchronous work.
    ///
    /// Diagrams render once; sandboxes finish bootstrapping and, unless
    /// auto-run is suppressed, their automatic run. Synchronous surfaces are
    /// already settled.
    pub async fn settle(&mut self, timeout: Duration) -> Result<()> {
        match self {
            Surface::Sandboxed(sandbox) => {
                let wait_for_run = !sandbox.request().suppress_auto_run;
                sandbox
                    .wait_for_timeout(timeout, |s| {
                        if wait_for_run {
                            s.settled.is_some()
                        } else {
                            s.lifecycle.accepts_runs()
                        }
                    })
                    .await?;
                Ok(())
            }
            Surface::Diagram(diagram) => {
                if diagram.result().is_none() {
                    tokio::time::timeout(timeout, diagram.refresh())
                        .await
                        .map_err(|_| Error::Timeout)?;
                }
                Ok(())
            }
            Surface::Live(_) | Surface::Editor(_) | Surface::Passthrough(_) => Ok(()),
        }
    }

    pub fn to_html(&self) -> String {
        match self {
            Surface::Sandboxed(s) => s.to_html(),
            Surface::Live(s) => s.to_html(),
            Surface::Diagram(s) => s.to_html(),
            Surface::Editor(s) => s.to_html(),
            Surface::Passthrough(s) => s.to_html(),
        }
    }

    /// Release the surface's resources. Sandboxes tear down their context.
    pub async fn unmount(self) {
        if let Surface::Sandboxed(sandbox) = self {
            sandbox.unmount().await;
        }
    }
}

/// Stateless router from blocks to surfaces.
#[derive(Clone)]
pub struct Dispatcher {
    launcher: Arc<dyn ContextLauncher>,
}

impl Dispatcher {
    /// Create a dispatcher whose sandboxed surfaces launch contexts with `launcher`.
    pub fn new(launcher: Arc<dyn ContextLauncher>) -> Self {
        Self { launcher }
    }

    /// Mount a fresh surface for `block`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, block: &CodeBlock) -> Surface {
        let kind = classify(block.language());
        tracing::debug!("Dispatching {} as {}", block.id, kind);

        match kind {
            SurfaceKind::Sandboxed => {
                let (sentinel, code) = strip_no_run(&block.raw_text);
                let request = ExecutionRequest {
                    code,
                    language_tag: block.language().unwrap_or_default().to_string(),
                    suppress_auto_run: sentinel || block.has_meta_flag(NO_RUN_FLAG),
                };
                Surface::Sandboxed(SandboxSurface::mount(request, self.launcher.as_ref()))
            }
            SurfaceKind::LiveEval => Surface::Live(LiveSurface::new(block.raw_text.as_str())),
            SurfaceKind::Diagram => Surface::Diagram(DiagramSurface::new(&block.raw_text)),
            SurfaceKind::Editor => Surface::Editor(EditorSurface::new(
                block.raw_text.as_str(),
                block.language().unwrap_or_default(),
            )),
            SurfaceKind::Passthrough => Surface::Passthrough(PassthroughView::new(block.raw_text.as_str())),
        }
    }
}

/// The surfaces of the currently displayed document.
pub struct MountedDocument {
    dispatcher: Dispatcher,
    surfaces: Vec<(BlockId, Surface)>,
}

impl MountedDocument {
    /// Mount a surface for every block of `document`.
    pub fn mount(dispatcher: Dispatcher, document: &Document) -> Self {
        let surfaces = Self::mount_blocks(&dispatcher, document);
        Self { dispatcher, surfaces }
    }

    fn mount_blocks(dispatcher: &Dispatcher, document: &Document) -> Vec<(BlockId, Surface)> {
        document
            .blocks
            .iter()
            .map(|block| (block.id, dispatcher.dispatch(block)))
            .collect()
    }

    /// Mounted surfaces in document order.
    pub fn surfaces(&self) -> &[(BlockId, Surface)] {
        &self.surfaces
    }

    pub fn surface(&self, id: BlockId) -> Option<&Surface> {
        self.surfaces.iter().find(|(b, _)| *b == id).map(|(_, s)| s)
    }

    pub fn surface_mut(&mut self, id: BlockId) -> Option<&mut Surface> {
        self.surfaces.iter_mut().find(|(b, _)| *b == id).map(|(_, s)| s)
    }

    /// Switch to another document: every current surface is unmounted
    /// before the new ones mount.
    pub async fn navigate(&mut self, document: &Document) {
        self.unmount_all().await;
        self.surfaces = Self::mount_blocks(&self.dispatcher, document);
    }

    /// Wait for every surface to settle, sharing one deadline.
    ///
    /// Returns the surfaces that failed to settle.
    pub async fn settle(&mut self, timeout: Duration) -> Vec<(BlockId, Error)> {
        let deadline = Instant::now() + timeout;
        let mut failures = Vec::new();

        for (id, surface) in &mut self.surfaces {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Err(e) = surface.settle(remaining).await {
                tracing::warn!("{} ({}) did not settle: {}", id, surface.kind(), e);
                failures.push((*id, e));
            }
        }

        failures
    }

    /// HTML fragments of every surface, in document order.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for (id, surface) in &self.surfaces {
            html.push_str(&format!(
                "<section class=\"codefence-block\" data-block=\"{}\" data-kind=\"{}\">\n{}\n</section>\n",
                escape_html(&id.to_string()),
                surface.kind(),
                surface.to_html()
            ));
        }
        html
    }

    /// Tear down every surface.
    pub async fn unmount(mut self) {
        self.unmount_all().await;
    }

    async fn unmount_all(&mut self) {
        for (_, surface) in self.surfaces.drain(..) {
            surface.unmount().await;
        }
    }
}
