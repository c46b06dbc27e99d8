//! Render command: mount a whole document and print its HTML.

use std::sync::Arc;
use std::time::Instant;

use codefence_core::ipc::{ContextLauncher, InProcessLauncher, PythonInterpreter, WorkerLauncher};
use codefence_core::{Dispatcher, Document, MountedDocument, RuntimeConfig, SurfaceKind, classify};

use crate::colors;
use crate::output::emit;

/// Render a document.
pub async fn execute(
    document_path: &str,
    out: Option<&str>,
    in_process: bool,
    timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = RuntimeConfig::from_env();
    if let Some(ms) = timeout_ms {
        config.settle_timeout_ms = ms;
    }

    let document = Document::load(document_path)?;
    let launcher = launcher(&config, &document, in_process)?;

    let mut mounted = MountedDocument::mount(Dispatcher::new(launcher), &document);
    let failures = mounted.settle(config.settle_timeout()).await;

    for (id, err) in &failures {
        eprintln!("{}warning:{} {} did not settle: {}", colors::YELLOW, colors::RESET, id, err);
    }

    let html = mounted.to_html();
    mounted.unmount().await;
    emit(&html, out)?;

    eprintln!(
        "{}Rendered{} {} blocks in {:.2}s",
        colors::GREEN,
        colors::RESET,
        document.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Pick the context launcher for sandboxed blocks.
///
/// The worker binary is only located when the document has sandboxed
/// blocks, so documents without them render without one.
fn launcher(
    config: &RuntimeConfig,
    document: &Document,
    in_process: bool,
) -> anyhow::Result<Arc<dyn ContextLauncher>> {
    let needs_context = document
        .blocks
        .iter()
        .any(|block| classify(block.language()) == SurfaceKind::Sandboxed);

    if needs_context && !in_process {
        let worker = WorkerLauncher::from_config(config)?;
        tracing::debug!("Using worker at {}", worker.worker_path().display());
        let launcher: Arc<dyn ContextLauncher> = Arc::new(worker);
        return Ok(launcher);
    }

    let python = config.python.clone();
    let launcher: Arc<dyn ContextLauncher> =
        Arc::new(InProcessLauncher::new(move || PythonInterpreter::new(python.clone())));
    Ok(launcher)
}
