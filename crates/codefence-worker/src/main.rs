//! Isolated execution context for codefence sandboxed blocks.
//!
//! Reads length-prefixed JSON requests from stdin and writes replies to
//! stdout. Logs go to stderr since stdout carries the protocol. The process
//! exits when the host closes stdin.

use codefence_core::config::PYTHON_ENV;
use codefence_core::ipc::{ContextServer, PythonInterpreter};
use tokio::io;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let python = std::env::var(PYTHON_ENV).ok().filter(|p| !p.trim().is_empty());
    let mut server = ContextServer::new(PythonInterpreter::new(python));

    let mut stdin = io::stdin();
    let mut stdout = io::stdout();

    tracing::debug!("Worker started");

    server.serve_stream(&mut stdin, &mut stdout).await?;

    tracing::debug!("Host closed stdin, exiting");
    Ok(())
}
