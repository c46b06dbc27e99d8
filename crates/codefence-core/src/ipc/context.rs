//! Host-side handles to isolated execution contexts.
//!
//! An [`IsolatedContext`] is one request/reply channel pair. Requests are
//! delivered and answered in send order; there is no request id because a
//! surface never has more than one request outstanding.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{PYTHON_ENV, RuntimeConfig, WORKER_PATH_ENV};
use crate::error::{Error, Result};

use super::process::{kill_process_group, new_process_group};
use super::protocol::{ContextReply, ContextRequest, read_message, write_message};
use super::server::{ContextServer, Interpreter};

/// Capacity of the request and reply channels.
const CHANNEL_CAPACITY: usize = 8;

/// Name of the worker binary.
const WORKER_BINARY: &str = if cfg!(windows) {
    "codefence-worker.exe"
} else {
    "codefence-worker"
};

/// Host end of an isolated context.
pub struct IsolatedContext {
    /// Outgoing requests.
    requests: mpsc::Sender<ContextRequest>,
    /// Incoming replies.
    replies: mpsc::Receiver<ContextReply>,
    /// Pump or server tasks owned by this context.
    tasks: Vec<JoinHandle<()>>,
    /// Worker process, for process-backed contexts. It leads the process
    /// group its interpreters run in.
    child: Option<Child>,
}

/// Context end of the channel pair.
pub struct ContextEndpoint {
    /// Requests from the host, in send order.
    pub requests: mpsc::Receiver<ContextRequest>,
    /// Replies back to the host.
    pub replies: mpsc::Sender<ContextReply>,
}

impl ContextEndpoint {
    /// Answer requests with `server` until the host goes away.
    pub async fn serve<I: Interpreter>(mut self, mut server: ContextServer<I>) {
        while let Some(request) = self.requests.recv().await {
            if let Some(reply) = server.handle(request).await
                && self.replies.send(reply).await.is_err()
            {
                break;
            }
        }
    }
}

impl IsolatedContext {
    /// Create a bare channel pair. The caller drives the context end.
    pub fn pair() -> (Self, ContextEndpoint) {
        let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (reply_tx, reply_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let context = Self {
            requests: request_tx,
            replies: reply_rx,
            tasks: Vec::new(),
            child: None,
        };
        let endpoint = ContextEndpoint {
            requests: request_rx,
            replies: reply_tx,
        };

        (context, endpoint)
    }

    /// Run `interpreter` on a tokio task behind the protocol.
    ///
    /// Must be called from within a tokio runtime.
    pub fn in_process<I: Interpreter>(interpreter: I) -> Self {
        let (mut context, endpoint) = Self::pair();
        let task = tokio::spawn(endpoint.serve(ContextServer::new(interpreter)));
        context.tasks.push(task);
        context
    }

    /// Spawn a worker process and pump frames between it and the channels.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_worker(worker_path: &Path, python: Option<&str>) -> Result<Self> {
        let mut command = Command::new(worker_path);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let worker stderr pass through for debugging
            .kill_on_drop(true);
        new_process_group(&mut command);
        if let Some(python) = python {
            command.env(PYTHON_ENV, python);
        }

        let mut child = command.spawn().map_err(|e| {
            Error::Launch(format!(
                "Failed to spawn worker process '{}': {}",
                worker_path.display(),
                e
            ))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Launch("Failed to get worker stdin".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Launch("Failed to get worker stdout".to_string()))?;

        let (mut context, endpoint) = Self::pair();
        let ContextEndpoint {
            requests: mut request_rx,
            replies: reply_tx,
        } = endpoint;

        let writer = tokio::spawn(async move {
            while let Some(request) = request_rx.recv().await {
                if let Err(e) = write_message(&mut stdin, &request).await {
                    tracing::warn!("Worker request channel broken: {}", e);
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            loop {
                match read_message::<_, ContextReply>(&mut stdout).await {
                    Ok(Some(ContextReply::Unknown)) => {
                        tracing::debug!("Ignoring unknown reply from worker");
                    }
                    Ok(Some(reply)) => {
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("Worker closed its output");
                        break;
                    }
                    Err(Error::Serialization(e)) => {
                        tracing::warn!("Dropping malformed reply from worker: {}", e);
                    }
                    Err(e) => {
                        tracing::warn!("Worker reply channel broken: {}", e);
                        break;
                    }
                }
            }
        });

        tracing::debug!("Spawned worker pid {:?}", child.id());
        context.tasks.push(writer);
        context.tasks.push(reader);
        context.child = Some(child);
        Ok(context)
    }

    /// Send a request.
    pub async fn send(&self, request: ContextRequest) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| Error::Ipc("Isolated context has gone away".to_string()))
    }

    /// Receive the next reply, or `None` once the context has gone away.
    pub async fn recv(&mut self) -> Option<ContextReply> {
        self.replies.recv().await
    }

    /// Tear the context down, killing the worker and anything it is
    /// running.
    ///
    /// Any in-flight reply is discarded.
    pub async fn shutdown(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }

        if let Some(mut child) = self.child.take() {
            if let Some(pid) = child.id() {
                kill_process_group(pid);
            }
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill worker: {}", e);
            }
        }
    }
}

impl Drop for IsolatedContext {
    fn drop(&mut self) {
        // Tasks do not stop on their own when their handle is dropped
        for task in &self.tasks {
            task.abort();
        }
        if let Some(pid) = self.child.as_ref().and_then(Child::id) {
            kill_process_group(pid);
        }
    }
}

/// Creates one isolated context per sandboxed surface mount.
pub trait ContextLauncher: Send + Sync {
    /// Launch a fresh context. Must be called from within a tokio runtime.
    fn launch(&self) -> Result<IsolatedContext>;
}

/// Launches `codefence-worker` processes.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    worker_path: PathBuf,
    python: Option<String>,
}

impl WorkerLauncher {
    /// Use an explicit worker binary.
    pub fn new(worker_path: impl Into<PathBuf>, python: Option<String>) -> Self {
        Self {
            worker_path: worker_path.into(),
            python,
        }
    }

    /// Locate the worker binary according to `config`.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let worker_path = match &config.worker_path {
            Some(path) if path.exists() => path.clone(),
            Some(path) => {
                return Err(Error::Launch(format!(
                    "Configured worker '{}' does not exist",
                    path.display()
                )));
            }
            None => Self::find_worker_binary()?,
        };

        Ok(Self::new(worker_path, config.python.clone()))
    }

    /// Path of the worker binary this launcher spawns.
    pub fn worker_path(&self) -> &Path {
        &self.worker_path
    }

    /// Find the codefence-worker binary path.
    ///
    /// Looks in the following order:
    /// 1. `CODEFENCE_WORKER_PATH` environment variable
    /// 2. Same directory as the current executable
    /// 3. System PATH
    /// 4. `target/debug` or `target/release` of this workspace
    pub fn find_worker_binary() -> Result<PathBuf> {
        // 1. Check environment variable
        if let Ok(path) = std::env::var(WORKER_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }

        // 2. Look next to current executable
        if let Ok(exe_path) = std::env::current_exe()
            && let Some(exe_dir) = exe_path.parent()
        {
            let worker_path = exe_dir.join(WORKER_BINARY);
            if worker_path.exists() {
                return Ok(worker_path);
            }
            // Test binaries live one level down in target/<profile>/deps
            if let Some(profile_dir) = exe_dir.parent() {
                let worker_path = profile_dir.join(WORKER_BINARY);
                if worker_path.exists() {
                    return Ok(worker_path);
                }
            }
        }

        // 3. Try system PATH via which
        if let Ok(path) = which::which(WORKER_BINARY) {
            return Ok(path);
        }

        // 4. For development: try target/debug or target/release
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            for profile in &["debug", "release"] {
                let path = PathBuf::from(&manifest_dir)
                    .join("..")
                    .join("..")
                    .join("target")
                    .join(profile)
                    .join(WORKER_BINARY);
                if path.exists() {
                    return Ok(path.canonicalize().unwrap_or(path));
                }
            }
        }

        Err(Error::Launch(
            "Could not find codefence-worker binary. Set CODEFENCE_WORKER_PATH or ensure it's in PATH."
                .to_string(),
        ))
    }
}

impl ContextLauncher for WorkerLauncher {
    fn launch(&self) -> Result<IsolatedContext> {
        IsolatedContext::spawn_worker(&self.worker_path, self.python.as_deref())
    }
}

/// Launches in-process contexts from an interpreter factory.
pub struct InProcessLauncher<F> {
    factory: F,
}

impl<F, I> InProcessLauncher<F>
where
    F: Fn() -> I + Send + Sync,
    I: Interpreter,
{
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F, I> ContextLauncher for InProcessLauncher<F>
where
    F: Fn() -> I + Send + Sync,
    I: Interpreter,
{
    fn launch(&self) -> Result<IsolatedContext> {
        Ok(IsolatedContext::in_process((self.factory)()))
    }
}
