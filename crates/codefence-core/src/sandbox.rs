//! Sandboxed interpreter surface.
//!
//! Owns one isolated context for its mounted lifetime and drives it through
//! `Bootstrapping → Ready → Busy → Ready`. A fault moves `Busy → Errored`,
//! which accepts runs exactly like `Ready`.
//!
//! Run requests go through a `watch` channel, so while a run is in flight
//! only the latest request is kept: the in-flight run finishes first, then
//! the newest pending request runs. Replies therefore always match the
//! request that produced them.

use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::editor::{escape_html, highlight};
use crate::error::{Error, Result};
use crate::ipc::{ContextLauncher, ContextReply, ContextRequest, IsolatedContext};

/// Output shown while the context loads.
pub const LOADING_PLACEHOLDER: &str = "Loading Python...";
/// Output shown while a run is in flight.
pub const RUNNING_PLACEHOLDER: &str = "Running...";
/// Output shown for a successful run that printed nothing.
pub const NO_OUTPUT_PLACEHOLDER: &str = "(no output)";
/// Fault shown when the context dies under a run.
pub const CONTEXT_LOST_MESSAGE: &str = "Isolated context closed";

/// Code to execute for one sandboxed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Code with directive lines already stripped
    pub code: String,
    /// Language the block declared
    pub language_tag: String,
    /// When set, nothing runs until the user asks
    pub suppress_auto_run: bool,
}

/// Lifecycle of a sandbox session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Waiting for the context to report `ready`.
    Bootstrapping,
    /// Idle; accepts runs.
    Ready,
    /// A run is in flight.
    Busy,
    /// Idle after a faulting run; accepts runs.
    Errored,
}

impl Lifecycle {
    /// Whether a new run may be issued.
    pub fn accepts_runs(&self) -> bool {
        matches!(self, Lifecycle::Ready | Lifecycle::Busy | Lifecycle::Errored)
    }

    /// Whether no run is in flight and the context is up.
    pub fn is_idle(&self) -> bool {
        matches!(self, Lifecycle::Ready | Lifecycle::Errored)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Bootstrapping => "bootstrapping",
            Lifecycle::Ready => "ready",
            Lifecycle::Busy => "busy",
            Lifecycle::Errored => "errored",
        }
    }
}

/// Observable state of a sandboxed surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSnapshot {
    pub lifecycle: Lifecycle,
    /// Output text or fault message of the latest run, or a placeholder
    pub output: String,
    /// Sequence number of the most recently completed run
    pub settled: Option<u64>,
}

impl SandboxSnapshot {
    fn bootstrapping() -> Self {
        Self {
            lifecycle: Lifecycle::Bootstrapping,
            output: LOADING_PLACEHOLDER.to_string(),
            settled: None,
        }
    }
}

/// Identifies a requested run. The automatic run is ticket 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RunTicket(pub u64);

/// The automatic run issued right after bootstrapping.
pub const AUTO_RUN: RunTicket = RunTicket(0);

#[derive(Debug, Clone)]
struct PendingRun {
    seq: u64,
    code: String,
}

/// Interactive surface backed by an isolated context.
pub struct SandboxSurface {
    request: ExecutionRequest,
    /// Editable buffer, shared with the driver for the automatic run.
    buffer: watch::Sender<String>,
    /// Latest requested run.
    runs: watch::Sender<Option<PendingRun>>,
    next_seq: u64,
    state: watch::Receiver<SandboxSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

impl SandboxSurface {
    /// Mount the surface: launch a context and start bootstrapping.
    ///
    /// A launch failure is logged and leaves the surface bootstrapping for
    /// good; there is no retry. Must be called from within a tokio runtime.
    pub fn mount(request: ExecutionRequest, launcher: &dyn ContextLauncher) -> Self {
        let (state_tx, state_rx) = watch::channel(SandboxSnapshot::bootstrapping());
        let (buffer_tx, buffer_rx) = watch::channel(request.code.clone());
        let (runs_tx, runs_rx) = watch::channel(None);

        let (shutdown, driver) = match launcher.launch() {
            Ok(context) => {
                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                let driver = Driver {
                    state: state_tx,
                    buffer: buffer_rx,
                    runs: runs_rx,
                    auto_run: !request.suppress_auto_run,
                };
                let handle = tokio::spawn(driver.drive(context, shutdown_rx));
                (Some(shutdown_tx), Some(handle))
            }
            Err(e) => {
                tracing::error!("Sandbox bootstrap failed: {}", e);
                (None, None)
            }
        };

        Self {
            request,
            buffer: buffer_tx,
            runs: runs_tx,
            next_seq: AUTO_RUN.0 + 1,
            state: state_rx,
            shutdown,
            driver,
        }
    }

    /// The request this surface was mounted with.
    pub fn request(&self) -> &ExecutionRequest {
        &self.request
    }

    /// Current editable code.
    pub fn code(&self) -> String {
        self.buffer.borrow().clone()
    }

    /// Replace the editable code. Never triggers a run.
    pub fn edit(&self, code: impl Into<String>) {
        self.buffer.send_replace(code.into());
    }

    /// Current state.
    pub fn snapshot(&self) -> SandboxSnapshot {
        self.state.borrow().clone()
    }

    /// Request a run of the current buffer.
    ///
    /// Rejected while bootstrapping, and once the context has gone away.
    /// While busy, the request replaces any other pending one and runs once
    /// the in-flight run completes.
    pub fn run(&mut self) -> Result<RunTicket> {
        if !self.state.borrow().lifecycle.accepts_runs() {
            return Err(Error::NotReady);
        }
        if self.driver.is_none() || self.is_closed() {
            return Err(Error::SurfaceClosed);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let code = self.code();
        self.runs.send_replace(Some(PendingRun { seq, code }));
        tracing::debug!("Requested run {}", seq);

        Ok(RunTicket(seq))
    }

    /// Whether the context has gone away. The last snapshot stays readable.
    pub fn is_closed(&self) -> bool {
        self.state.has_changed().is_err()
    }

    /// Drop a requested run that has not started yet.
    ///
    /// There is no mid-run abort: an in-flight run can only be abandoned by
    /// unmounting. A cancelled ticket settles only when a later run does.
    pub fn cancel(&self) {
        if self.runs.send_replace(None).is_some() {
            tracing::debug!("Cancelled pending run");
        }
    }

    /// Wait until the state satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SandboxSnapshot) -> bool,
    ) -> Result<SandboxSnapshot> {
        let mut state = self.state.clone();
        let snapshot = state
            .wait_for(predicate)
            .await
            .map_err(|_| Error::SurfaceClosed)?;
        Ok(snapshot.clone())
    }

    /// Wait until the run identified by `ticket` (or a later one that
    /// replaced it) has completed.
    pub async fn wait_settled(&self, ticket: RunTicket) -> Result<SandboxSnapshot> {
        self.wait_for(|s| s.settled.is_some_and(|seq| seq >= ticket.0)).await
    }

    /// Like [`wait_for`](Self::wait_for) with a deadline.
    pub async fn wait_for_timeout(
        &self,
        timeout: Duration,
        predicate: impl FnMut(&SandboxSnapshot) -> bool,
    ) -> Result<SandboxSnapshot> {
        tokio::time::timeout(timeout, self.wait_for(predicate))
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// HTML fragment: the editable code followed by the output panel.
    pub fn to_html(&self) -> String {
        let snapshot = self.snapshot();
        let output_class = match snapshot.lifecycle {
            Lifecycle::Errored => "sandbox-output sandbox-error",
            _ => "sandbox-output",
        };
        format!(
            "<div class=\"codefence-sandbox\" data-state=\"{}\">\n\
             <pre class=\"sandbox-editor\"><code>{}</code></pre>\n\
             <pre class=\"{}\">{}</pre>\n</div>",
            snapshot.lifecycle.as_str(),
            highlight(&self.request.language_tag, &self.code()),
            output_class,
            escape_html(&snapshot.output)
        )
    }

    /// Unmount: tear the context down regardless of state.
    ///
    /// In-flight runs are abandoned, not awaited.
    pub async fn unmount(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
        tracing::debug!("Sandbox surface unmounted");
    }
}

impl Drop for SandboxSurface {
    fn drop(&mut self) {
        // Aborting the driver drops the context, which stops its tasks and
        // kills any worker process.
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Task that owns the context and applies the state machine.
struct Driver {
    state: watch::Sender<SandboxSnapshot>,
    buffer: watch::Receiver<String>,
    runs: watch::Receiver<Option<PendingRun>>,
    auto_run: bool,
}

impl Driver {
    async fn drive(mut self, mut context: IsolatedContext, mut shutdown: oneshot::Receiver<()>) {
        let unmounted = tokio::select! {
            _ = &mut shutdown => true,
            _ = self.session(&mut context) => false,
        };

        if !unmounted {
            // The context went away on its own. Dropping the state sender
            // wakes every waiter and closes the surface to new runs; the
            // context itself is still torn down on unmount.
            tracing::warn!("Sandbox lost its isolated context");
            drop(self);
            let _ = shutdown.await;
        }

        context.shutdown().await;
    }

    async fn session(&mut self, context: &mut IsolatedContext) {
        if let Err(e) = context.send(ContextRequest::Init).await {
            tracing::error!("Failed to send init: {}", e);
            return;
        }

        loop {
            match context.recv().await {
                Some(ContextReply::Ready) => break,
                Some(other) => tracing::debug!("Ignoring {:?} while bootstrapping", other),
                None => {
                    tracing::warn!("Isolated context closed while bootstrapping");
                    return;
                }
            }
        }

        self.state.send_modify(|s| {
            s.lifecycle = Lifecycle::Ready;
            s.output.clear();
        });
        tracing::debug!("Sandbox ready");

        if self.auto_run {
            // A run requested in the meantime stays pending and follows this one
            let code = self.buffer.borrow().clone();
            if !self.execute(context, AUTO_RUN.0, code).await {
                return;
            }
        }

        loop {
            tokio::select! {
                changed = self.runs.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let pending = self.runs.borrow_and_update().clone();
                    let Some(PendingRun { seq, code }) = pending else {
                        continue;
                    };
                    if !self.execute(context, seq, code).await {
                        return;
                    }
                }
                reply = context.recv() => match reply {
                    Some(other) => tracing::debug!("Ignoring {:?} while idle", other),
                    None => {
                        tracing::warn!("Isolated context closed while idle");
                        return;
                    }
                },
            }
        }
    }

    /// Run one request to completion. Returns `false` if the context is gone.
    async fn execute(&mut self, context: &mut IsolatedContext, seq: u64, code: String) -> bool {
        self.state.send_modify(|s| {
            s.lifecycle = Lifecycle::Busy;
            s.output = RUNNING_PLACEHOLDER.to_string();
        });

        if let Err(e) = context.send(ContextRequest::Run { code }).await {
            tracing::warn!("Failed to send run {}: {}", seq, e);
            self.settle(seq, Lifecycle::Errored, CONTEXT_LOST_MESSAGE.to_string());
            return false;
        }

        loop {
            match context.recv().await {
                Some(ContextReply::Result { output }) => {
                    let output = if output.is_empty() {
                        NO_OUTPUT_PLACEHOLDER.to_string()
                    } else {
                        output
                    };
                    self.settle(seq, Lifecycle::Ready, output);
                    return true;
                }
                Some(ContextReply::Error { message }) => {
                    tracing::debug!("Run {} raised: {}", seq, message);
                    self.settle(seq, Lifecycle::Errored, message);
                    return true;
                }
                Some(other) => tracing::debug!("Ignoring {:?} while busy", other),
                None => {
                    tracing::warn!("Isolated context closed during run {}", seq);
                    self.settle(seq, Lifecycle::Errored, CONTEXT_LOST_MESSAGE.to_string());
                    return false;
                }
            }
        }
    }

    fn settle(&self, seq: u64, lifecycle: Lifecycle, output: String) {
        self.state.send_modify(|s| {
            s.lifecycle = lifecycle;
            s.output = output;
            s.settled = Some(seq);
        });
    }
}
