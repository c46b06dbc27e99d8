//! Lifecycle tests for sandboxed surfaces.
//!
//! Most tests play the isolated context by hand through
//! `IsolatedContext::pair`, so every message the surface sends is visible
//! and every reply is under the test's control.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use codefence_core::error::{Error, Result};
use codefence_core::ipc::{
    ContextEndpoint, ContextLauncher, ContextReply, ContextRequest, InProcessLauncher,
    Interpreter, IsolatedContext,
};
use codefence_core::sandbox::{
    AUTO_RUN, CONTEXT_LOST_MESSAGE, ExecutionRequest, LOADING_PLACEHOLDER, Lifecycle,
    NO_OUTPUT_PLACEHOLDER, RUNNING_PLACEHOLDER, RunTicket, SandboxSurface,
};
use tokio::sync::mpsc;

// =============================================================================
// Test Helpers
// =============================================================================

/// Hands every launched context's endpoint to the test.
struct ScriptedLauncher {
    endpoints: mpsc::UnboundedSender<ContextEndpoint>,
}

impl ScriptedLauncher {
    fn new() -> (Self, mpsc::UnboundedReceiver<ContextEndpoint>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { endpoints: tx }, rx)
    }
}

impl ContextLauncher for ScriptedLauncher {
    fn launch(&self) -> Result<IsolatedContext> {
        let (context, endpoint) = IsolatedContext::pair();
        self.endpoints
            .send(endpoint)
            .map_err(|_| Error::Launch("test dropped the endpoint receiver".into()))?;
        Ok(context)
    }
}

struct FailingLauncher;

impl ContextLauncher for FailingLauncher {
    fn launch(&self) -> Result<IsolatedContext> {
        Err(Error::Launch("no worker".into()))
    }
}

async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

/// Assert the context receives nothing for a short while.
async fn assert_quiet(endpoint: &mut ContextEndpoint) {
    let next = tokio::time::timeout(Duration::from_millis(100), endpoint.requests.recv()).await;
    assert!(next.is_err(), "unexpected request: {:?}", next);
}

fn request(code: &str, suppress_auto_run: bool) -> ExecutionRequest {
    ExecutionRequest {
        code: code.to_string(),
        language_tag: "python".to_string(),
        suppress_auto_run,
    }
}

/// Complete the init handshake from the context side.
async fn handshake(endpoint: &mut ContextEndpoint) {
    assert_eq!(within(endpoint.requests.recv()).await, Some(ContextRequest::Init));
    endpoint.replies.send(ContextReply::Ready).await.unwrap();
}

async fn expect_run(endpoint: &mut ContextEndpoint) -> String {
    match within(endpoint.requests.recv()).await {
        Some(ContextRequest::Run { code }) => code,
        other => panic!("expected run, got {:?}", other),
    }
}

// =============================================================================
// Bootstrapping and auto-run
// =============================================================================

#[tokio::test]
async fn test_bootstrap_then_auto_run() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let surface = SandboxSurface::mount(request("print(1)", false), &launcher);

    let snapshot = surface.snapshot();
    assert_eq!(snapshot.lifecycle, Lifecycle::Bootstrapping);
    assert_eq!(snapshot.output, LOADING_PLACEHOLDER);

    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;

    assert_eq!(expect_run(&mut endpoint).await, "print(1)");
    let busy = within(surface.wait_for(|s| s.lifecycle == Lifecycle::Busy)).await.unwrap();
    assert_eq!(busy.output, RUNNING_PLACEHOLDER);

    endpoint
        .replies
        .send(ContextReply::Result { output: "1\n".into() })
        .await
        .unwrap();

    let settled = within(surface.wait_settled(AUTO_RUN)).await.unwrap();
    assert_eq!(settled.lifecycle, Lifecycle::Ready);
    assert_eq!(settled.output, "1\n");

    surface.unmount().await;
}

#[tokio::test]
async fn test_suppressed_auto_run_waits_for_user() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let mut surface = SandboxSurface::mount(request("print('later')", true), &launcher);

    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;

    let ready = within(surface.wait_for(|s| s.lifecycle == Lifecycle::Ready)).await.unwrap();
    assert_eq!(ready.output, "");
    assert_eq!(ready.settled, None);
    assert_quiet(&mut endpoint).await;

    let ticket = surface.run().unwrap();
    assert_eq!(expect_run(&mut endpoint).await, "print('later')");
    endpoint
        .replies
        .send(ContextReply::Result { output: "later\n".into() })
        .await
        .unwrap();

    let settled = within(surface.wait_settled(ticket)).await.unwrap();
    assert_eq!(settled.output, "later\n");
}

#[tokio::test]
async fn test_run_rejected_while_bootstrapping() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let mut surface = SandboxSurface::mount(request("x = 1", true), &launcher);

    assert!(matches!(surface.run(), Err(Error::NotReady)));

    let mut endpoint = within(endpoints.recv()).await.unwrap();
    assert_eq!(within(endpoint.requests.recv()).await, Some(ContextRequest::Init));
    assert_quiet(&mut endpoint).await;
}

#[tokio::test]
async fn test_single_init_per_mount() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let mut surface = SandboxSurface::mount(request("a", false), &launcher);
    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;

    let mut seen = Vec::new();
    seen.push(expect_run(&mut endpoint).await);
    endpoint.replies.send(ContextReply::Result { output: "a".into() }).await.unwrap();
    within(surface.wait_settled(AUTO_RUN)).await.unwrap();

    for code in ["b", "c"] {
        surface.edit(code);
        let ticket = surface.run().unwrap();
        seen.push(expect_run(&mut endpoint).await);
        endpoint
            .replies
            .send(ContextReply::Result { output: code.into() })
            .await
            .unwrap();
        within(surface.wait_settled(ticket)).await.unwrap();
    }

    // Every request after the handshake was a run
    assert_eq!(seen, vec!["a", "b", "c"]);
    assert_quiet(&mut endpoint).await;
}

// =============================================================================
// Results and faults
// =============================================================================

#[tokio::test]
async fn test_empty_output_placeholder() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let surface = SandboxSurface::mount(request("x = 1", false), &launcher);
    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;

    expect_run(&mut endpoint).await;
    endpoint
        .replies
        .send(ContextReply::Result { output: String::new() })
        .await
        .unwrap();

    let settled = within(surface.wait_settled(AUTO_RUN)).await.unwrap();
    assert_eq!(settled.output, NO_OUTPUT_PLACEHOLDER);
}

#[tokio::test]
async fn test_fault_leaves_session_usable() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let mut surface = SandboxSurface::mount(request("1 / 0", false), &launcher);
    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;

    expect_run(&mut endpoint).await;
    endpoint
        .replies
        .send(ContextReply::Error {
            message: "ZeroDivisionError: division by zero".into(),
        })
        .await
        .unwrap();

    let errored = within(surface.wait_settled(AUTO_RUN)).await.unwrap();
    assert_eq!(errored.lifecycle, Lifecycle::Errored);
    assert_eq!(errored.output, "ZeroDivisionError: division by zero");
    assert!(surface.to_html().contains("sandbox-output sandbox-error"));

    surface.edit("print('ok')");
    let ticket = surface.run().unwrap();
    assert_eq!(expect_run(&mut endpoint).await, "print('ok')");
    endpoint
        .replies
        .send(ContextReply::Result { output: "ok\n".into() })
        .await
        .unwrap();

    let recovered = within(surface.wait_settled(ticket)).await.unwrap();
    assert_eq!(recovered.lifecycle, Lifecycle::Ready);
    assert_eq!(recovered.output, "ok\n");
}

#[tokio::test]
async fn test_unknown_replies_are_ignored() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let surface = SandboxSurface::mount(request("print(2)", false), &launcher);
    let mut endpoint = within(endpoints.recv()).await.unwrap();

    assert_eq!(within(endpoint.requests.recv()).await, Some(ContextRequest::Init));
    endpoint.replies.send(ContextReply::Unknown).await.unwrap();
    endpoint.replies.send(ContextReply::Ready).await.unwrap();

    expect_run(&mut endpoint).await;
    endpoint.replies.send(ContextReply::Unknown).await.unwrap();
    endpoint
        .replies
        .send(ContextReply::Result { output: "2\n".into() })
        .await
        .unwrap();

    let settled = within(surface.wait_settled(AUTO_RUN)).await.unwrap();
    assert_eq!(settled.output, "2\n");
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_latest_request_wins_while_busy() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let mut surface = SandboxSurface::mount(request("", true), &launcher);
    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;
    within(surface.wait_for(|s| s.lifecycle == Lifecycle::Ready)).await.unwrap();

    surface.edit("A");
    let first = surface.run().unwrap();
    assert_eq!(expect_run(&mut endpoint).await, "A");

    // Two more requests arrive before A is answered
    surface.edit("B");
    surface.run().unwrap();
    surface.edit("C");
    let last = surface.run().unwrap();
    assert!(last > first);

    endpoint.replies.send(ContextReply::Result { output: "A".into() }).await.unwrap();

    // B was replaced by C; C only goes out after A's reply
    assert_eq!(expect_run(&mut endpoint).await, "C");
    endpoint.replies.send(ContextReply::Result { output: "C".into() }).await.unwrap();

    let settled = within(surface.wait_settled(last)).await.unwrap();
    assert_eq!(settled.settled, Some(last.0));
    assert_eq!(settled.output, "C");
    assert_quiet(&mut endpoint).await;
}

#[tokio::test]
async fn test_cancel_drops_pending_run() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let mut surface = SandboxSurface::mount(request("", true), &launcher);
    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;
    within(surface.wait_for(|s| s.lifecycle == Lifecycle::Ready)).await.unwrap();

    surface.edit("A");
    let first = surface.run().unwrap();
    assert_eq!(expect_run(&mut endpoint).await, "A");

    surface.edit("B");
    surface.run().unwrap();
    surface.cancel();

    endpoint.replies.send(ContextReply::Result { output: "A".into() }).await.unwrap();
    let settled = within(surface.wait_settled(first)).await.unwrap();
    assert_eq!(settled.output, "A");
    assert_quiet(&mut endpoint).await;
}

#[tokio::test]
async fn test_edits_never_trigger_runs() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let surface = SandboxSurface::mount(request("x", true), &launcher);
    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;
    within(surface.wait_for(|s| s.lifecycle == Lifecycle::Ready)).await.unwrap();

    surface.edit("y");
    surface.edit("z");
    assert_eq!(surface.code(), "z");
    assert_eq!(surface.request().code, "x");
    assert_quiet(&mut endpoint).await;
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn test_unmount_mid_run_then_remount_is_fresh() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let surface = SandboxSurface::mount(request("while True: pass", false), &launcher);
    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;
    expect_run(&mut endpoint).await;
    within(surface.wait_for(|s| s.lifecycle == Lifecycle::Busy)).await.unwrap();

    // Never answered: unmount must not wait for the run
    within(surface.unmount()).await;
    assert_eq!(within(endpoint.requests.recv()).await, None);
    assert!(endpoint.replies.send(ContextReply::Ready).await.is_err());

    let surface = SandboxSurface::mount(request("print(3)", false), &launcher);
    let snapshot = surface.snapshot();
    assert_eq!(snapshot.lifecycle, Lifecycle::Bootstrapping);
    assert_eq!(snapshot.settled, None);

    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;
    assert_eq!(expect_run(&mut endpoint).await, "print(3)");
}

#[tokio::test]
async fn test_drop_releases_context() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let surface = SandboxSurface::mount(request("x", true), &launcher);
    let mut endpoint = within(endpoints.recv()).await.unwrap();
    assert_eq!(within(endpoint.requests.recv()).await, Some(ContextRequest::Init));

    drop(surface);
    assert_eq!(within(endpoint.requests.recv()).await, None);
}

#[tokio::test]
async fn test_launch_failure_stays_bootstrapping() {
    let mut surface = SandboxSurface::mount(request("print(1)", false), &FailingLauncher);

    assert_eq!(surface.snapshot().lifecycle, Lifecycle::Bootstrapping);
    assert!(matches!(surface.run(), Err(Error::NotReady)));

    let waited = surface
        .wait_for_timeout(Duration::from_millis(100), |s| s.lifecycle == Lifecycle::Ready)
        .await;
    assert!(matches!(waited, Err(Error::Timeout) | Err(Error::SurfaceClosed)));

    let html = surface.to_html();
    assert!(html.contains("data-state=\"bootstrapping\""));
    assert!(html.contains(LOADING_PLACEHOLDER));
}

#[tokio::test]
async fn test_context_lost_during_bootstrap() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let surface = SandboxSurface::mount(request("print(1)", false), &launcher);
    let endpoint = within(endpoints.recv()).await.unwrap();
    drop(endpoint);

    let waited = surface
        .wait_for_timeout(Duration::from_millis(100), |s| s.lifecycle == Lifecycle::Ready)
        .await;
    assert!(waited.is_err());
    assert_eq!(surface.snapshot().output, LOADING_PLACEHOLDER);
    surface.unmount().await;
}

#[tokio::test]
async fn test_context_lost_while_idle_closes_surface() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let mut surface = SandboxSurface::mount(request("", true), &launcher);
    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;
    within(surface.wait_for(|s| s.lifecycle == Lifecycle::Ready)).await.unwrap();

    drop(endpoint);

    // Waiters wake instead of hanging on a context that will never answer
    let waited = within(surface.wait_settled(RunTicket(1))).await;
    assert!(matches!(waited, Err(Error::SurfaceClosed)));
    assert!(surface.is_closed());
    assert!(matches!(surface.run(), Err(Error::SurfaceClosed)));

    // The last state stays readable until unmount
    assert_eq!(surface.snapshot().lifecycle, Lifecycle::Ready);
    within(surface.unmount()).await;
}

#[tokio::test]
async fn test_context_lost_mid_run_settles_as_fault() {
    let (launcher, mut endpoints) = ScriptedLauncher::new();
    let mut surface = SandboxSurface::mount(request("print(1)", false), &launcher);
    let mut endpoint = within(endpoints.recv()).await.unwrap();
    handshake(&mut endpoint).await;
    expect_run(&mut endpoint).await;
    within(surface.wait_for(|s| s.lifecycle == Lifecycle::Busy)).await.unwrap();

    drop(endpoint);

    let settled = within(surface.wait_settled(AUTO_RUN)).await.unwrap();
    assert_eq!(settled.lifecycle, Lifecycle::Errored);
    assert_eq!(settled.output, CONTEXT_LOST_MESSAGE);
    assert!(matches!(surface.run(), Err(Error::SurfaceClosed)));
    assert!(surface.to_html().contains("sandbox-error"));
    within(surface.unmount()).await;
}

// =============================================================================
// In-process context
// =============================================================================

/// Echoes code back, counting loads across all instances.
struct CountingEcho {
    loads: Arc<AtomicUsize>,
}

impl Interpreter for CountingEcho {
    async fn load(&mut self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run(&mut self, code: &str) -> std::result::Result<String, String> {
        match code.strip_prefix("fail:") {
            Some(message) => Err(message.to_string()),
            None => Ok(format!("ran {}", code)),
        }
    }
}

#[tokio::test]
async fn test_in_process_context_per_surface() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let launcher = InProcessLauncher::new(move || CountingEcho {
        loads: counter.clone(),
    });

    let first = SandboxSurface::mount(request("one", false), &launcher);
    let second = SandboxSurface::mount(request("fail:two", false), &launcher);

    let a = within(first.wait_settled(AUTO_RUN)).await.unwrap();
    let b = within(second.wait_settled(AUTO_RUN)).await.unwrap();

    assert_eq!(a.output, "ran one");
    assert_eq!(a.lifecycle, Lifecycle::Ready);
    assert_eq!(b.output, "two");
    assert_eq!(b.lifecycle, Lifecycle::Errored);

    // Each surface owns its own context
    assert_eq!(loads.load(Ordering::SeqCst), 2);

    first.unmount().await;
    second.unmount().await;
}
