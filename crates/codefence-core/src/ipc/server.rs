//! Context-side request handling.
//!
//! [`ContextServer`] is the state machine that lives inside an isolated
//! context. It is transport-agnostic: the worker binary feeds it frames from
//! stdin, in-process contexts feed it from a channel.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};

use super::protocol::{ContextReply, ContextRequest, read_message, write_message};

/// An interpreter runtime that can be loaded once and then run code.
pub trait Interpreter: Send + 'static {
    /// Load the runtime. Called at most once per successful load.
    fn load(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Run code, returning captured standard output or the fault's message.
    fn run(&mut self, code: &str) -> impl Future<Output = std::result::Result<String, String>> + Send;
}

/// Handles protocol requests on behalf of one interpreter.
pub struct ContextServer<I> {
    interpreter: I,
    loaded: bool,
}

impl<I: Interpreter> ContextServer<I> {
    /// Create a server; the interpreter is not loaded until `init`.
    pub fn new(interpreter: I) -> Self {
        Self {
            interpreter,
            loaded: false,
        }
    }

    /// Whether the runtime has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Handle one request, returning the reply to send (if any).
    ///
    /// - `init` loads the runtime on first use and answers `ready`; a failed
    ///   load answers nothing, leaving the host bootstrapping.
    /// - `run` before a successful load is dropped.
    /// - Unknown requests are dropped.
    pub async fn handle(&mut self, request: ContextRequest) -> Option<ContextReply> {
        match request {
            ContextRequest::Init => {
                if !self.loaded {
                    if let Err(e) = self.interpreter.load().await {
                        tracing::error!("Interpreter failed to load: {}", e);
                        return None;
                    }
                    self.loaded = true;
                    tracing::debug!("Interpreter loaded");
                }
                Some(ContextReply::Ready)
            }
            ContextRequest::Run { code } => {
                if !self.loaded {
                    tracing::debug!("Ignoring run before init");
                    return None;
                }
                match self.interpreter.run(&code).await {
                    Ok(output) => Some(ContextReply::Result { output }),
                    Err(message) => Some(ContextReply::Error { message }),
                }
            }
            ContextRequest::Unknown => {
                tracing::debug!("Ignoring unknown request");
                None
            }
        }
    }

    /// Answer framed requests from `reader` until it reaches end of stream.
    ///
    /// A frame that does not decode is logged and skipped; only a broken
    /// stream ends the session with an error.
    pub async fn serve_stream<R, W>(&mut self, reader: &mut R, writer: &mut W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let request = match read_message::<_, ContextRequest>(reader).await {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(Error::Serialization(e)) => {
                    tracing::warn!("Dropping malformed request: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(reply) = self.handle(request).await {
                write_message(writer, &reply).await?;
            }
        }
    }
}
