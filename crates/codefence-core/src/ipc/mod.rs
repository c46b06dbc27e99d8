//! Inter-process communication with isolated execution contexts.
//!
//! This module provides the protocol spoken between a sandboxed surface and
//! its execution context, the host-side channel handle, launchers that
//! create contexts, and the context-side request handler.

mod context;
mod process;
pub mod protocol;
pub mod python;
mod server;

pub use context::{ContextEndpoint, ContextLauncher, InProcessLauncher, IsolatedContext, WorkerLauncher};
pub use protocol::{ContextReply, ContextRequest, read_message, write_message};
pub use python::PythonInterpreter;
pub use server::{ContextServer, Interpreter};
