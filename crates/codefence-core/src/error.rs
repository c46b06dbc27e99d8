//! Error types for codefence-core.

use thiserror::Error;

/// Result type for codefence-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in codefence-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read or parse a content document.
    #[error("document error: {0}")]
    Document(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IPC communication error with an isolated context.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// The isolated context could not be started.
    #[error("failed to launch isolated context: {0}")]
    Launch(String),

    /// The interpreter runtime inside the isolated context failed to load.
    #[error("interpreter unavailable: {0}")]
    Interpreter(String),

    /// A run was requested before the surface finished bootstrapping.
    #[error("surface is still bootstrapping")]
    NotReady,

    /// The surface was unmounted or its context went away.
    #[error("surface closed")]
    SurfaceClosed,

    /// Waiting on a surface exceeded the caller's deadline.
    #[error("timed out waiting for surface")]
    Timeout,
}

impl Error {
    /// Format the error together with a short recovery hint.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::Launch(_) => Some(
                "Build the worker with `cargo build -p codefence-worker` or set CODEFENCE_WORKER_PATH.",
            ),
            Error::Interpreter(_) => {
                Some("Install python3 or point CODEFENCE_PYTHON at an interpreter.")
            }
            Error::Timeout => Some("Raise --timeout-ms; a hung block stays busy until unmounted."),
            Error::Document(_) => Some("Check that the file exists and is UTF-8 markdown."),
            _ => None,
        };

        match hint {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }
}
