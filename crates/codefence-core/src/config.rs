//! Runtime configuration for hosts that mount code block surfaces.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Environment variable naming the worker binary.
pub const WORKER_PATH_ENV: &str = "CODEFENCE_WORKER_PATH";

/// Environment variable naming the python program used inside the worker.
pub const PYTHON_ENV: &str = "CODEFENCE_PYTHON";

/// Environment variable overriding the settle timeout, in milliseconds.
pub const SETTLE_TIMEOUT_ENV: &str = "CODEFENCE_SETTLE_TIMEOUT_MS";

const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 30_000;

/// Host-side configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Explicit path to the `codefence-worker` binary.
    pub worker_path: Option<PathBuf>,
    /// Python program the worker should execute code with.
    pub python: Option<String>,
    /// How long `settle` waits for auto-runs and diagram renders.
    pub settle_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_path: None,
            python: None,
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
        }
    }
}

impl RuntimeConfig {
    /// Build a configuration from `CODEFENCE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(WORKER_PATH_ENV) {
            config.worker_path = Some(PathBuf::from(path));
        }
        if let Ok(python) = std::env::var(PYTHON_ENV)
            && !python.trim().is_empty()
        {
            config.python = Some(python);
        }
        if let Ok(raw) = std::env::var(SETTLE_TIMEOUT_ENV) {
            match raw.parse::<u64>() {
                Ok(ms) => config.settle_timeout_ms = ms,
                Err(e) => tracing::warn!("Ignoring {}={}: {}", SETTLE_TIMEOUT_ENV, raw, e),
            }
        }

        config
    }

    /// Settle timeout as a `Duration`.
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}
