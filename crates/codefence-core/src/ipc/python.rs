//! CPython-backed interpreter used inside the worker process.
//!
//! Each run executes in a fresh interpreter process: standard output is
//! captured, and a non-zero exit turns the interpreter's stderr (the
//! traceback) into the fault message.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};

use super::process::kill_with_parent;
use super::server::Interpreter;

/// Program names tried when no interpreter is configured.
const CANDIDATES: [&str; 2] = ["python3", "python"];

/// Runs code with a system python.
pub struct PythonInterpreter {
    /// Configured program name or path.
    requested: Option<String>,
    /// Resolved program, set by `load`.
    program: Option<PathBuf>,
}

impl PythonInterpreter {
    /// Create an interpreter that will resolve `program` (or the defaults) on load.
    pub fn new(program: Option<String>) -> Self {
        Self {
            requested: program,
            program: None,
        }
    }

    fn resolve(&self) -> Result<PathBuf> {
        if let Some(requested) = &self.requested {
            return which::which(requested)
                .map_err(|e| Error::Interpreter(format!("'{}' not found: {}", requested, e)));
        }

        CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| Error::Interpreter("no python3 or python on PATH".to_string()))
    }
}

impl Interpreter for PythonInterpreter {
    async fn load(&mut self) -> Result<()> {
        let program = self.resolve()?;

        // Verify the runtime actually starts
        let status = Command::new(&program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::Interpreter(format!("failed to start {}: {}", program.display(), e)))?;

        if !status.success() {
            return Err(Error::Interpreter(format!(
                "{} --version exited with {}",
                program.display(),
                status
            )));
        }

        tracing::debug!("Using python at {}", program.display());
        self.program = Some(program);
        Ok(())
    }

    async fn run(&mut self, code: &str) -> std::result::Result<String, String> {
        let Some(program) = &self.program else {
            return Err("python runtime is not loaded".to_string());
        };

        // `-` reads the program from stdin; `-u` keeps output unbuffered
        let mut command = Command::new(program);
        command
            .args(["-u", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        kill_with_parent(&mut command);

        let mut child = command
            .spawn()
            .map_err(|e| format!("failed to start python: {}", e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(|e| format!("failed to send code to python: {}", e))?;
            // Dropping stdin closes it so python sees EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("failed to wait for python: {}", e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                Err(format!("python exited with {}", output.status))
            } else {
                Err(stderr)
            }
        }
    }
}
