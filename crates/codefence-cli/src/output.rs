//! Writing command output.

use std::fs;
use std::io::{self, Write};

/// Write `content` to `path`, or to stdout when no path is given.
pub fn emit(content: &str, path: Option<&str>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            fs::write(path, content)?;
            eprintln!("Wrote {}", path);
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            if !content.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}
