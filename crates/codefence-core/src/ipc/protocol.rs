//! IPC protocol messages for isolated execution contexts.
//!
//! Uses length-prefixed JSON messages over a byte stream.
//! Format: 4-byte length (u32 LE) + JSON-encoded message.
//!
//! The message shapes are the whole contract:
//!
//! | Direction | Message | Reply |
//! |---|---|---|
//! | host → context | `{"type":"init"}` | `{"type":"ready"}` |
//! | host → context | `{"type":"run","code":"…"}` | `{"type":"result","output":"…"}` or `{"type":"error","message":"…"}` |
//!
//! Unrecognised `type`s decode to `Unknown` and are ignored by both ends.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Largest frame either side will accept.
const MAX_MESSAGE_LEN: usize = 100 * 1024 * 1024;

/// Request sent from the host to an isolated context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContextRequest {
    /// Load the interpreter runtime.
    Init,

    /// Execute code.
    Run {
        /// Source to execute.
        code: String,
    },

    /// Any message kind this version does not know.
    #[serde(other)]
    Unknown,
}

/// Reply sent from an isolated context to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContextReply {
    /// The interpreter runtime is loaded.
    Ready,

    /// Execution finished; captured standard output.
    Result {
        /// Captured standard output, possibly empty.
        output: String,
    },

    /// Execution raised.
    Error {
        /// The fault's message.
        message: String,
    },

    /// Any message kind this version does not know.
    #[serde(other)]
    Unknown,
}

/// Write a message using length-prefixed JSON encoding.
pub async fn write_message<W, M>(writer: &mut W, message: &M) -> Result<()>
where
    W: AsyncWrite + Unpin,
    M: Serialize,
{
    let bytes = serde_json::to_vec(message)
        .map_err(|e| Error::Serialization(format!("Failed to encode IPC message: {}", e)))?;

    let len = u32::try_from(bytes.len())
        .map_err(|_| Error::Ipc(format!("IPC message too large: {} bytes", bytes.len())))?;
    writer
        .write_all(&len.to_le_bytes())
        .await
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {}", e)))?;
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {}", e)))?;

    Ok(())
}

/// Read a message using length-prefixed JSON encoding.
///
/// Returns `Ok(None)` on a clean end of stream before a new frame starts.
pub async fn read_message<R, M>(reader: &mut R) -> Result<Option<M>>
where
    R: AsyncRead + Unpin,
    M: for<'de> Deserialize<'de>,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(Error::Ipc(format!("Failed to read IPC message length: {}", e)));
        }
    }
    let len = u32::from_le_bytes(len_bytes) as usize;

    // Sanity check: reject absurdly large messages
    if len > MAX_MESSAGE_LEN {
        return Err(Error::Ipc(format!("IPC message too large: {} bytes", len)));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {}", e)))?;

    let message = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Serialization(format!("Failed to decode IPC message: {}", e)))?;

    Ok(Some(message))
}
