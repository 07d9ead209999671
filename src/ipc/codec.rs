//! Newline-delimited JSON framing for [`IpcMessage`].

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::ipc::message::IpcMessage;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("failed to encode IPC message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed IPC line `{line}`: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("IPC channel I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub fn encode(message: &IpcMessage) -> Result<String, IpcError> {
    let mut line = serde_json::to_string(message).map_err(IpcError::Encode)?;
    line.push('\n');
    Ok(line)
}

pub fn decode(line: &str) -> Result<IpcMessage, IpcError> {
    serde_json::from_str(line.trim()).map_err(|source| IpcError::Decode {
        line: line.trim().to_string(),
        source,
    })
}

/// Synchronous sender. Usable from a panic hook, where no runtime can be assumed.
#[derive(Clone)]
pub struct IpcSender {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl IpcSender {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn send(&self, message: &IpcMessage) -> Result<(), IpcError> {
        let line = encode(message)?;
        // a panic while holding the lock must not silence later reports
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(line.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for IpcSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcSender").finish_non_exhaustive()
    }
}

/// Reads one message per line from an async stream.
pub struct IpcReader<R> {
    inner: R,
    buf: String,
}

impl<R: AsyncBufRead + Unpin> IpcReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: String::new(),
        }
    }

    /// Next message, `Ok(None)` at end of stream. Blank lines are skipped.
    pub async fn next_message(&mut self) -> Result<Option<IpcMessage>, IpcError> {
        loop {
            self.buf.clear();
            if self.inner.read_line(&mut self.buf).await? == 0 {
                return Ok(None);
            }
            if self.buf.trim().is_empty() {
                continue;
            }
            return decode(&self.buf).map(Some);
        }
    }
}
