//! Wire types exchanged between worker, master and the launching CLI.

use std::io;

use serde::{Deserialize, Serialize};

/// One IPC message; serialized as a single JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IpcMessage {
    Error { data: ErrorInfo },
    Info { name: InfoName, message: String },
}

impl IpcMessage {
    pub fn ready(message: impl Into<String>) -> Self {
        IpcMessage::Info {
            name: InfoName::Ready,
            message: message.into(),
        }
    }

    pub fn restart(message: impl Into<String>) -> Self {
        IpcMessage::Info {
            name: InfoName::Restart,
            message: message.into(),
        }
    }

    pub fn error(data: ErrorInfo) -> Self {
        IpcMessage::Error { data }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InfoName {
    Ready,
    Restart,
}

/// Error details in the shape of a system error: a symbolic code plus whatever
/// context the failing call had.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syscall: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn from_io(err: &io::Error, syscall: &str) -> Self {
        Self {
            code: io_error_code(err).to_string(),
            errno: err.raw_os_error(),
            syscall: Some(syscall.to_string()),
            message: Some(err.to_string()),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Symbolic errno name for an I/O error.
pub fn io_error_code(err: &io::Error) -> &'static str {
    if let Some(errno) = err.raw_os_error() {
        match errno {
            libc::EADDRINUSE => return "EADDRINUSE",
            libc::EADDRNOTAVAIL => return "EADDRNOTAVAIL",
            libc::EACCES => return "EACCES",
            libc::EPERM => return "EPERM",
            libc::EINVAL => return "EINVAL",
            libc::ENOMEM => return "ENOMEM",
            libc::ENOENT => return "ENOENT",
            libc::ECONNREFUSED => return "ECONNREFUSED",
            libc::ETIMEDOUT => return "ETIMEDOUT",
            libc::ESRCH => return "ESRCH",
            _ => {}
        }
    }
    match err.kind() {
        io::ErrorKind::AddrInUse => "EADDRINUSE",
        io::ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        io::ErrorKind::PermissionDenied => "EACCES",
        io::ErrorKind::InvalidInput => "EINVAL",
        io::ErrorKind::OutOfMemory => "ENOMEM",
        io::ErrorKind::NotFound => "ENOENT",
        io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
        io::ErrorKind::TimedOut => "ETIMEDOUT",
        _ => "EIO",
    }
}
