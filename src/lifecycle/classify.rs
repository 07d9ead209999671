//! Worker error classification.
//!
//! Decides whether an error reported by a worker takes the whole process group
//! down or only the worker that sent it.

use crate::ipc::ErrorInfo;

/// Prefix of every fatal message surfaced to the launching process.
pub const STARTUP_FAILED: &str = "REX-STARTUP-FAILED";

/// Worker error codes produced by the TLS loader start with this.
const TLS_CODE_PREFIX: &str = "ERR_TLS_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    Port,
    Memory,
    Tls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// Stop everything; `message` is human readable.
    Fatal { kind: FatalKind, message: String },
    /// Kill the offending worker and let it respawn.
    Recoverable,
}

pub fn classify(error: &ErrorInfo) -> ErrorClass {
    if let Some(message) = port_error(error) {
        return ErrorClass::Fatal {
            kind: FatalKind::Port,
            message,
        };
    }
    if error.code == "ENOMEM" {
        return ErrorClass::Fatal {
            kind: FatalKind::Memory,
            message: "Out of memory".to_string(),
        };
    }
    if let Some(message) = tls_error(error) {
        return ErrorClass::Fatal {
            kind: FatalKind::Tls,
            message,
        };
    }
    ErrorClass::Recoverable
}

fn port_error(error: &ErrorInfo) -> Option<String> {
    let port = || error.port.map(|p| p.to_string()).unwrap_or_default();
    match error.code.as_str() {
        "EADDRINUSE" => Some(format!("Port {} is already in use", port())),
        "EACCES" if error.port.is_some() => Some(format!("Permission denied on port {}", port())),
        "EADDRNOTAVAIL" => Some(format!(
            "Address {} not available",
            error.address.as_deref().unwrap_or("(unknown)")
        )),
        "EINVAL" => Some("Invalid port or address".to_string()),
        _ => None,
    }
}

fn tls_error(error: &ErrorInfo) -> Option<String> {
    let path = error.path.as_deref();
    match (error.code.as_str(), path) {
        ("ENOENT", Some(path)) => Some(format!("SSL file not found: {}", path)),
        ("EACCES", Some(path)) => Some(format!("Permission denied reading SSL file: {}", path)),
        ("ERR_TLS_ENCRYPTED_KEY", _) => Some("SSL key is passphrase protected".to_string()),
        ("ERR_TLS_KEY_MISMATCH", _) => Some("SSL certificate and key do not match".to_string()),
        (code, _) if code.starts_with(TLS_CODE_PREFIX) => Some("Malformed SSL certificate or key".to_string()),
        _ => None,
    }
}

/// Text of the error message forwarded to the launching process.
pub fn startup_failed_message(detail: &str) -> String {
    format!("{}\n>{}", STARTUP_FAILED, detail)
}
