//! TCP listener shared between worker processes.
//!
//! # Responsibilities
//! - Bind to the configured address with `SO_REUSEPORT`, so every worker
//!   process can own a socket on the same port and the kernel spreads connections
//! - Report bind failures with enough context for the master to classify them
//! - Let the master check, before forking, that no other process already
//!   listens on a port (a reuse-port bind alone would silently share it)

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};

use crate::ipc::message::ErrorInfo;

const BACKLOG: u32 = 1024;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl ListenerError {
    pub fn to_error_info(&self) -> ErrorInfo {
        match self {
            ListenerError::Bind { addr, source } => ErrorInfo::from_io(source, "listen")
                .with_port(addr.port())
                .with_address(addr.ip().to_string()),
        }
    }
}

/// Bind `addr` once without `SO_REUSEPORT` and release it again.
///
/// Fails with `EADDRINUSE` when any socket already listens there, whether or
/// not that socket opted into port sharing.
pub fn ensure_available(addr: SocketAddr) -> Result<(), ListenerError> {
    std::net::TcpListener::bind(addr)
        .map(drop)
        .map_err(|source| ListenerError::Bind { addr, source })
}

/// A bound listening socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind `addr`. Must be called from within a Tokio runtime.
    pub fn bind(addr: SocketAddr) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;

        socket.set_reuseaddr(true).map_err(bind_err)?;
        #[cfg(unix)]
        socket.set_reuseport(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;

        let inner = socket.listen(BACKLOG).map_err(bind_err)?;
        let local_addr = inner.local_addr().map_err(bind_err)?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn into_tokio(self) -> TcpListener {
        self.inner
    }

    /// Blocking-API handle, as `axum-server` expects for TLS listeners.
    pub fn into_std(self) -> Result<std::net::TcpListener, ListenerError> {
        let addr = self.local_addr;
        self.inner
            .into_std()
            .map_err(|source| ListenerError::Bind { addr, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn two_listeners_share_a_port() {
        let first = Listener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let second = Listener::bind(first.local_addr()).unwrap();
        assert_eq!(first.local_addr(), second.local_addr());
    }

    #[tokio::test]
    async fn shared_listener_still_blocks_availability_check() {
        let held = Listener::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let err = ensure_available(held.local_addr()).unwrap_err();
        let info = err.to_error_info();
        assert_eq!(info.code, "EADDRINUSE");
        assert_eq!(info.port, Some(held.local_addr().port()));
    }

    #[test]
    fn availability_check_releases_the_port() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        ensure_available(addr).unwrap();
        ensure_available(addr).unwrap();
    }

    #[tokio::test]
    async fn conflict_with_exclusive_socket_is_addr_in_use() {
        let exclusive = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = exclusive.local_addr().unwrap();

        let err = Listener::bind(addr).unwrap_err();
        let info = err.to_error_info();
        assert_eq!(info.code, "EADDRINUSE");
        assert_eq!(info.port, Some(addr.port()));
        assert_eq!(info.syscall.as_deref(), Some("listen"));
    }
}
