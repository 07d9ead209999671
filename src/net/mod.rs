//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServerInstance
//!     → listener.rs (master: exclusive availability check before forking;
//!                    workers: SO_REUSEPORT bind shared by every worker process)
//!     → tls.rs (optional: PEM bytes → rustls ServerConfig)
//!     → Hand off to the HTTP layer (axum / axum-server)
//! ```
//!
//! # Design Decisions
//! - The kernel balances connections across workers; no accept-side coordination
//! - Bind and TLS failures carry errno-style codes so the master can classify them

pub mod listener;
pub mod tls;

pub use listener::{Listener, ListenerError};
pub use tls::{TlsError, TlsMaterial};
