//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*, Via)
//!     → forwarded to route destination or upstream
//! Upstream response:
//!     → headers.rs (strip hop-by-hop)
//!     → relayed to client
//! ```
//!
//! # Design Decisions
//! - No trust in client input: hop-by-hop headers never cross the proxy
//! - TLS termination lives in `net::tls`, not here

pub mod headers;
