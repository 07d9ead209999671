//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, trace span)
//!     → request.rs (ProxyUrl, destination parsing)
//!     → middleware/ (Cache → Static → Route → Upstream → Fallback)
//!     → forwarder.rs (outbound request, redirects, error classification)
//!     → body.rs (streamed relay, cache capture)
//!     → response.rs (built-in pages, product headers)
//!     → Send to client
//! ```

pub mod body;
pub mod forwarder;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRexRequestId, ProxyUrl, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
