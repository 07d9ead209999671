//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: worker, upstream, path, error)
//!     → logging.rs (EnvFilter → fmt layer → stderr)
//!
//! Per request:
//!     → x-request-id set on entry and echoed on the response
//!     → tower-http TraceLayer span around the pipeline
//! ```

pub mod logging;
