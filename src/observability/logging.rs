//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber once per process
//! - Resolve the log level from `RUST_LOG`, falling back to the configured level
//!
//! # Design Decisions
//! - Logs always go to stderr: a worker's stdout carries IPC, and so does the master's

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives for `level`, unless `RUST_LOG` overrides them.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("rex_proxy={level},tower_http={level},warn"))
    })
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
