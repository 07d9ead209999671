//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! rex.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → master serializes it as JSON onto each worker's stdin
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Workers never read the file themselves, so every worker sees the same value

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{CachingMode, ProxyConfig, Route, ServerInstance, SslConfig, WorkerCount};
