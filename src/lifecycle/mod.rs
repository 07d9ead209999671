//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Master (supervisor.rs):
//!     Write pid file → Fork workers → Aggregate READY → Respawn on exit
//!     Worker error → classify.rs → fatal: kill all, exit 1 / otherwise: kill sender
//!
//! Worker (worker.rs):
//!     Config from stdin → Bind instances → READY → Serve → SIGTERM → exit 0
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown (shutdown.rs broadcast inside a worker)
//! ```
//!
//! # Design Decisions
//! - Parallelism is process based; workers share nothing but the listening port
//! - Fatal startup errors stop the whole group instead of respawning forever
//! - Shutdown is best-effort: SIGTERM fans out, nobody waits for a full drain

pub mod classify;
pub mod pidfile;
pub mod shutdown;
pub mod signals;
pub mod supervisor;
pub mod worker;

pub use classify::{classify, ErrorClass, FatalKind};
pub use shutdown::Shutdown;
pub use supervisor::{Supervisor, SupervisorOptions, SupervisorState};
