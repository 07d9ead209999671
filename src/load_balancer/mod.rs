//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream stage
//!     → pool.rs (failover_order: round-robin start, then the rest of the list)
//!     → round_robin.rs (advance the worker's rotation index)
//!     → failover.rs (try candidates in order; 502 when all are unreachable,
//!                    503 on the first non-retryable error)
//! ```
//!
//! # Design Decisions
//! - Rotation state is private to a worker process; workers never coordinate
//! - The rotation advances once per request, not once per attempt
//! - Failover is bounded by the pool size: no upstream is tried twice for one request

pub mod failover;
pub mod pool;
pub mod round_robin;

pub use failover::{run_failover, FailoverOutcome, Retryable};
pub use pool::{Upstream, UpstreamPool};

/// Strategy for picking the upstream a request starts with.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Position and value of the pick; `None` for an empty list.
    fn select<'a, T>(&self, upstreams: &'a [T]) -> Option<(usize, &'a T)>;
}
