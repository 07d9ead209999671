//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (exact routes, then the `/*` wildcard)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched route destination or NoMatch (404 carried forward)
//!
//! Route Compilation (at worker startup):
//!     Route[] from the server instance
//!     → destinations parsed into absolute URLs
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use router::{CompiledRoute, RouteTable};
