//! Response caching.
//!
//! # Data Flow
//! ```text
//! request → Cache stage: caching_permitted? → store.get(url_string) → hit: replay 200
//! upstream 200 for GET → policy::cache_ttl → body relayed to client while buffered
//!     → end of stream → store.set(url_string, entry)
//! ```
//!
//! # Design Decisions
//! - One store per worker process, passed into the pipeline explicitly
//! - Expiry is lazy: no background sweep, lookups delete what they find expired
//! - Entries are written only after the whole body has been seen

pub mod policy;
pub mod store;

pub use policy::{cache_ttl, caching_permitted, is_cacheable_exchange, DEFAULT_TTL};
pub use store::{CacheEntry, ResponseCache};
