//! Mediawatch cache system.
//!
//! A single in-process TTL store shared by the read services. Keys are
//! entity-prefixed strings; writes invalidate by substring.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! default_ttl_secs = 300
//! max_entries = 1000
//! sweep_interval_secs = 60
//! # ... see config.rs for all options
//! ```

mod config;
mod invalidation;
pub mod keys;
pub(crate) mod lock;
mod read_through;
mod store;

pub use config::CacheConfig;
pub use invalidation::CacheInvalidation;
pub use read_through::ReadThrough;
pub use store::{CacheStats, CacheStore};
