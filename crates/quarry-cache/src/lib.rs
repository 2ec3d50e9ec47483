//! Query-result cache for the Quarry engine.
//!
//! [`ResultCache`] maps opaque query keys to immutable result bytes. It
//! is shared by every execution context in a process and bounded by an
//! entry count. Three rules shape its behaviour:
//!
//! - **Staleness:** an entry created at or before the database's
//!   last-modified watermark is never served.
//! - **Refcounting:** every hit pins the entry until the caller releases
//!   it with [`ResultCache::unref`] (or drops a [`CacheLease`]). Pinned
//!   entries are never replaced or evicted.
//! - **LRU eviction:** when the bound is exceeded, the least recently
//!   used unpinned entries go first.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod error;
mod lru;

pub use cache::{CacheLease, CacheStats, ResultCache};
pub use config::CacheConfig;
pub use error::CacheError;
