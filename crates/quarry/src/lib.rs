//! Quarry: execution-context memory and result caching for a query engine.
//!
//! This is the facade crate that re-exports the public API from all
//! Quarry sub-crates. For most users, adding `quarry` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use quarry::prelude::*;
//!
//! let runtime = Runtime::init(EngineConfig::default()).unwrap();
//! let ctx = runtime.open_context(ContextFlags::default()).unwrap();
//!
//! // Scratch memory from the context's arena.
//! let buf = ctx.alloc_copy(b"hello").unwrap();
//! assert_eq!(ctx.with_bytes(&buf, |b| b.to_vec()).unwrap(), b"hello");
//! ctx.free(buf).unwrap();
//!
//! // Cached query execution against a database watermark.
//! let db = Timestamp::EPOCH;
//! let rows = runtime
//!     .execute_cached(&ctx, b"select 1", &db, |_| Ok(b"1".to_vec()))
//!     .unwrap();
//! assert_eq!(rows, b"1");
//!
//! runtime.shutdown();
//! assert_eq!(runtime.alloc_count(), 0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `quarry-core` | IDs, timestamps, error codes, `LastModified` |
//! | [`arena`] | `quarry-arena` | Segment table, bump and LIFO allocation, page mappers |
//! | [`cache`] | `quarry-cache` | Refcounted LRU result cache |
//! | [`engine`] | `quarry-engine` | Contexts, registry, and the runtime |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core identifiers, timestamps, and error codes (`quarry-core`).
pub use quarry_core as types;

/// Segmented arena allocation (`quarry-arena`).
///
/// [`arena::ContextArena`] is usable on its own; the engine wraps one per
/// context.
pub use quarry_arena as arena;

/// Query-result cache (`quarry-cache`).
pub use quarry_cache as cache;

/// Contexts and the process runtime (`quarry-engine`).
pub use quarry_engine as engine;

/// Common imports for typical Quarry usage.
///
/// ```rust
/// use quarry::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use quarry_core::{ContextId, ErrorCode, LastModified, Timestamp};

    // Arena handles and configuration
    pub use quarry_arena::{ArenaConfig, ArenaError, ArenaPtr, LifoPtr, LifoRelease};

    // Cache
    pub use quarry_cache::{CacheConfig, CacheError, CacheLease, ResultCache};

    // Engine
    pub use quarry_engine::{Context, ContextFlags, EngineConfig, EngineError, Runtime};
}
