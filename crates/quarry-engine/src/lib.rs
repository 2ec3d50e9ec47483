//! Execution contexts and the process runtime.
//!
//! A [`Runtime`] owns everything process-wide: the shared
//! [`ResultCache`](quarry_cache::ResultCache), the registry of open
//! contexts, and the page mapper every context allocates through. Each
//! [`Context`] owns one [`ContextArena`](quarry_arena::ContextArena) behind
//! its own lock and records the last error it hit.
//!
//! ```text
//! Runtime ──┬── ResultCache (one mutex)
//!           ├── ContextRegistry (one mutex, weak refs)
//!           └── PageMapper ── Context ── ContextArena (one mutex each)
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod error;
pub mod registry;
pub mod runtime;

pub use config::EngineConfig;
pub use context::{Context, ContextFlags};
pub use error::EngineError;
pub use registry::ContextRegistry;
pub use runtime::Runtime;
