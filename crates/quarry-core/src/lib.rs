//! Core types and traits for the Quarry engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the identifiers, timestamps, error codes, and collaborator traits
//! shared by the arena, the result cache, and the context manager.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod time;
pub mod traits;

pub use error::ErrorCode;
pub use id::ContextId;
pub use time::Timestamp;
pub use traits::LastModified;
