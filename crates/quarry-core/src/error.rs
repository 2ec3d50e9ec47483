//! Engine-wide error codes.
//!
//! Each subsystem has its own error enum carrying diagnostic context
//! (`ArenaError`, `CacheError`, `EngineError`). They all map onto the
//! flat [`ErrorCode`] taxonomy, which is what a context records as its
//! error state and what the query layer reports to clients.

use std::fmt;

/// Flat classification of every failure the core can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Every segment slot of the context holds a live mapping.
    OutOfSegments,
    /// The request size overflows the page-count arithmetic.
    RequestTooLarge,
    /// A handle does not match the owning context's segment table
    /// (wrong context, stale handle, or double free).
    InvalidPointer,
    /// A cache update hit an entry that still has outstanding references.
    ResourceBusy,
    /// The operating system refused to map memory.
    OutOfMemory,
    /// Any other invalid argument (bad configuration, finalized context).
    InvalidArgument,
}

impl ErrorCode {
    /// Whether a caller may retry the operation later and expect success
    /// without changing its arguments.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::ResourceBusy | Self::OutOfSegments | Self::OutOfMemory)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OutOfSegments => "out of segments",
            Self::RequestTooLarge => "request too large",
            Self::InvalidPointer => "invalid pointer",
            Self::ResourceBusy => "resource busy",
            Self::OutOfMemory => "out of memory",
            Self::InvalidArgument => "invalid argument",
        };
        f.write_str(s)
    }
}
