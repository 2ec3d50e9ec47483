//! Cache error types.

use std::error::Error;
use std::fmt;

use quarry_core::ErrorCode;

/// Errors returned by [`ResultCache`](crate::ResultCache) updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheError {
    /// The entry being replaced is still referenced by readers.
    ResourceBusy {
        /// Outstanding references on the existing entry.
        refs: u32,
    },
    /// The key exceeds the configured length limit.
    KeyTooLong {
        /// Length of the rejected key.
        len: usize,
        /// Configured limit.
        max: usize,
    },
}

impl CacheError {
    /// Flat error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ResourceBusy { .. } => ErrorCode::ResourceBusy,
            Self::KeyTooLong { .. } => ErrorCode::InvalidArgument,
        }
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceBusy { refs } => {
                write!(f, "cache entry busy ({refs} outstanding references)")
            }
            Self::KeyTooLong { len, max } => {
                write!(f, "cache key too long: {len} bytes (max {max})")
            }
        }
    }
}

impl Error for CacheError {}
