//! Engine error types.

use std::error::Error;
use std::fmt;

use quarry_arena::ArenaError;
use quarry_cache::CacheError;
use quarry_core::{ContextId, ErrorCode};

/// Errors surfaced by contexts and the runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// An arena operation failed.
    Arena(ArenaError),
    /// A cache operation failed.
    Cache(CacheError),
    /// The context was finalized; its arena is gone.
    ContextFinalized {
        /// The finalized context.
        context: ContextId,
    },
    /// Configuration failed validation.
    InvalidConfig {
        /// Description of the violated invariant.
        reason: String,
    },
    /// A query producer reported failure.
    QueryFailed {
        /// Producer-supplied description.
        reason: String,
    },
}

impl EngineError {
    /// Flat error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Arena(e) => e.code(),
            Self::Cache(e) => e.code(),
            Self::ContextFinalized { .. }
            | Self::InvalidConfig { .. }
            | Self::QueryFailed { .. } => ErrorCode::InvalidArgument,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arena(e) => write!(f, "arena: {e}"),
            Self::Cache(e) => write!(f, "cache: {e}"),
            Self::ContextFinalized { context } => write!(f, "{context} is finalized"),
            Self::InvalidConfig { reason } => write!(f, "invalid config: {reason}"),
            Self::QueryFailed { reason } => write!(f, "query failed: {reason}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            Self::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for EngineError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

impl From<CacheError> for EngineError {
    fn from(e: CacheError) -> Self {
        Self::Cache(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_chains_to_wrapped_error() {
        let err = EngineError::from(CacheError::ResourceBusy { refs: 2 });
        assert_eq!(err.code(), ErrorCode::ResourceBusy);
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "cache: cache entry busy (2 outstanding references)"
        );
    }

    #[test]
    fn finalized_has_no_source() {
        let err = EngineError::ContextFinalized {
            context: ContextId::next(),
        };
        assert!(err.source().is_none());
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
