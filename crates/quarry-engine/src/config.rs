//! Runtime configuration.

use quarry_arena::ArenaConfig;
use quarry_cache::CacheConfig;

use crate::error::EngineError;

/// Complete configuration for a [`Runtime`](crate::Runtime).
///
/// The arena section applies to every context the runtime opens; the
/// cache section sizes the single shared result cache.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Per-context arena parameters.
    pub arena: ArenaConfig,
    /// Shared result cache parameters.
    pub cache: CacheConfig,
}

impl EngineConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the arena section.
    pub fn with_arena(mut self, arena: ArenaConfig) -> Self {
        self.arena = arena;
        self
    }

    /// Replace the cache section.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Validate both sections against the platform page size.
    pub fn validate(&self, page_size: usize) -> Result<(), EngineError> {
        self.arena.validate(page_size)?;
        self.cache
            .validate()
            .map_err(|reason| EngineError::InvalidConfig { reason })
    }
}
