//! Reusable configurations and page mappers.
//!
//! - [`small_arena_config`]: 64 KiB segments, 8 slots, so segment
//!   rollover and exhaustion are cheap to reach.
//! - [`small_engine_config`]: the same arena with a small cache bound.
//! - [`FailingPages`]: a mapper that refuses after N successful maps.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quarry_arena::{AnonymousPages, ArenaConfig, ArenaError, MapStats, MappedRegion, PageMapper};
use quarry_engine::EngineConfig;

/// Segment size used by the small fixtures.
pub const SMALL_SEGMENT_BYTES: u32 = 1 << 16;

/// Slot count used by the small fixtures.
pub const SMALL_MAX_SEGMENTS: u16 = 8;

pub fn small_arena_config() -> ArenaConfig {
    ArenaConfig::new()
        .with_segment_bytes(SMALL_SEGMENT_BYTES)
        .with_max_segments(SMALL_MAX_SEGMENTS)
}

/// Small arena plus a cache bounded at `max_entries`.
pub fn small_engine_config(max_entries: u32) -> EngineConfig {
    let mut config = EngineConfig::new().with_arena(small_arena_config());
    config.cache.max_entries = max_entries;
    config
}

/// Page mapper that succeeds `budget` times, then fails every map with
/// [`ArenaError::OutOfMemory`].
///
/// Successful maps and all unmaps go through an inner [`AnonymousPages`],
/// so its counters stay accurate.
#[derive(Debug)]
pub struct FailingPages {
    inner: AnonymousPages,
    remaining: AtomicUsize,
}

impl FailingPages {
    pub fn new(budget: usize) -> Self {
        Self {
            inner: AnonymousPages::new(),
            remaining: AtomicUsize::new(budget),
        }
    }

    /// Convenience for `Arc<dyn PageMapper>` call sites.
    pub fn shared(budget: usize) -> Arc<Self> {
        Arc::new(Self::new(budget))
    }

    /// Restore the budget.
    pub fn refill(&self, budget: usize) {
        self.remaining.store(budget, Ordering::SeqCst);
    }
}

impl PageMapper for FailingPages {
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn map(&self, len: usize) -> Result<MappedRegion, ArenaError> {
        let granted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if granted {
            self.inner.map(len)
        } else {
            Err(ArenaError::OutOfMemory { requested: len })
        }
    }

    fn unmap(&self, region: MappedRegion) {
        self.inner.unmap(region);
    }

    fn stats(&self) -> Option<&MapStats> {
        self.inner.stats()
    }
}
