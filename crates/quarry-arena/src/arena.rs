//! Per-context arena: the segment table plus the two discipline cursors.
//!
//! [`ContextArena`] is the single owner of a context's mappings. The
//! bump discipline ([`ContextArena::alloc`] and friends) and the LIFO
//! discipline ([`ContextArena::alloc_lifo`]) are implemented in their own
//! modules as further `impl ContextArena` blocks; this module holds the
//! shared state and handle validation.

use std::fmt;
use std::sync::Arc;

use quarry_core::ContextId;

use crate::config::ArenaConfig;
use crate::error::{ArenaError, PointerFault};
use crate::pages::PageMapper;
use crate::segment::{Discipline, Segment, SegmentKind, SegmentTable};

/// Segment arena owned by one execution context.
///
/// Not internally synchronised: callers serialise access (the engine
/// holds the context lock for the duration of each call).
pub struct ContextArena {
    pub(crate) owner: ContextId,
    pub(crate) config: ArenaConfig,
    pub(crate) table: SegmentTable,
    /// Bump segment currently being carved.
    pub(crate) current: Option<u16>,
    /// Top of the LIFO segment stack.
    pub(crate) lifo_top: Option<u16>,
}

impl ContextArena {
    /// Create an empty arena for `owner`. No memory is mapped until the
    /// first allocation.
    pub fn new(
        owner: ContextId,
        config: ArenaConfig,
        mapper: Arc<dyn PageMapper>,
    ) -> Result<Self, ArenaError> {
        config.validate(mapper.page_size())?;
        let table = SegmentTable::new(config.segment_bytes, config.max_segments, mapper);
        Ok(Self {
            owner,
            config,
            table,
            current: None,
            lifo_top: None,
        })
    }

    /// Context this arena belongs to.
    pub fn owner(&self) -> ContextId {
        self.owner
    }

    /// The arena's configuration.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Read access to the segment table.
    pub fn table(&self) -> &SegmentTable {
        &self.table
    }

    /// Slot of the bump segment currently being carved.
    pub fn current_segment(&self) -> Option<u16> {
        self.current
    }

    /// Slot at the top of the LIFO stack.
    pub fn lifo_top(&self) -> Option<u16> {
        self.lifo_top
    }

    /// Live allocation count of a fixed bump segment.
    ///
    /// Oversized segments hold exactly one allocation and report 1; LIFO
    /// and unmapped slots report `None`.
    pub fn live_count(&self, segment: u16) -> Option<u32> {
        let seg = self.table.get(segment)?;
        match seg.kind() {
            SegmentKind::Bump { .. } => Some(seg.live_blocks() as u32),
            SegmentKind::Oversized {
                discipline: Discipline::Bump,
                ..
            } => Some(1),
            _ => None,
        }
    }

    /// Number of mapped segments of any kind.
    pub fn mapped_segments(&self) -> usize {
        self.table.mapped_count()
    }

    /// Unmap every segment regardless of outstanding allocations.
    ///
    /// All previously issued handles become invalid. Returns the number of
    /// segments unmapped.
    pub fn release_all(&mut self) -> usize {
        self.current = None;
        self.lifo_top = None;
        let released = self.table.release_all();
        if released > 0 {
            tracing::debug!(context = %self.owner, released, "arena released");
        }
        released
    }

    /// Snapshot of segment usage.
    pub fn stats(&self) -> ArenaStats {
        let mut stats = ArenaStats::default();
        for (_, seg) in self.table.iter() {
            stats.mapped_segments += 1;
            stats.mapped_bytes += seg.len();
            stats.used_bytes += seg.used();
            match seg.kind() {
                SegmentKind::Bump { .. } => {
                    stats.bump_segments += 1;
                    stats.live_allocations += seg.live_blocks() as u64;
                }
                SegmentKind::Lifo { .. } => stats.lifo_segments += 1,
                SegmentKind::Oversized { discipline, .. } => {
                    stats.oversized_segments += 1;
                    if *discipline == Discipline::Bump {
                        stats.live_allocations += 1;
                    }
                }
            }
        }
        stats
    }

    /// Resolve a handle's slot, checking owner, range, mapping, generation,
    /// discipline, and that the block at `offset` is still live under the
    /// handle's generation. Extents are checked by the caller.
    pub(crate) fn locate(
        &self,
        owner: ContextId,
        segment: u16,
        generation: u64,
        offset: u32,
        discipline: Discipline,
    ) -> Result<&Segment, ArenaError> {
        if owner != self.owner {
            return Err(ArenaError::invalid(
                segment,
                PointerFault::WrongContext { owner },
            ));
        }
        if segment >= self.table.capacity() {
            return Err(ArenaError::invalid(segment, PointerFault::SegmentOutOfRange));
        }
        let seg = self
            .table
            .get(segment)
            .ok_or(ArenaError::invalid(segment, PointerFault::Unmapped))?;
        if generation < seg.generation() {
            return Err(ArenaError::invalid(
                segment,
                PointerFault::StaleGeneration {
                    handle: generation,
                    current: seg.generation(),
                },
            ));
        }
        if seg.kind().discipline() != discipline {
            return Err(ArenaError::invalid(segment, PointerFault::DisciplineMismatch));
        }
        let live = if seg.kind().is_oversized() {
            offset == 0 && generation == seg.generation()
        } else {
            seg.block_generation(offset) == Some(generation)
        };
        if !live {
            return Err(ArenaError::invalid(segment, PointerFault::NotLive));
        }
        Ok(seg)
    }
}

impl fmt::Debug for ContextArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextArena")
            .field("owner", &self.owner)
            .field("current", &self.current)
            .field("lifo_top", &self.lifo_top)
            .field("table", &self.table)
            .finish()
    }
}

/// Point-in-time usage summary of a [`ContextArena`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Mapped segments of any kind.
    pub mapped_segments: usize,
    /// Fixed bump segments.
    pub bump_segments: usize,
    /// Fixed LIFO segments.
    pub lifo_segments: usize,
    /// Dedicated oversized mappings (both disciplines).
    pub oversized_segments: usize,
    /// Outstanding bump allocations, oversized ones included.
    pub live_allocations: u64,
    /// Total bytes mapped.
    pub mapped_bytes: usize,
    /// Bytes carved out of the mappings.
    pub used_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::AnonymousPages;

    fn test_arena(max_segments: u16) -> ContextArena {
        let config = ArenaConfig::new()
            .with_segment_bytes(1 << 16)
            .with_max_segments(max_segments);
        ContextArena::new(ContextId::next(), config, Arc::new(AnonymousPages::new())).unwrap()
    }

    #[test]
    fn new_arena_maps_nothing() {
        let arena = test_arena(8);
        assert_eq!(arena.mapped_segments(), 0);
        assert_eq!(arena.current_segment(), None);
        assert_eq!(arena.lifo_top(), None);
        assert_eq!(arena.stats(), ArenaStats::default());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ArenaConfig::new().with_segment_bytes(3000);
        let err = ContextArena::new(ContextId::next(), config, Arc::new(AnonymousPages::new()))
            .unwrap_err();
        assert!(matches!(err, ArenaError::InvalidConfig { .. }));
    }

    #[test]
    fn stats_count_segments_by_kind() {
        let mut arena = test_arena(8);
        arena.alloc(16).unwrap();
        arena.alloc(16).unwrap();
        arena.alloc_lifo(32).unwrap();
        arena.alloc(100_000).unwrap();
        let stats = arena.stats();
        assert_eq!(stats.mapped_segments, 3);
        assert_eq!(stats.bump_segments, 1);
        assert_eq!(stats.lifo_segments, 1);
        assert_eq!(stats.oversized_segments, 1);
        assert_eq!(stats.live_allocations, 3);
    }

    #[test]
    fn release_all_resets_cursors() {
        let mut arena = test_arena(8);
        arena.alloc(16).unwrap();
        arena.alloc_lifo(16).unwrap();
        assert_eq!(arena.release_all(), 2);
        assert_eq!(arena.mapped_segments(), 0);
        assert_eq!(arena.current_segment(), None);
        assert_eq!(arena.lifo_top(), None);
    }
}
