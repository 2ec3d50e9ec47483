//! Refcounted bump allocation.
//!
//! Blocks are carved from the current fixed segment; each segment records
//! its live blocks by offset and carve generation. When the last one is
//! released the segment is rewound if it is still current, or unmapped if
//! a newer segment has taken over. Zero-length requests still occupy one
//! alignment unit so no two live blocks share an offset.
//! Requests larger than a segment get a dedicated page-granular mapping
//! that is unmapped as soon as the block is freed.

use crate::arena::ContextArena;
use crate::config::ArenaConfig;
use crate::error::{ArenaError, PointerFault};
use crate::handle::ArenaPtr;
use crate::segment::{Discipline, Segment, SegmentKind};

impl ContextArena {
    /// Allocate `size` bytes. Contents are unspecified.
    pub fn alloc(&mut self, size: usize) -> Result<ArenaPtr, ArenaError> {
        self.carve(size).map(|(ptr, _)| ptr)
    }

    /// Allocate `size` zeroed bytes.
    ///
    /// Fresh mappings are already zero; only blocks carved from a rewound
    /// segment are cleared explicitly.
    pub fn alloc_zeroed(&mut self, size: usize) -> Result<ArenaPtr, ArenaError> {
        let (ptr, dirty) = self.carve(size)?;
        if dirty {
            self.bytes_mut(&ptr)?.fill(0);
        }
        Ok(ptr)
    }

    /// Allocate a copy of `src`.
    pub fn alloc_copy(&mut self, src: &[u8]) -> Result<ArenaPtr, ArenaError> {
        let ptr = self.alloc(src.len())?;
        self.bytes_mut(&ptr)?.copy_from_slice(src);
        Ok(ptr)
    }

    /// Release a block allocated by [`ContextArena::alloc`].
    ///
    /// Invalid handles, double frees included, are rejected without
    /// touching the arena.
    pub fn free(&mut self, ptr: ArenaPtr) -> Result<(), ArenaError> {
        let slot = ptr.segment;
        if self.locate_bump(&ptr)?.kind().is_oversized() {
            self.table.unmap(slot);
            return Ok(());
        }
        let current = self.current == Some(slot);
        let seg = self
            .table
            .get_mut(slot)
            .ok_or(ArenaError::invalid(slot, PointerFault::Unmapped))?;
        seg.remove_block(ptr.offset);
        if seg.live_blocks() > 0 {
            return Ok(());
        }
        if current {
            *seg.kind_mut() = SegmentKind::Bump {
                cursor: 0,
                dirty: true,
            };
        } else {
            self.table.unmap(slot);
        }
        Ok(())
    }

    /// Resize a block.
    ///
    /// `None` behaves like [`ContextArena::alloc`]; a `new_size` of zero
    /// frees the block and returns `None`. Otherwise a new block is
    /// allocated, the common prefix copied, and the old block freed.
    pub fn realloc(
        &mut self,
        old: Option<ArenaPtr>,
        new_size: usize,
    ) -> Result<Option<ArenaPtr>, ArenaError> {
        let Some(old) = old else {
            return if new_size == 0 {
                Ok(None)
            } else {
                self.alloc(new_size).map(Some)
            };
        };
        if new_size == 0 {
            self.free(old)?;
            return Ok(None);
        }
        self.locate_bump(&old)?;
        let new = self.alloc(new_size)?;
        let copied = self.table.copy_bytes(
            (old.segment, old.offset as usize),
            (new.segment, new.offset as usize),
            old.len.min(new_size),
        );
        if let Err(err) = copied {
            let _ = self.free(new);
            return Err(err);
        }
        self.free(old)?;
        Ok(Some(new))
    }

    /// The bytes of a live bump block.
    pub fn bytes(&self, ptr: &ArenaPtr) -> Result<&[u8], ArenaError> {
        let seg = self.locate_bump(ptr)?;
        Ok(seg.bytes(ptr.offset as usize, ptr.len))
    }

    /// The bytes of a live bump block, mutably.
    pub fn bytes_mut(&mut self, ptr: &ArenaPtr) -> Result<&mut [u8], ArenaError> {
        self.locate_bump(ptr)?;
        let seg = self
            .table
            .get_mut(ptr.segment)
            .ok_or(ArenaError::invalid(ptr.segment, PointerFault::Unmapped))?;
        Ok(seg.bytes_mut(ptr.offset as usize, ptr.len))
    }

    /// Validate a bump handle fully, bounds included.
    fn locate_bump(&self, ptr: &ArenaPtr) -> Result<&Segment, ArenaError> {
        let seg = self.locate(
            ptr.owner,
            ptr.segment,
            ptr.generation,
            ptr.offset,
            Discipline::Bump,
        )?;
        let in_bounds = match seg.kind() {
            SegmentKind::Oversized { .. } => ptr.len <= seg.len(),
            _ => ptr.end() <= seg.used(),
        };
        if !in_bounds {
            return Err(ArenaError::invalid(ptr.segment, PointerFault::OutOfBounds));
        }
        Ok(seg)
    }

    /// Reserve `size` bytes. The flag is set when the block may hold
    /// stale data from a rewound segment.
    fn carve(&mut self, size: usize) -> Result<(ArenaPtr, bool), ArenaError> {
        let padded = ArenaConfig::pad(size.max(1))
            .ok_or(ArenaError::RequestTooLarge { requested: size })?;

        if padded > self.config.segment_bytes as usize {
            let pages = self.table.pages_for(padded)?;
            let slot = self.table.find_free(0)?;
            let seg = self.table.map_pages(slot, pages, Discipline::Bump)?;
            let ptr = ArenaPtr::new(self.owner, slot, seg.generation(), 0, size);
            return Ok((ptr, false));
        }

        let fits = self
            .current
            .filter(|&i| self.table.get(i).is_some_and(|s| s.remaining() >= padded));
        let slot = match fits {
            Some(i) => i,
            None => {
                let i = self.table.find_free(0)?;
                self.table.map_fixed(i, SegmentKind::FRESH_BUMP)?;
                self.current = Some(i);
                i
            }
        };

        let owner = self.owner;
        let generation = self.table.issue_generation();
        let seg = self
            .table
            .get_mut(slot)
            .ok_or(ArenaError::invalid(slot, PointerFault::Unmapped))?;
        let SegmentKind::Bump { cursor, dirty } = *seg.kind() else {
            return Err(ArenaError::invalid(slot, PointerFault::DisciplineMismatch));
        };
        *seg.kind_mut() = SegmentKind::Bump {
            cursor: cursor + padded as u32,
            dirty,
        };
        seg.insert_block(cursor, generation);
        Ok((ArenaPtr::new(owner, slot, generation, cursor, size), dirty))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quarry_core::ContextId;

    use super::*;
    use crate::pages::{AnonymousPages, MapStats, PageMapper};

    const SEG: usize = 1 << 16;

    fn arena_with_stats(max_segments: u16) -> (ContextArena, Arc<MapStats>) {
        let mapper = AnonymousPages::new();
        let stats = mapper.shared_stats();
        let config = ArenaConfig::new()
            .with_segment_bytes(SEG as u32)
            .with_max_segments(max_segments);
        let arena = ContextArena::new(ContextId::next(), config, Arc::new(mapper)).unwrap();
        (arena, stats)
    }

    #[test]
    fn two_small_blocks_share_a_segment() {
        let (mut arena, _) = arena_with_stats(8);
        let a = arena.alloc(10).unwrap();
        let b = arena.alloc(20).unwrap();
        assert_eq!(a.segment(), b.segment());
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 16);
        assert_eq!(arena.live_count(a.segment()), Some(2));

        arena.free(a).unwrap();
        arena.free(b).unwrap();
        assert_eq!(arena.live_count(b.segment()), Some(0));
        // Still current: rewound, not unmapped.
        assert_eq!(arena.mapped_segments(), 1);
        assert_eq!(arena.table().get(0).unwrap().used(), 0);
    }

    #[test]
    fn alloc_free_pair_leaves_live_count_unchanged() {
        let (mut arena, _) = arena_with_stats(8);
        let keep = arena.alloc(64).unwrap();
        let before = arena.live_count(keep.segment());
        let tmp = arena.alloc(32).unwrap();
        arena.free(tmp).unwrap();
        assert_eq!(arena.live_count(keep.segment()), before);
    }

    #[test]
    fn full_segment_rolls_over_and_old_one_unmaps_when_drained() {
        let (mut arena, stats) = arena_with_stats(8);
        let a = arena.alloc(SEG - 8).unwrap();
        let b = arena.alloc(16).unwrap();
        assert_ne!(a.segment(), b.segment());
        assert_eq!(arena.current_segment(), Some(b.segment()));
        assert_eq!(stats.outstanding(), 2);

        arena.free(a).unwrap();
        assert!(arena.table().get(a.segment()).is_none());
        assert_eq!(stats.outstanding(), 1);
    }

    #[test]
    fn oversized_maps_exact_page_count_and_unmaps_on_free() {
        let (mut arena, stats) = arena_with_stats(8);
        let page = arena.table().page_size();
        let size = SEG + page + 1;
        let before = stats.outstanding_pages();
        let ptr = arena.alloc(size).unwrap();
        let pages = stats.outstanding_pages() - before;
        assert_eq!(pages as usize, size.div_ceil(page));
        assert_eq!(ptr.offset(), 0);
        assert_eq!(arena.bytes(&ptr).unwrap().len(), size);

        arena.free(ptr).unwrap();
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn oversized_does_not_displace_current_segment() {
        let (mut arena, _) = arena_with_stats(8);
        let small = arena.alloc(8).unwrap();
        let big = arena.alloc(SEG * 2).unwrap();
        assert_eq!(arena.current_segment(), Some(small.segment()));
        let next = arena.alloc(8).unwrap();
        assert_eq!(next.segment(), small.segment());
        arena.free(big).unwrap();
    }

    #[test]
    fn out_of_segments_when_table_is_full() {
        let (mut arena, _) = arena_with_stats(2);
        arena.alloc(SEG).unwrap();
        arena.alloc(SEG).unwrap();
        assert_eq!(
            arena.alloc(8),
            Err(ArenaError::OutOfSegments { max_segments: 2 })
        );
    }

    #[test]
    fn double_free_with_live_sibling_is_rejected() {
        let (mut arena, _) = arena_with_stats(8);
        let p1 = arena.alloc_copy(b"AAAAAAAA").unwrap();
        let p2 = arena.alloc_copy(b"BBBBBBBB").unwrap();
        arena.free(p1).unwrap();
        assert_eq!(
            arena.free(p1),
            Err(ArenaError::invalid(p1.segment(), PointerFault::NotLive))
        );
        assert_eq!(arena.live_count(p2.segment()), Some(1));

        // The segment was not rewound under p2.
        let p3 = arena.alloc_copy(b"DDDDDDDD").unwrap();
        assert_ne!(p3.offset(), p2.offset());
        assert_eq!(arena.bytes(&p2).unwrap(), b"BBBBBBBB");
    }

    #[test]
    fn stale_handle_after_rewind_is_rejected() {
        let (mut arena, _) = arena_with_stats(8);
        let old = arena.alloc(8).unwrap();
        arena.free(old).unwrap();
        let new = arena.alloc_copy(b"newblock").unwrap();
        assert_eq!((new.segment(), new.offset()), (old.segment(), old.offset()));

        assert_eq!(
            arena.free(old),
            Err(ArenaError::invalid(old.segment(), PointerFault::NotLive))
        );
        assert!(arena.bytes(&old).is_err());
        assert_eq!(arena.bytes(&new).unwrap(), b"newblock");
        assert_eq!(arena.live_count(new.segment()), Some(1));
        arena.free(new).unwrap();
    }

    #[test]
    fn zero_length_blocks_get_distinct_offsets() {
        let (mut arena, _) = arena_with_stats(8);
        let a = arena.alloc(0).unwrap();
        let b = arena.alloc(0).unwrap();
        assert_ne!(a.offset(), b.offset());
        assert!(arena.bytes(&a).unwrap().is_empty());
        arena.free(a).unwrap();
        assert_eq!(arena.live_count(b.segment()), Some(1));
        arena.free(b).unwrap();
    }

    #[test]
    fn unrepresentable_size_is_too_large() {
        let (mut arena, stats) = arena_with_stats(8);
        assert_eq!(
            arena.alloc(usize::MAX),
            Err(ArenaError::RequestTooLarge {
                requested: usize::MAX
            })
        );
        assert_eq!(
            arena.alloc_zeroed(usize::MAX),
            Err(ArenaError::RequestTooLarge {
                requested: usize::MAX
            })
        );
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn stale_handle_to_remapped_slot_is_rejected() {
        let (mut arena, _) = arena_with_stats(8);
        let a = arena.alloc(SEG).unwrap();
        let b = arena.alloc(8).unwrap();
        arena.free(a).unwrap();
        // Slot 0 is free again and gets remapped by the next rollover.
        arena.alloc(SEG - 8).unwrap();
        let c = arena.alloc(16).unwrap();
        assert_eq!(c.segment(), a.segment());
        let current = arena.table().get(c.segment()).unwrap().generation();
        assert!(c.generation() > current);
        assert_eq!(
            arena.free(a),
            Err(ArenaError::InvalidPointer {
                segment: a.segment(),
                fault: PointerFault::StaleGeneration {
                    handle: a.generation(),
                    current,
                },
            })
        );
        arena.free(b).unwrap();
    }

    #[test]
    fn handle_from_other_context_is_rejected() {
        let (mut a, _) = arena_with_stats(8);
        let (mut b, _) = arena_with_stats(8);
        let ptr = a.alloc(8).unwrap();
        b.alloc(8).unwrap();
        let err = b.free(ptr).unwrap_err();
        assert_eq!(
            err,
            ArenaError::InvalidPointer {
                segment: 0,
                fault: PointerFault::WrongContext { owner: a.owner() },
            }
        );
        assert_eq!(b.live_count(0), Some(1));
    }

    #[test]
    fn zeroed_alloc_clears_rewound_segment() {
        let (mut arena, _) = arena_with_stats(8);
        let a = arena.alloc_copy(b"leftover").unwrap();
        arena.free(a).unwrap();
        let z = arena.alloc_zeroed(8).unwrap();
        assert_eq!(z.offset(), 0);
        assert_eq!(arena.bytes(&z).unwrap(), &[0u8; 8]);
    }

    #[test]
    fn realloc_preserves_prefix() {
        let (mut arena, _) = arena_with_stats(8);
        let a = arena.alloc_copy(b"hello world").unwrap();
        let b = arena.realloc(Some(a), 5).unwrap().unwrap();
        assert_eq!(arena.bytes(&b).unwrap(), b"hello");
        let c = arena.realloc(Some(b), 64).unwrap().unwrap();
        assert_eq!(&arena.bytes(&c).unwrap()[..5], b"hello");
        assert_eq!(arena.realloc(Some(c), 0).unwrap(), None);
        assert_eq!(arena.realloc(None, 0).unwrap(), None);
        assert!(arena.realloc(None, 4).unwrap().is_some());
    }

    #[test]
    fn realloc_rejects_invalid_handle_before_allocating() {
        let (mut arena, _) = arena_with_stats(8);
        let a = arena.alloc(8).unwrap();
        arena.free(a).unwrap();
        let live = arena.live_count(0);
        assert!(arena.realloc(Some(a), 32).is_err());
        assert_eq!(arena.live_count(0), live);
    }

    #[test]
    fn lifo_handle_bytes_do_not_resolve_as_bump() {
        let (mut arena, _) = arena_with_stats(8);
        let l = arena.alloc_lifo(8).unwrap();
        let forged = ArenaPtr::new(l.owner(), l.segment(), l.generation(), 0, 8);
        assert_eq!(
            arena.bytes(&forged),
            Err(ArenaError::invalid(l.segment(), PointerFault::DisciplineMismatch))
        );
    }

    #[test]
    fn out_of_bounds_handle_is_rejected() {
        let (mut arena, _) = arena_with_stats(8);
        let a = arena.alloc(8).unwrap();
        let forged = ArenaPtr::new(a.owner(), a.segment(), a.generation(), 0, SEG * 2);
        assert_eq!(
            arena.free(forged),
            Err(ArenaError::invalid(a.segment(), PointerFault::OutOfBounds))
        );
        let unissued = ArenaPtr::new(a.owner(), a.segment(), a.generation(), 64, 8);
        assert_eq!(
            arena.free(unissued),
            Err(ArenaError::invalid(a.segment(), PointerFault::NotLive))
        );
        assert_eq!(arena.live_count(a.segment()), Some(1));
    }

    #[test]
    fn mapper_failure_surfaces_as_out_of_memory() {
        #[derive(Debug)]
        struct Refuse;
        impl PageMapper for Refuse {
            fn page_size(&self) -> usize {
                4096
            }
            fn map(&self, len: usize) -> Result<crate::MappedRegion, ArenaError> {
                Err(ArenaError::OutOfMemory { requested: len })
            }
            fn unmap(&self, _region: crate::MappedRegion) {}
        }
        let mut arena =
            ContextArena::new(ContextId::next(), ArenaConfig::new(), Arc::new(Refuse)).unwrap();
        assert_eq!(
            arena.alloc(8),
            Err(ArenaError::OutOfMemory {
                requested: ArenaConfig::DEFAULT_SEGMENT_BYTES as usize
            })
        );
        assert_eq!(arena.current_segment(), None);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn freeing_everything_drains_the_arena(
                sizes in prop::collection::vec(0usize..4_000, 1..64),
            ) {
                let (mut arena, stats) = arena_with_stats(32);
                let mut ptrs = Vec::new();
                for &size in &sizes {
                    ptrs.push(arena.alloc(size).unwrap());
                }
                let live: u64 = arena.stats().live_allocations;
                prop_assert_eq!(live, sizes.len() as u64);
                for ptr in ptrs {
                    arena.free(ptr).unwrap();
                }
                prop_assert_eq!(arena.stats().live_allocations, 0);
                // Only the current segment may stay mapped (rewound).
                prop_assert!(stats.outstanding() <= 1);
            }
        }
    }
}
