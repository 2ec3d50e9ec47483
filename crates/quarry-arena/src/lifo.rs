//! Stack-ordered (LIFO) allocation.
//!
//! LIFO blocks live in their own segments, separate from bump segments.
//! Segments are opened in ascending slot order above the current top, so
//! walking the table downward from the top visits them newest first.
//! Releasing a block releases everything allocated after it: segments
//! above it are unmapped and its own segment is either truncated back to
//! the block's offset or, if the block starts the segment, unmapped too.
//! A handle must name a block that is still live: once released, its
//! offset may be reused by a newer block with a newer generation.

use smallvec::SmallVec;

use crate::arena::ContextArena;
use crate::config::ArenaConfig;
use crate::error::{ArenaError, PointerFault};
use crate::handle::LifoPtr;
use crate::segment::{Discipline, Segment, SegmentKind};

/// What a [`ContextArena::free_lifo`] call released.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LifoRelease {
    /// Slots unmapped, highest first.
    pub unmapped: SmallVec<[u16; 4]>,
    /// Slot whose cursor was rewound to the released block's offset.
    pub truncated: Option<u16>,
    /// New top of the LIFO stack.
    pub new_top: Option<u16>,
}

impl ContextArena {
    /// Allocate `size` bytes on the LIFO stack.
    pub fn alloc_lifo(&mut self, size: usize) -> Result<LifoPtr, ArenaError> {
        let padded = ArenaConfig::pad(size.max(1))
            .ok_or(ArenaError::RequestTooLarge { requested: size })?;
        let above = self.lifo_top.map_or(0, |top| top as usize + 1);

        if padded > self.config.segment_bytes as usize {
            let pages = self.table.pages_for(padded)?;
            let slot = self.table.find_free(above)?;
            let seg = self.table.map_pages(slot, pages, Discipline::Lifo)?;
            let ptr = LifoPtr::new(self.owner, slot, seg.generation(), 0, size);
            self.lifo_top = Some(slot);
            return Ok(ptr);
        }

        let segment_bytes = self.config.segment_bytes as usize;
        let fits = self.lifo_top.filter(|&top| {
            matches!(
                self.table.get(top).map(Segment::kind),
                Some(SegmentKind::Lifo { cursor }) if *cursor as usize + padded <= segment_bytes
            )
        });
        let slot = match fits {
            Some(top) => top,
            None => {
                let slot = self.table.find_free(above)?;
                self.table.map_fixed(slot, SegmentKind::FRESH_LIFO)?;
                self.lifo_top = Some(slot);
                slot
            }
        };

        let owner = self.owner;
        let generation = self.table.issue_generation();
        let seg = self
            .table
            .get_mut(slot)
            .ok_or(ArenaError::invalid(slot, PointerFault::Unmapped))?;
        let SegmentKind::Lifo { cursor } = *seg.kind() else {
            return Err(ArenaError::invalid(slot, PointerFault::DisciplineMismatch));
        };
        *seg.kind_mut() = SegmentKind::Lifo {
            cursor: cursor + padded as u32,
        };
        seg.insert_block(cursor, generation);
        Ok(LifoPtr::new(owner, slot, generation, cursor, size))
    }

    /// Release `ptr` and every LIFO block allocated after it.
    ///
    /// The handle is validated before anything is unmapped; a handle that
    /// does not name a live LIFO block at or below the top is rejected.
    pub fn free_lifo(&mut self, ptr: LifoPtr) -> Result<LifoRelease, ArenaError> {
        let top = self
            .lifo_top
            .ok_or(ArenaError::invalid(ptr.segment, PointerFault::LifoEmpty))?;
        self.locate_lifo(&ptr)?;
        if ptr.segment > top {
            return Err(ArenaError::invalid(
                ptr.segment,
                PointerFault::AboveLifoTop { top },
            ));
        }

        let mut release = LifoRelease::default();
        let mut newer: Option<u64> = None;
        for slot in (ptr.segment..=top).rev() {
            let Some(seg) = self.table.get(slot) else {
                continue;
            };
            if seg.kind().discipline() != Discipline::Lifo {
                continue;
            }
            debug_assert!(
                newer.is_none_or(|g| seg.generation() < g),
                "lifo segments out of stack order at slot {slot}"
            );
            newer = Some(seg.generation());

            let interior = slot == ptr.segment
                && ptr.offset > 0
                && matches!(seg.kind(), SegmentKind::Lifo { .. });
            if interior {
                if let Some(seg) = self.table.get_mut(slot) {
                    *seg.kind_mut() = SegmentKind::Lifo { cursor: ptr.offset };
                    seg.truncate_blocks(ptr.offset);
                }
                release.truncated = Some(slot);
            } else {
                self.table.unmap(slot);
                release.unmapped.push(slot);
            }
        }

        release.new_top = if release.truncated.is_some() {
            Some(ptr.segment)
        } else {
            (0..ptr.segment).rev().find(|&slot| {
                self.table
                    .get(slot)
                    .is_some_and(|s| s.kind().discipline() == Discipline::Lifo)
            })
        };
        self.lifo_top = release.new_top;
        Ok(release)
    }

    /// The bytes of a live LIFO block.
    pub fn lifo_bytes(&self, ptr: &LifoPtr) -> Result<&[u8], ArenaError> {
        let seg = self.locate_lifo(ptr)?;
        Self::check_lifo_extent(seg, ptr)?;
        Ok(seg.bytes(ptr.offset as usize, ptr.len))
    }

    /// The bytes of a live LIFO block, mutably.
    pub fn lifo_bytes_mut(&mut self, ptr: &LifoPtr) -> Result<&mut [u8], ArenaError> {
        let seg = self.locate_lifo(ptr)?;
        Self::check_lifo_extent(seg, ptr)?;
        let seg = self
            .table
            .get_mut(ptr.segment)
            .ok_or(ArenaError::invalid(ptr.segment, PointerFault::Unmapped))?;
        Ok(seg.bytes_mut(ptr.offset as usize, ptr.len))
    }

    /// Owner, mapping, discipline, and a live block under the handle's
    /// generation.
    fn locate_lifo(&self, ptr: &LifoPtr) -> Result<&Segment, ArenaError> {
        self.locate(
            ptr.owner,
            ptr.segment,
            ptr.generation,
            ptr.offset,
            Discipline::Lifo,
        )
    }

    /// The whole block must still be below the segment's cursor.
    fn check_lifo_extent(seg: &Segment, ptr: &LifoPtr) -> Result<(), ArenaError> {
        let ok = match seg.kind() {
            SegmentKind::Oversized { .. } => ptr.len <= seg.len(),
            _ => ptr.end() <= seg.used(),
        };
        if ok {
            Ok(())
        } else {
            Err(ArenaError::invalid(ptr.segment, PointerFault::OutOfBounds))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quarry_core::ContextId;

    use super::*;
    use crate::pages::{AnonymousPages, MapStats};

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
    fn blocks_stack_within_a_segment() {
        let (mut arena, _) = arena_with_stats(8);
        let a = arena.alloc_lifo(10).unwrap();
        let b = arena.alloc_lifo(10).unwrap();
        assert_eq!(a.segment(), b.segment());
        assert_eq!(b.offset(), 16);
        assert_eq!(arena.lifo_top(), Some(a.segment()));
    }

    #[test]
    fn interior_free_truncates_and_keeps_segment() {
        let (mut arena, _) = arena_with_stats(8);
        let _a = arena.alloc_lifo(16).unwrap();
        let b = arena.alloc_lifo(16).unwrap();
        let _c = arena.alloc_lifo(16).unwrap();
        let release = arena.free_lifo(b).unwrap();
        assert!(release.unmapped.is_empty());
        assert_eq!(release.truncated, Some(b.segment()));
        assert_eq!(release.new_top, Some(b.segment()));
        assert_eq!(arena.table().get(b.segment()).unwrap().used(), 16);
        let again = arena.alloc_lifo(8).unwrap();
        assert_eq!(again.offset(), 16);
    }

    #[test]
    fn round_trip_restores_state() {
        let (mut arena, stats) = arena_with_stats(8);
        let base = arena.alloc_lifo(32).unwrap();
        let top_before = arena.lifo_top();
        let used_before = arena.table().get(base.segment()).unwrap().used();
        let outstanding = stats.outstanding();

        let first = arena.alloc_lifo(SEG - 40).unwrap();
        arena.alloc_lifo(SEG / 2).unwrap();
        arena.alloc_lifo(SEG * 3).unwrap();
        arena.free_lifo(first).unwrap();

        assert_eq!(arena.lifo_top(), top_before);
        assert_eq!(
            arena.table().get(base.segment()).unwrap().used(),
            used_before
        );
        assert_eq!(stats.outstanding(), outstanding);
    }

    #[test]
    fn base_free_unmaps_and_lowers_top() {
        let (mut arena, stats) = arena_with_stats(8);
        let a = arena.alloc_lifo(SEG).unwrap();
        let b = arena.alloc_lifo(8).unwrap();
        assert_ne!(a.segment(), b.segment());
        let release = arena.free_lifo(b).unwrap();
        assert_eq!(release.unmapped.as_slice(), &[b.segment()]);
        assert_eq!(release.new_top, Some(a.segment()));
        let release = arena.free_lifo(a).unwrap();
        assert_eq!(release.new_top, None);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn walk_skips_bump_segments() {
        let (mut arena, _) = arena_with_stats(8);
        let l1 = arena.alloc_lifo(SEG).unwrap();
        let bump = arena.alloc(8).unwrap();
        let l2 = arena.alloc_lifo(8).unwrap();
        assert!(bump.segment() > l1.segment() && bump.segment() < l2.segment());

        let release = arena.free_lifo(l1).unwrap();
        assert_eq!(release.unmapped.as_slice(), &[l2.segment(), l1.segment()]);
        assert_eq!(arena.bytes(&bump).unwrap().len(), 8);
        assert_eq!(arena.lifo_top(), None);
    }

    #[test]
    fn oversized_lifo_block_gets_its_own_mapping() {
        let (mut arena, stats) = arena_with_stats(8);
        let page = arena.table().page_size();
        let big = arena.alloc_lifo(SEG + 1).unwrap();
        assert_eq!(stats.outstanding_pages() as usize, (SEG + 1).div_ceil(page));
        // The next small block cannot share the oversized mapping.
        let small = arena.alloc_lifo(8).unwrap();
        assert!(small.segment() > big.segment());
        let release = arena.free_lifo(big).unwrap();
        assert_eq!(release.unmapped.len(), 2);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn free_on_empty_stack_is_rejected() {
        let (mut arena, _) = arena_with_stats(8);
        let a = arena.alloc_lifo(8).unwrap();
        arena.free_lifo(a).unwrap();
        assert_eq!(
            arena.free_lifo(a),
            Err(ArenaError::invalid(a.segment(), PointerFault::LifoEmpty))
        );
    }

    #[test]
    fn already_released_block_is_rejected_without_mutation() {
        let (mut arena, _) = arena_with_stats(8);
        let a = arena.alloc_lifo(SEG).unwrap();
        let b = arena.alloc_lifo(8).unwrap();
        let c = arena.alloc_lifo(8).unwrap();
        arena.free_lifo(b).unwrap();
        // c's segment is gone.
        let err = arena.free_lifo(c).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidPointer { .. }));
        assert_eq!(arena.lifo_top(), Some(a.segment()));
        assert_eq!(arena.mapped_segments(), 1);
    }

    #[test]
    fn truncated_tail_block_is_no_longer_live() {
        let (mut arena, _) = arena_with_stats(8);
        let _a = arena.alloc_lifo(8).unwrap();
        let b = arena.alloc_lifo(8).unwrap();
        let c = arena.alloc_lifo(8).unwrap();
        arena.free_lifo(b).unwrap();
        assert_eq!(
            arena.lifo_bytes(&c),
            Err(ArenaError::invalid(c.segment(), PointerFault::NotLive))
        );
        assert_eq!(
            arena.free_lifo(c),
            Err(ArenaError::invalid(c.segment(), PointerFault::NotLive))
        );
    }

    #[test]
    fn released_handle_cannot_free_blocks_reusing_its_offset() {
        let (mut arena, _) = arena_with_stats(8);
        let base = arena.alloc_lifo(16).unwrap();
        let b = arena.alloc_lifo(16).unwrap();
        arena.free_lifo(b).unwrap();
        let c = arena.alloc_lifo(16).unwrap();
        let d = arena.alloc_lifo(16).unwrap();
        assert_eq!((c.segment(), c.offset()), (b.segment(), b.offset()));

        assert_eq!(
            arena.free_lifo(b),
            Err(ArenaError::invalid(b.segment(), PointerFault::NotLive))
        );
        assert_eq!(arena.table().get(base.segment()).unwrap().used(), 48);
        arena.lifo_bytes_mut(&d).unwrap().copy_from_slice(&[7u8; 16]);
        assert_eq!(arena.lifo_bytes(&d).unwrap(), &[7u8; 16]);
        assert_eq!(arena.lifo_bytes(&c).unwrap().len(), 16);

        arena.free_lifo(c).unwrap();
        assert!(arena.lifo_bytes(&base).is_ok());
    }

    #[test]
    fn unrepresentable_lifo_size_is_too_large() {
        let (mut arena, stats) = arena_with_stats(8);
        assert_eq!(
            arena.alloc_lifo(usize::MAX),
            Err(ArenaError::RequestTooLarge {
                requested: usize::MAX
            })
        );
        assert_eq!(arena.lifo_top(), None);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn lifo_bytes_are_writable() {
        let (mut arena, _) = arena_with_stats(8);
        let a = arena.alloc_lifo(5).unwrap();
        arena.lifo_bytes_mut(&a).unwrap().copy_from_slice(b"stack");
        assert_eq!(arena.lifo_bytes(&a).unwrap(), b"stack");
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn releasing_the_first_block_restores_empty_stack(
                sizes in prop::collection::vec(1usize..(3 * SEG), 1..12),
            ) {
                let (mut arena, stats) = arena_with_stats(32);
                let first = arena.alloc_lifo(sizes[0]).unwrap();
                for &size in &sizes[1..] {
                    arena.alloc_lifo(size).unwrap();
                }
                arena.free_lifo(first).unwrap();
                prop_assert_eq!(arena.lifo_top(), None);
                prop_assert_eq!(stats.outstanding(), 0);
            }
        }
    }
}
