//! Segment descriptors and the fixed-capacity segment table.
//!
//! A [`Segment`] is one anonymous mapping plus the bookkeeping of the
//! discipline that carves it. A [`SegmentTable`] is the per-context array
//! of `max_segments` slots; a slot is either empty or holds exactly one
//! mapped segment. Slots are assigned first-free from a starting index,
//! so table order doubles as LIFO stack order.
//!
//! Generations come from one counter per table. A segment takes one when
//! it is mapped and every block carved from it takes the next one, so a
//! block's generation is never below its segment's and a handle outlives
//! neither a remap of its slot nor the release of its block.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ArenaError, PointerFault};
use crate::pages::{MappedRegion, PageMapper};

/// Allocation discipline a segment serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Discipline {
    /// Refcounted bump allocation.
    Bump,
    /// Stack (last-in first-out) allocation.
    Lifo,
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bump => f.write_str("bump"),
            Self::Lifo => f.write_str("lifo"),
        }
    }
}

/// What a mapped segment is used for, with that use's bookkeeping.
///
/// The discipline of a segment never changes while it is mapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    /// Fixed-size bump segment.
    Bump {
        /// Next free byte offset.
        cursor: u32,
        /// The segment was rewound and may hold old data.
        dirty: bool,
    },
    /// Fixed-size LIFO segment.
    Lifo {
        /// Next free byte offset.
        cursor: u32,
    },
    /// A single allocation spanning whole pages.
    Oversized {
        /// Number of pages mapped.
        pages: u32,
        /// Discipline the allocation belongs to.
        discipline: Discipline,
    },
}

impl SegmentKind {
    /// A fresh bump segment.
    pub const FRESH_BUMP: Self = Self::Bump {
        cursor: 0,
        dirty: false,
    };

    /// A fresh LIFO segment.
    pub const FRESH_LIFO: Self = Self::Lifo { cursor: 0 };

    /// Discipline served by this segment.
    pub fn discipline(&self) -> Discipline {
        match self {
            Self::Bump { .. } => Discipline::Bump,
            Self::Lifo { .. } => Discipline::Lifo,
            Self::Oversized { discipline, .. } => *discipline,
        }
    }

    /// Whether this is a dedicated oversized mapping.
    pub fn is_oversized(&self) -> bool {
        matches!(self, Self::Oversized { .. })
    }

    /// Bytes handed out so far. Oversized segments are fully in use.
    pub fn used(&self, region_len: usize) -> usize {
        match self {
            Self::Bump { cursor, .. } | Self::Lifo { cursor } => *cursor as usize,
            Self::Oversized { .. } => region_len,
        }
    }
}

/// One mapped segment.
pub struct Segment {
    region: MappedRegion,
    kind: SegmentKind,
    generation: u64,
    /// Live blocks of a fixed segment: offset to carve generation.
    blocks: BTreeMap<u32, u64>,
}

impl Segment {
    /// Bookkeeping for this segment.
    pub fn kind(&self) -> &SegmentKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut SegmentKind {
        &mut self.kind
    }

    /// Mapping generation. Strictly increases across mappings within a table.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of live blocks carved from a fixed segment. Oversized
    /// segments do not track blocks and report zero.
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Carve generation of the live block starting at `offset`.
    pub(crate) fn block_generation(&self, offset: u32) -> Option<u64> {
        self.blocks.get(&offset).copied()
    }

    pub(crate) fn insert_block(&mut self, offset: u32, generation: u64) {
        debug_assert!(generation > self.generation);
        self.blocks.insert(offset, generation);
    }

    pub(crate) fn remove_block(&mut self, offset: u32) -> Option<u64> {
        self.blocks.remove(&offset)
    }

    /// Forget the block at `offset` and every block above it.
    pub(crate) fn truncate_blocks(&mut self, offset: u32) {
        self.blocks.split_off(&offset);
    }

    /// Size of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Bytes handed out so far.
    pub fn used(&self) -> usize {
        self.kind.used(self.region.len())
    }

    /// Bytes still available for carving.
    pub fn remaining(&self) -> usize {
        self.len() - self.used()
    }

    pub(crate) fn bytes(&self, start: usize, len: usize) -> &[u8] {
        &self.region.as_slice()[start..start + len]
    }

    pub(crate) fn bytes_mut(&mut self, start: usize, len: usize) -> &mut [u8] {
        &mut self.region.as_mut_slice()[start..start + len]
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("kind", &self.kind)
            .field("generation", &self.generation)
            .field("live_blocks", &self.blocks.len())
            .field("len", &self.region.len())
            .finish()
    }
}

/// Fixed-capacity table of segment slots for one context.
///
/// Owns its mappings: every segment still mapped is released through the
/// table's [`PageMapper`] when the table is dropped.
pub struct SegmentTable {
    slots: Vec<Option<Segment>>,
    segment_bytes: u32,
    mapper: Arc<dyn PageMapper>,
    next_generation: u64,
}

impl SegmentTable {
    /// Create an empty table with `max_segments` slots.
    pub fn new(segment_bytes: u32, max_segments: u16, mapper: Arc<dyn PageMapper>) -> Self {
        let mut slots = Vec::with_capacity(max_segments as usize);
        slots.resize_with(max_segments as usize, || None);
        Self {
            slots,
            segment_bytes,
            mapper,
            next_generation: 1,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> u16 {
        self.slots.len() as u16
    }

    /// Size of fixed segments in bytes.
    pub fn segment_bytes(&self) -> u32 {
        self.segment_bytes
    }

    /// Page size of the underlying mapper.
    pub fn page_size(&self) -> usize {
        self.mapper.page_size()
    }

    /// First empty slot at or after `start`.
    pub fn find_free(&self, start: usize) -> Result<u16, ArenaError> {
        self.slots
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, slot)| slot.is_none())
            .map(|(i, _)| i as u16)
            .ok_or(ArenaError::OutOfSegments {
                max_segments: self.capacity(),
            })
    }

    /// Number of whole pages needed to hold `size` bytes.
    pub fn pages_for(&self, size: usize) -> Result<u32, ArenaError> {
        let pages = size.div_ceil(self.page_size());
        u32::try_from(pages).map_err(|_| ArenaError::RequestTooLarge { requested: size })
    }

    /// Take the next generation from the table's counter.
    pub(crate) fn issue_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Map a fixed-size segment of `kind` into `slot`.
    pub fn map_fixed(&mut self, slot: u16, kind: SegmentKind) -> Result<&mut Segment, ArenaError> {
        self.install(slot, self.segment_bytes as usize, kind)
    }

    /// Map `pages` whole pages into `slot` as an oversized segment.
    pub fn map_pages(
        &mut self,
        slot: u16,
        pages: u32,
        discipline: Discipline,
    ) -> Result<&mut Segment, ArenaError> {
        let len = (pages as usize)
            .checked_mul(self.page_size())
            .ok_or(ArenaError::RequestTooLarge {
                requested: usize::MAX,
            })?;
        self.install(slot, len, SegmentKind::Oversized { pages, discipline })
    }

    fn install(
        &mut self,
        slot: u16,
        len: usize,
        kind: SegmentKind,
    ) -> Result<&mut Segment, ArenaError> {
        debug_assert!(self.slots[slot as usize].is_none(), "slot {slot} occupied");
        let region = self.mapper.map(len)?;
        let generation = self.issue_generation();
        tracing::debug!(slot, bytes = len, generation, kind = ?kind, "segment mapped");
        Ok(self.slots[slot as usize].insert(Segment {
            region,
            kind,
            generation,
            blocks: BTreeMap::new(),
        }))
    }

    /// Unmap the segment in `slot`, returning its final bookkeeping.
    pub fn unmap(&mut self, slot: u16) -> Option<SegmentKind> {
        let seg = self.slots.get_mut(slot as usize)?.take()?;
        tracing::debug!(slot, bytes = seg.len(), kind = ?seg.kind, "segment unmapped");
        let kind = seg.kind;
        self.mapper.unmap(seg.region);
        Some(kind)
    }

    /// The segment in `slot`, if mapped.
    pub fn get(&self, slot: u16) -> Option<&Segment> {
        self.slots.get(slot as usize)?.as_ref()
    }

    /// The segment in `slot`, mutably, if mapped.
    pub fn get_mut(&mut self, slot: u16) -> Option<&mut Segment> {
        self.slots.get_mut(slot as usize)?.as_mut()
    }

    /// Number of mapped segments.
    pub fn mapped_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Iterate over mapped segments with their slot indices.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Segment)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|seg| (i as u16, seg)))
    }

    /// Copy `len` bytes between two (possibly identical) mapped segments.
    ///
    /// Fails with [`PointerFault::Unmapped`] or [`PointerFault::OutOfBounds`]
    /// without copying anything if either side does not resolve.
    pub(crate) fn copy_bytes(
        &mut self,
        src: (u16, usize),
        dst: (u16, usize),
        len: usize,
    ) -> Result<(), ArenaError> {
        let (src_slot, src_off) = src;
        let (dst_slot, dst_off) = dst;
        for (slot, off) in [src, dst] {
            let seg = self
                .get(slot)
                .ok_or(ArenaError::invalid(slot, PointerFault::Unmapped))?;
            if off.checked_add(len).is_none_or(|end| end > seg.len()) {
                return Err(ArenaError::invalid(slot, PointerFault::OutOfBounds));
            }
        }
        if src_slot == dst_slot {
            if let Some(seg) = self.get_mut(src_slot) {
                seg.region
                    .as_mut_slice()
                    .copy_within(src_off..src_off + len, dst_off);
            }
            return Ok(());
        }
        let (src_slot, dst_slot) = (src_slot as usize, dst_slot as usize);
        let (from, to) = if src_slot < dst_slot {
            let (lo, hi) = self.slots.split_at_mut(dst_slot);
            (&lo[src_slot], &mut hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(src_slot);
            (&hi[0], &mut lo[dst_slot])
        };
        if let (Some(from), Some(to)) = (from.as_ref(), to.as_mut()) {
            to.bytes_mut(dst_off, len)
                .copy_from_slice(from.bytes(src_off, len));
        }
        Ok(())
    }

    /// Unmap every segment. Returns how many were mapped.
    pub fn release_all(&mut self) -> usize {
        let mut released = 0;
        for slot in 0..self.slots.len() {
            if self.unmap(slot as u16).is_some() {
                released += 1;
            }
        }
        released
    }
}

impl fmt::Debug for SegmentTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentTable")
            .field("capacity", &self.slots.len())
            .field("mapped", &self.mapped_count())
            .field("segment_bytes", &self.segment_bytes)
            .finish()
    }
}

impl Drop for SegmentTable {
    fn drop(&mut self) {
        self.release_all();
    }
}
