//! Segmented arena allocation for Quarry execution contexts.
//!
//! Every execution context owns one [`ContextArena`]: a fixed-capacity
//! table of anonymously mapped segments shared by two allocation
//! disciplines. Memory is reclaimed in bulk, either when a segment's
//! last allocation is released or when the context is finalized.
//!
//! # Architecture
//!
//! ```text
//! ContextArena (one per execution context)
//! ├── SegmentTable (max_segments slots, default 512)
//! │   └── Segment → MappedRegion (4MB fixed, or N whole pages)
//! │       └── SegmentKind: Bump | Lifo | Oversized
//! ├── current  ── bump segment being carved (ArenaPtr handles)
//! └── lifo_top ── top of the LIFO segment stack (LifoPtr handles)
//! ```
//!
//! # Disciplines
//!
//! - **Bump:** [`ContextArena::alloc`] carves from the current segment and
//!   counts live allocations; a segment is unmapped (or rewound, if still
//!   current) when its count drops to zero.
//! - **LIFO:** [`ContextArena::alloc_lifo`] buffers must be released in
//!   reverse order; [`ContextArena::free_lifo`] truncates or unmaps whole
//!   segments from the top of the stack.
//! - **Oversized:** requests larger than one segment get a dedicated
//!   mapping of whole pages, unmapped as soon as the block is freed.
//!
//! Handles ([`ArenaPtr`], [`LifoPtr`]) replace raw pointers with embedded
//! headers: they carry the owning context, slot index, carve generation,
//! offset and length, and every free or access validates them.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod arena;
mod bump;
pub mod config;
pub mod error;
pub mod handle;
pub mod lifo;
pub mod pages;
mod raw;
pub mod segment;

// Public re-exports for the primary API surface.
pub use arena::{ArenaStats, ContextArena};
pub use config::ArenaConfig;
pub use error::{ArenaError, PointerFault};
pub use handle::{ArenaPtr, LifoPtr};
pub use lifo::LifoRelease;
pub use pages::{AnonymousPages, MapStats, MappedRegion, PageMapper};
pub use segment::{Discipline, Segment, SegmentKind, SegmentTable};
