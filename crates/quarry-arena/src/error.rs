//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use quarry_core::{ContextId, ErrorCode};

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// Every slot of the segment table holds a live mapping.
    OutOfSegments {
        /// Capacity of the segment table.
        max_segments: u16,
    },
    /// The request would need 2^32 or more pages, or its size overflows.
    RequestTooLarge {
        /// Number of bytes requested.
        requested: usize,
    },
    /// A handle is inconsistent with the context's segment table.
    InvalidPointer {
        /// Segment index recorded in the handle.
        segment: u16,
        /// What exactly did not match.
        fault: PointerFault,
    },
    /// The operating system refused the mapping.
    OutOfMemory {
        /// Number of bytes the mapping needed.
        requested: usize,
    },
    /// The arena configuration violates a structural invariant.
    InvalidConfig {
        /// Human-readable explanation.
        reason: String,
    },
}

impl ArenaError {
    /// Flat error code for context error state and client reporting.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OutOfSegments { .. } => ErrorCode::OutOfSegments,
            Self::RequestTooLarge { .. } => ErrorCode::RequestTooLarge,
            Self::InvalidPointer { .. } => ErrorCode::InvalidPointer,
            Self::OutOfMemory { .. } => ErrorCode::OutOfMemory,
            Self::InvalidConfig { .. } => ErrorCode::InvalidArgument,
        }
    }

    pub(crate) fn invalid(segment: u16, fault: PointerFault) -> Self {
        Self::InvalidPointer { segment, fault }
    }
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfSegments { max_segments } => {
                write!(f, "all {max_segments} segments are full")
            }
            Self::RequestTooLarge { requested } => {
                write!(f, "too long request size={requested}")
            }
            Self::InvalidPointer { segment, fault } => {
                write!(f, "invalid pointer passed (seg={segment}): {fault}")
            }
            Self::OutOfMemory { requested } => {
                write!(f, "anonymous mapping of {requested} bytes failed")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid arena config: {reason}")
            }
        }
    }
}

impl Error for ArenaError {}

/// Why a handle was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerFault {
    /// The handle was issued by a different context.
    WrongContext {
        /// Context that issued the handle.
        owner: ContextId,
    },
    /// The segment index is beyond the table's capacity.
    SegmentOutOfRange,
    /// The slot holds no mapping.
    Unmapped,
    /// The slot was unmapped and mapped again since the handle was issued.
    StaleGeneration {
        /// Generation recorded in the handle.
        handle: u64,
        /// Generation of the current mapping.
        current: u64,
    },
    /// A bump handle points into a LIFO segment, or vice versa.
    DisciplineMismatch,
    /// The byte range lies outside the allocated part of the segment.
    OutOfBounds,
    /// No live block starts at the handle's offset under its generation:
    /// the block was already released (double free) or its offset has
    /// since been reused by a newer block.
    NotLive,
    /// No LIFO segment is open.
    LifoEmpty,
    /// The LIFO handle is above the current top of the stack.
    AboveLifoTop {
        /// Current top segment index.
        top: u16,
    },
}

impl fmt::Display for PointerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongContext { owner } => write!(f, "handle belongs to {owner}"),
            Self::SegmentOutOfRange => f.write_str("segment index out of range"),
            Self::Unmapped => f.write_str("segment is not mapped"),
            Self::StaleGeneration { handle, current } => {
                write!(f, "stale handle generation {handle}, segment is at {current}")
            }
            Self::DisciplineMismatch => f.write_str("allocation discipline mismatch"),
            Self::OutOfBounds => f.write_str("range outside allocated region"),
            Self::NotLive => f.write_str("block is not live"),
            Self::LifoEmpty => f.write_str("lifo buffer is void"),
            Self::AboveLifoTop { top } => write!(f, "above lifo top {top}"),
        }
    }
}
