//! Arena configuration parameters.

use crate::error::ArenaError;

/// Configuration for a context's segment arena.
///
/// Controls segment sizing and the capacity of the segment table.
/// Validated when a [`ContextArena`](crate::ContextArena) is created;
/// all values are immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Size of each fixed (bump or LIFO) segment in bytes.
    ///
    /// Default: 4MB. Must be a power of two and at least one OS page.
    /// Requests whose padded size exceeds this get a dedicated
    /// oversized mapping instead.
    pub segment_bytes: u32,

    /// Number of slots in the segment table.
    ///
    /// Default: 512. Every mapped segment (bump, LIFO, or oversized)
    /// occupies one slot until it is unmapped; when all slots are taken
    /// allocation fails with [`ArenaError::OutOfSegments`].
    pub max_segments: u16,
}

impl ArenaConfig {
    /// Default segment size: 4MB.
    pub const DEFAULT_SEGMENT_BYTES: u32 = 1 << 22;

    /// Default segment table capacity.
    pub const DEFAULT_MAX_SEGMENTS: u16 = 512;

    /// Allocation granularity. Every request is rounded up to a multiple.
    pub const ALIGN: usize = 8;

    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            segment_bytes: Self::DEFAULT_SEGMENT_BYTES,
            max_segments: Self::DEFAULT_MAX_SEGMENTS,
        }
    }

    /// Override the fixed segment size.
    pub fn with_segment_bytes(mut self, segment_bytes: u32) -> Self {
        self.segment_bytes = segment_bytes;
        self
    }

    /// Override the segment table capacity.
    pub fn with_max_segments(mut self, max_segments: u16) -> Self {
        self.max_segments = max_segments;
        self
    }

    /// Check structural invariants against the platform page size.
    pub fn validate(&self, page_size: usize) -> Result<(), ArenaError> {
        if !self.segment_bytes.is_power_of_two() {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "segment_bytes must be a power of two (got {})",
                    self.segment_bytes
                ),
            });
        }
        if (self.segment_bytes as usize) < page_size {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "segment_bytes ({}) is smaller than the page size ({page_size})",
                    self.segment_bytes
                ),
            });
        }
        if self.max_segments == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "max_segments must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Round `size` up to [`ArenaConfig::ALIGN`].
    ///
    /// Returns `None` if the rounded value would overflow `usize`.
    pub fn pad(size: usize) -> Option<usize> {
        size.checked_add(Self::ALIGN - 1)
            .map(|s| s & !(Self::ALIGN - 1))
    }

    /// Upper bound on fixed-segment memory: every slot mapped as a full segment.
    pub fn total_capacity_bytes(&self) -> usize {
        self.max_segments as usize * self.segment_bytes as usize
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new()
    }
}
