//! Anonymous page mappings backing arena segments.
//!
//! Segments never come from the global allocator: each one is a private
//! anonymous mapping obtained through a [`PageMapper`]. The default
//! [`AnonymousPages`] mapper delegates to `memmap2` and keeps running
//! counters in [`MapStats`], which is how the engine answers "how many
//! low-level mappings are outstanding".

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use memmap2::{MmapMut, MmapOptions};

use crate::error::ArenaError;
use crate::raw;

/// One private, zero-initialised anonymous mapping.
///
/// The mapping is released when the region is dropped. Fresh regions are
/// always zero-filled by the kernel.
pub struct MappedRegion {
    map: MmapMut,
}

impl MappedRegion {
    /// Map `len` bytes of anonymous memory.
    pub fn anonymous(len: usize) -> io::Result<Self> {
        let map = MmapOptions::new().len(len).map_anon()?;
        Ok(Self { map })
    }

    /// Length of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    /// The mapped bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

impl fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRegion")
            .field("addr", &self.map.as_ptr())
            .field("len", &self.map.len())
            .finish()
    }
}

/// Source of page-granular memory for a segment table.
///
/// Implementations must be shareable across contexts: the runtime hands
/// one mapper to every context it opens.
pub trait PageMapper: Send + Sync + fmt::Debug {
    /// Page size in bytes. Mapping lengths are multiples of this.
    fn page_size(&self) -> usize;

    /// Map `len` bytes of zeroed memory.
    fn map(&self, len: usize) -> Result<MappedRegion, ArenaError>;

    /// Return a region obtained from [`PageMapper::map`].
    fn unmap(&self, region: MappedRegion);

    /// Running counters, if the mapper keeps any.
    fn stats(&self) -> Option<&MapStats> {
        None
    }
}

/// Running counters for a mapper.
///
/// All counters are monotonic; [`MapStats::outstanding`] derives the
/// number of live mappings from them.
#[derive(Debug, Default)]
pub struct MapStats {
    regions_mapped: AtomicU64,
    regions_unmapped: AtomicU64,
    pages_mapped: AtomicU64,
    pages_unmapped: AtomicU64,
}

impl MapStats {
    /// Record a successful mapping of `pages` pages.
    pub fn record_map(&self, pages: u64) {
        self.regions_mapped.fetch_add(1, Ordering::Relaxed);
        self.pages_mapped.fetch_add(pages, Ordering::Relaxed);
    }

    /// Record the release of a mapping of `pages` pages.
    pub fn record_unmap(&self, pages: u64) {
        self.regions_unmapped.fetch_add(1, Ordering::Relaxed);
        self.pages_unmapped.fetch_add(pages, Ordering::Relaxed);
    }

    /// Total regions mapped so far.
    pub fn regions_mapped(&self) -> u64 {
        self.regions_mapped.load(Ordering::Relaxed)
    }

    /// Total regions unmapped so far.
    pub fn regions_unmapped(&self) -> u64 {
        self.regions_unmapped.load(Ordering::Relaxed)
    }

    /// Total pages mapped so far.
    pub fn pages_mapped(&self) -> u64 {
        self.pages_mapped.load(Ordering::Relaxed)
    }

    /// Total pages unmapped so far.
    pub fn pages_unmapped(&self) -> u64 {
        self.pages_unmapped.load(Ordering::Relaxed)
    }

    /// Regions currently mapped (mapped minus unmapped).
    pub fn outstanding(&self) -> u64 {
        self.regions_mapped()
            .saturating_sub(self.regions_unmapped())
    }

    /// Pages currently mapped.
    pub fn outstanding_pages(&self) -> u64 {
        self.pages_mapped().saturating_sub(self.pages_unmapped())
    }
}

/// Default mapper: private anonymous mappings via `memmap2`.
#[derive(Clone, Debug)]
pub struct AnonymousPages {
    page_size: usize,
    stats: Arc<MapStats>,
}

impl AnonymousPages {
    /// Create a mapper using the operating system's page size.
    pub fn new() -> Self {
        Self {
            page_size: raw::system_page_size(),
            stats: Arc::new(MapStats::default()),
        }
    }

    /// Shared handle to this mapper's counters.
    pub fn shared_stats(&self) -> Arc<MapStats> {
        Arc::clone(&self.stats)
    }

    fn pages(&self, len: usize) -> u64 {
        len.div_ceil(self.page_size) as u64
    }
}

impl Default for AnonymousPages {
    fn default() -> Self {
        Self::new()
    }
}

impl PageMapper for AnonymousPages {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn map(&self, len: usize) -> Result<MappedRegion, ArenaError> {
        match MappedRegion::anonymous(len) {
            Ok(region) => {
                self.stats.record_map(self.pages(len));
                Ok(region)
            }
            Err(e) => {
                tracing::warn!(error = %e, bytes = len, "anonymous mapping failed");
                Err(ArenaError::OutOfMemory { requested: len })
            }
        }
    }

    fn unmap(&self, region: MappedRegion) {
        self.stats.record_unmap(self.pages(region.len()));
        drop(region);
    }

    fn stats(&self) -> Option<&MapStats> {
        Some(&self.stats)
    }
}
