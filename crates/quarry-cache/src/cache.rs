//! The shared result cache.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use quarry_core::{LastModified, Timestamp};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::lru::{Entry, EntryId, LruList};

/// Counters describing cache activity since creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups not served, stale ones included.
    pub misses: u64,
    /// Misses caused by an entry older than the last modification.
    pub stale_misses: u64,
    /// Entries removed to honour the entry bound or by `expire`.
    pub evictions: u64,
    /// Updates rejected because the entry was referenced.
    pub busy: u64,
    /// Entries currently cached.
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner {
    list: LruList,
    index: HashMap<Box<[u8]>, EntryId>,
    max_entries: u32,
    stats: CacheStats,
}

impl Inner {
    fn remove(&mut self, id: EntryId) -> Option<Entry> {
        let entry = self.list.remove(id)?;
        self.index.remove(&entry.key);
        Some(entry)
    }

    /// Evict the least recently used unreferenced entry.
    fn evict_one(&mut self) -> bool {
        let Some(id) = self.list.lru_unreferenced() else {
            return false;
        };
        if let Some(entry) = self.remove(id) {
            tracing::debug!(key_len = entry.key.len(), "cache entry evicted");
            self.stats.evictions += 1;
        }
        true
    }

    fn trim(&mut self) {
        while self.list.len() > self.max_entries as usize {
            if !self.evict_one() {
                break;
            }
        }
    }
}

/// Process-wide, refcounted LRU cache of query results.
///
/// All operations take `&self` and serialise on one internal mutex.
/// Values are immutable `Arc<[u8]>` buffers, so a caller holding a fetched
/// value never observes it change.
pub struct ResultCache {
    max_key_len: usize,
    inner: Mutex<Inner>,
}

impl ResultCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            max_key_len: config.max_key_len,
            inner: Mutex::new(Inner {
                list: LruList::default(),
                index: HashMap::new(),
                max_entries: config.max_entries,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Look up `key`, pinning the entry on a hit.
    ///
    /// Entries created at or before `db`'s last modification are stale:
    /// the lookup misses and the entry is dropped if nobody references it.
    /// Every hit must be balanced by one [`ResultCache::unref`].
    pub fn fetch(&self, key: &[u8], db: &dyn LastModified) -> Option<Arc<[u8]>> {
        let watermark = db.last_modified();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(&id) = inner.index.get(key) else {
            inner.stats.misses += 1;
            return None;
        };
        let entry = inner.list.get_mut(id)?;
        if entry.created <= watermark {
            let unreferenced = entry.refs == 0;
            inner.stats.misses += 1;
            inner.stats.stale_misses += 1;
            if unreferenced {
                inner.remove(id);
            }
            return None;
        }
        entry.refs += 1;
        let value = Arc::clone(&entry.value);
        inner.list.touch(id);
        inner.stats.hits += 1;
        Some(value)
    }

    /// Release one reference taken by [`ResultCache::fetch`].
    ///
    /// Returns `false` if the key is unknown or unreferenced.
    pub fn unref(&self, key: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        let Some(&id) = inner.index.get(key) else {
            return false;
        };
        match inner.list.get_mut(id) {
            Some(entry) if entry.refs > 0 => {
                entry.refs -= 1;
                true
            }
            _ => false,
        }
    }

    /// Insert or replace the result for `key`.
    ///
    /// The value is copied before the cache is locked. Replacing an entry
    /// that is still referenced fails with [`CacheError::ResourceBusy`].
    /// Afterwards, unreferenced entries are evicted from the LRU end until
    /// the entry bound holds again. With a bound of zero this is a no-op.
    pub fn update(&self, key: &[u8], value: &[u8], created: Timestamp) -> Result<(), CacheError> {
        if key.len() > self.max_key_len {
            return Err(CacheError::KeyTooLong {
                len: key.len(),
                max: self.max_key_len,
            });
        }
        let value: Arc<[u8]> = Arc::from(value);
        let key: Box<[u8]> = Box::from(key);

        let mut inner = self.inner.lock();
        if inner.max_entries == 0 {
            return Ok(());
        }
        if let Some(&id) = inner.index.get(&key) {
            let refs = inner.list.get(id).map_or(0, |e| e.refs);
            if refs > 0 {
                inner.stats.busy += 1;
                tracing::warn!(refs, key_len = key.len(), "cache update on referenced entry");
                return Err(CacheError::ResourceBusy { refs });
            }
            inner.remove(id);
        }
        let id = inner.list.push_front(Entry::new(key.clone(), value, created));
        inner.index.insert(key, id);
        inner.trim();
        Ok(())
    }

    /// Evict up to `n` unreferenced entries, least recently used first.
    ///
    /// Returns how many were evicted.
    pub fn expire(&self, n: usize) -> usize {
        let mut inner = self.inner.lock();
        let mut evicted = 0;
        while evicted < n && inner.evict_one() {
            evicted += 1;
        }
        evicted
    }

    /// Current entry bound.
    pub fn max_entries(&self) -> u32 {
        self.inner.lock().max_entries
    }

    /// Change the entry bound, trimming immediately if it shrank.
    pub fn set_max_entries(&self, max_entries: u32) {
        let mut inner = self.inner.lock();
        inner.max_entries = max_entries;
        inner.trim();
    }

    /// Longest accepted key in bytes.
    pub fn max_key_len(&self) -> usize {
        self.max_key_len
    }

    /// Fetch `key` and wrap the hit in a guard that unrefs on drop.
    pub fn lease(&self, key: &[u8], db: &dyn LastModified) -> Option<CacheLease<'_>> {
        let value = self.fetch(key, db)?;
        Some(CacheLease {
            cache: self,
            key: Box::from(key),
            value,
        })
    }

    /// Drop every entry regardless of references. Returns how many.
    ///
    /// Intended for shutdown; outstanding `unref` calls become no-ops.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let n = inner.list.len();
        inner.list.clear();
        inner.index.clear();
        if n > 0 {
            tracing::debug!(entries = n, "cache cleared");
        }
        n
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().list.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outstanding references on `key`, if cached.
    pub fn refs(&self, key: &[u8]) -> Option<u32> {
        let inner = self.inner.lock();
        let id = *inner.index.get(key)?;
        inner.list.get(id).map(|e| e.refs)
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<Box<[u8]>> {
        let inner = self.inner.lock();
        inner
            .list
            .ids()
            .filter_map(|id| inner.list.get(id).map(|e| e.key.clone()))
            .collect()
    }

    /// Activity counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.list.len(),
            ..inner.stats
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ResultCache")
            .field("entries", &inner.list.len())
            .field("max_entries", &inner.max_entries)
            .field("max_key_len", &self.max_key_len)
            .finish()
    }
}

/// A pinned cache hit, released when dropped.
pub struct CacheLease<'a> {
    cache: &'a ResultCache,
    key: Box<[u8]>,
    value: Arc<[u8]>,
}

impl CacheLease<'_> {
    /// The cached bytes, shared.
    pub fn value(&self) -> &Arc<[u8]> {
        &self.value
    }

    /// The key this lease pins.
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl Deref for CacheLease<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.value
    }
}

impl Drop for CacheLease<'_> {
    fn drop(&mut self) {
        self.cache.unref(&self.key);
    }
}

impl fmt::Debug for CacheLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLease")
            .field("key_len", &self.key.len())
            .field("value_len", &self.value.len())
            .finish()
    }
}
