//! Result cache configuration.

/// Configuration for a [`ResultCache`](crate::ResultCache).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries kept. Zero disables caching.
    ///
    /// Default: 100. Adjustable at runtime with
    /// [`ResultCache::set_max_entries`](crate::ResultCache::set_max_entries).
    pub max_entries: u32,

    /// Longest accepted key in bytes. Default: 4096.
    pub max_key_len: usize,
}

impl CacheConfig {
    /// Default entry bound.
    pub const DEFAULT_MAX_ENTRIES: u32 = 100;

    /// Default key length limit.
    pub const DEFAULT_MAX_KEY_LEN: usize = 4096;

    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            max_entries: Self::DEFAULT_MAX_ENTRIES,
            max_key_len: Self::DEFAULT_MAX_KEY_LEN,
        }
    }

    /// Override the entry bound.
    pub fn with_max_entries(mut self, max_entries: u32) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Override the key length limit.
    pub fn with_max_key_len(mut self, max_key_len: usize) -> Self {
        self.max_key_len = max_key_len;
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_key_len == 0 {
            return Err("max_key_len must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}
