//! Benchmark workloads for the Quarry engine.
//!
//! - [`request_sizes`]: a deterministic mix of small and oversized
//!   allocation sizes shaped like query scratch usage.
//! - [`query_keys`]: distinct cache keys of realistic length.
//! - [`warm_cache`]: a cache pre-filled with `n` entries.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use quarry_cache::{CacheConfig, ResultCache};
use quarry_core::Timestamp;

/// `n` allocation sizes: mostly small, every 64th one larger than a
/// 64 KiB segment.
pub fn request_sizes(n: usize) -> Vec<usize> {
    // xorshift64, fixed seed.
    let mut state = 0x9e37_79b9_7f4a_7c15u64;
    (0..n)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            if i % 64 == 63 {
                (1 << 16) + (state % 4096) as usize
            } else {
                8 + (state % 248) as usize
            }
        })
        .collect()
}

/// `n` distinct query keys.
pub fn query_keys(n: usize) -> Vec<Vec<u8>> {
    (0..n)
        .map(|i| format!("select * from t where id = {i} order by k").into_bytes())
        .collect()
}

/// A cache bounded at `max_entries` holding the first `n` of [`query_keys`].
pub fn warm_cache(max_entries: u32, n: usize) -> ResultCache {
    let cache = ResultCache::new(CacheConfig::new().with_max_entries(max_entries));
    for key in query_keys(n) {
        // Fresh caches never report busy.
        let _ = cache.update(&key, &[0u8; 256], Timestamp(1));
    }
    cache
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_deterministic_and_mixed() {
        let a = request_sizes(128);
        assert_eq!(a, request_sizes(128));
        assert!(a.iter().any(|&s| s > 1 << 16));
        assert!(a.iter().filter(|&&s| s <= 256).count() > 100);
    }

    #[test]
    fn warm_cache_respects_bound() {
        let cache = warm_cache(10, 50);
        assert_eq!(cache.len(), 10);
    }
}
