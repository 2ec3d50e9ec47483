//! Low-level primitives that need the operating system directly.
//!
//! The only `unsafe` in the crate lives here: querying the page size.
//! Mapping and unmapping go through `memmap2`, which owns the raw
//! pointers.

#![allow(unsafe_code)]

/// Page size assumed when the platform cannot be queried.
pub(crate) const FALLBACK_PAGE_SIZE: usize = 4096;

/// The operating system's virtual-memory page size in bytes.
#[cfg(unix)]
pub(crate) fn system_page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions; it only reads a
    // configuration value and returns -1 on error.
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n <= 0 {
        FALLBACK_PAGE_SIZE
    } else {
        n as usize
    }
}

/// The operating system's virtual-memory page size in bytes.
#[cfg(not(unix))]
pub(crate) fn system_page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let n = system_page_size();
        assert!(n.is_power_of_two());
        assert!(n >= 512);
    }
}
