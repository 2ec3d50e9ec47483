//! Test utilities and mock types for Quarry development.
//!
//! Provides a [`MockDatabase`] implementing [`LastModified`] with a
//! manually driven watermark, plus small configurations and page mappers
//! in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::atomic::{AtomicU64, Ordering};

use quarry_core::{LastModified, Timestamp};

/// Database stand-in whose last-modified watermark tests set directly.
///
/// Starts at [`Timestamp::EPOCH`], so every cache entry stamped with a
/// real clock reading is fresh until [`touch`](MockDatabase::touch) is
/// called.
#[derive(Debug, Default)]
pub struct MockDatabase {
    last_modified: AtomicU64,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// A database last modified at `ts`.
    pub fn at(ts: Timestamp) -> Self {
        Self {
            last_modified: AtomicU64::new(ts.0),
        }
    }

    /// Record a modification now, invalidating every earlier result.
    pub fn touch(&self) -> Timestamp {
        let now = Timestamp::now();
        self.set(now);
        now
    }

    /// Set the watermark explicitly.
    pub fn set(&self, ts: Timestamp) {
        self.last_modified.store(ts.0, Ordering::Release);
    }
}

impl LastModified for MockDatabase {
    fn last_modified(&self) -> Timestamp {
        Timestamp(self.last_modified.load(Ordering::Acquire))
    }
}
