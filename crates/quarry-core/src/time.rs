//! Microsecond timestamps used for cache staleness.
//!
//! The database exposes a monotonic "last modified" watermark and the
//! cache stamps every entry with the time its producing query started.
//! Both are plain [`Timestamp`] values so they compare directly.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The epoch itself. Every entry is fresh relative to a database that
    /// has never been modified.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// The current wall-clock time.
    ///
    /// A clock set before 1970 reads as [`Timestamp::EPOCH`].
    pub fn now() -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self(since.as_micros().min(u64::MAX as u128) as u64)
    }

    /// Build a timestamp from whole seconds and a microsecond remainder.
    pub fn from_parts(secs: u64, micros: u32) -> Self {
        Self(secs.saturating_mul(1_000_000).saturating_add(u64::from(micros)))
    }

    /// Whole seconds since the epoch.
    pub fn secs(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Sub-second remainder in microseconds.
    pub fn subsec_micros(self) -> u32 {
        (self.0 % 1_000_000) as u32
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs(), self.subsec_micros())
    }
}

impl From<u64> for Timestamp {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
