//! Collaborator traits implemented outside the engine core.

use crate::time::Timestamp;

/// The database's monotonic modification watermark.
///
/// Implemented by the storage layer. The result cache compares every
/// entry's creation time against this value: an entry created at or
/// before the last modification is stale.
pub trait LastModified {
    /// The time of the most recent write to the database.
    fn last_modified(&self) -> Timestamp;
}

impl<T: LastModified + ?Sized> LastModified for &T {
    fn last_modified(&self) -> Timestamp {
        (**self).last_modified()
    }
}

impl<T: LastModified + ?Sized> LastModified for std::sync::Arc<T> {
    fn last_modified(&self) -> Timestamp {
        (**self).last_modified()
    }
}

impl LastModified for Timestamp {
    fn last_modified(&self) -> Timestamp {
        *self
    }
}
