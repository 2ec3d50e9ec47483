//! Allocation handles.
//!
//! Handles replace raw pointers with an embedded size header. An
//! [`ArenaPtr`] or [`LifoPtr`] records everything needed to locate and
//! release its block in O(1): the issuing context, the segment slot, the
//! generation the block was carved under, the byte offset, and the
//! requested length. The two types are distinct so bump and LIFO blocks cannot be
//! released through the wrong discipline.

use std::fmt;

use quarry_core::ContextId;

use crate::config::ArenaConfig;

macro_rules! arena_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[must_use]
        pub struct $name {
            /// Context that issued this handle.
            pub(crate) owner: ContextId,
            /// Slot index in the owner's segment table.
            pub(crate) segment: u16,
            /// Generation issued when the block was carved.
            pub(crate) generation: u64,
            /// Byte offset within the segment.
            pub(crate) offset: u32,
            /// Requested length in bytes.
            pub(crate) len: usize,
        }

        impl $name {
            pub(crate) fn new(
                owner: ContextId,
                segment: u16,
                generation: u64,
                offset: u32,
                len: usize,
            ) -> Self {
                Self {
                    owner,
                    segment,
                    generation,
                    offset,
                    len,
                }
            }

            /// Context that issued this handle.
            pub fn owner(&self) -> ContextId {
                self.owner
            }

            /// Segment slot index.
            pub fn segment(&self) -> u16 {
                self.segment
            }

            /// Generation issued to the block when it was carved.
            pub fn generation(&self) -> u64 {
                self.generation
            }

            /// Byte offset within the segment.
            pub fn offset(&self) -> u32 {
                self.offset
            }

            /// Requested length in bytes.
            pub fn len(&self) -> usize {
                self.len
            }

            /// Whether this is a zero-length allocation.
            pub fn is_empty(&self) -> bool {
                self.len == 0
            }

            /// Bytes the block occupies in its segment (length rounded up to
            /// [`ArenaConfig::ALIGN`]).
            pub fn padded_len(&self) -> usize {
                // Issued handles were padded successfully at allocation.
                ArenaConfig::pad(self.len).unwrap_or(self.len)
            }

            pub(crate) fn end(&self) -> usize {
                self.offset as usize + self.padded_len()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "{}({}, seg={}, gen={}, off={}, len={})",
                    stringify!($name),
                    self.owner,
                    self.segment,
                    self.generation,
                    self.offset,
                    self.len
                )
            }
        }
    };
}

arena_handle! {
    /// Handle to a bump (or oversized bump) allocation.
    ///
    /// Returned by [`ContextArena::alloc`](crate::ContextArena::alloc) and
    /// friends; released with [`ContextArena::free`](crate::ContextArena::free).
    ArenaPtr
}

arena_handle! {
    /// Handle to a LIFO allocation.
    ///
    /// Returned by [`ContextArena::alloc_lifo`](crate::ContextArena::alloc_lifo);
    /// released with [`ContextArena::free_lifo`](crate::ContextArena::free_lifo),
    /// which also releases everything allocated after it.
    LifoPtr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_accessors() {
        let owner = ContextId::next();
        let h = ArenaPtr::new(owner, 3, 42, 1024, 10);
        assert_eq!(h.owner(), owner);
        assert_eq!(h.segment(), 3);
        assert_eq!(h.generation(), 42);
        assert_eq!(h.offset(), 1024);
        assert_eq!(h.len(), 10);
        assert_eq!(h.padded_len(), 16);
        assert_eq!(h.end(), 1040);
        assert!(!h.is_empty());
    }

    #[test]
    fn empty_handle() {
        let h = LifoPtr::new(ContextId::next(), 0, 0, 0, 0);
        assert!(h.is_empty());
        assert_eq!(h.padded_len(), 0);
    }

    #[test]
    fn display_names_type_and_location() {
        let owner = ContextId::next();
        let h = LifoPtr::new(owner, 1, 2, 8, 5);
        assert_eq!(
            h.to_string(),
            format!("LifoPtr({owner}, seg=1, gen=2, off=8, len=5)")
        );
    }
}
