//! Slot-arena doubly linked list in recency order.
//!
//! Entries live in a `Vec` of slots addressed by [`EntryId`]; freed slots
//! are recycled through a free list. `head` is the most recently used
//! entry, `tail` the least.

use std::sync::Arc;

use quarry_core::Timestamp;

/// Index of an entry slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct EntryId(u32);

/// One cached result.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) key: Box<[u8]>,
    pub(crate) value: Arc<[u8]>,
    pub(crate) created: Timestamp,
    pub(crate) refs: u32,
    prev: Option<EntryId>,
    next: Option<EntryId>,
}

impl Entry {
    pub(crate) fn new(key: Box<[u8]>, value: Arc<[u8]>, created: Timestamp) -> Self {
        Self {
            key,
            value,
            created,
            refs: 0,
            prev: None,
            next: None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct LruList {
    slots: Vec<Option<Entry>>,
    free: Vec<EntryId>,
    head: Option<EntryId>,
    tail: Option<EntryId>,
    len: usize,
}

impl LruList {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn get(&self, id: EntryId) -> Option<&Entry> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    #[cfg(test)]
    pub(crate) fn head(&self) -> Option<EntryId> {
        self.head
    }

    /// Insert at the head (most recent).
    pub(crate) fn push_front(&mut self, mut entry: Entry) -> EntryId {
        entry.prev = None;
        entry.next = self.head;
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id.0 as usize] = Some(entry);
                id
            }
            None => {
                self.slots.push(Some(entry));
                EntryId((self.slots.len() - 1) as u32)
            }
        };
        match self.head {
            Some(old) => self.relink(old, |e| e.prev = Some(id)),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
        id
    }

    /// Move an entry to the head.
    pub(crate) fn touch(&mut self, id: EntryId) {
        if self.head == Some(id) || self.get(id).is_none() {
            return;
        }
        self.unlink(id);
        let old = self.head;
        self.relink(id, |e| {
            e.prev = None;
            e.next = old;
        });
        match old {
            Some(old) => self.relink(old, |e| e.prev = Some(id)),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    /// Unlink and return an entry.
    pub(crate) fn remove(&mut self, id: EntryId) -> Option<Entry> {
        self.get(id)?;
        self.unlink(id);
        let entry = self.slots[id.0 as usize].take()?;
        self.free.push(id);
        self.len -= 1;
        Some(entry)
    }

    /// Least recently used entry without outstanding references.
    pub(crate) fn lru_unreferenced(&self) -> Option<EntryId> {
        let mut cursor = self.tail;
        while let Some(id) = cursor {
            let entry = self.get(id)?;
            if entry.refs == 0 {
                return Some(id);
            }
            cursor = entry.prev;
        }
        None
    }

    /// Ids from most to least recent.
    pub(crate) fn ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        std::iter::successors(self.head, move |&id| self.get(id).and_then(|e| e.next))
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    fn unlink(&mut self, id: EntryId) {
        let (prev, next) = match self.get(id) {
            Some(e) => (e.prev, e.next),
            None => return,
        };
        match prev {
            Some(p) => self.relink(p, |e| e.next = next),
            None => self.head = next,
        }
        match next {
            Some(n) => self.relink(n, |e| e.prev = prev),
            None => self.tail = prev,
        }
    }

    /// Update the links of a listed entry.
    fn relink(&mut self, id: EntryId, f: impl FnOnce(&mut Entry)) {
        let entry = self.get_mut(id);
        debug_assert!(entry.is_some(), "linked entry {id:?} is vacant");
        if let Some(entry) = entry {
            f(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str) -> Entry {
        Entry::new(key.as_bytes().into(), Arc::from(&b"v"[..]), Timestamp(1))
    }

    fn keys(list: &LruList) -> Vec<String> {
        list.ids()
            .map(|id| String::from_utf8(list.get(id).unwrap().key.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn push_front_orders_by_recency() {
        let mut list = LruList::default();
        list.push_front(entry("a"));
        list.push_front(entry("b"));
        list.push_front(entry("c"));
        assert_eq!(keys(&list), ["c", "b", "a"]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn touch_moves_to_head() {
        let mut list = LruList::default();
        let a = list.push_front(entry("a"));
        list.push_front(entry("b"));
        list.push_front(entry("c"));
        list.touch(a);
        assert_eq!(keys(&list), ["a", "c", "b"]);
        assert_eq!(list.head(), Some(a));
    }

    #[test]
    fn remove_recycles_slot() {
        let mut list = LruList::default();
        list.push_front(entry("a"));
        let b = list.push_front(entry("b"));
        list.push_front(entry("c"));
        assert_eq!(&*list.remove(b).unwrap().key, b"b");
        assert_eq!(keys(&list), ["c", "a"]);
        let d = list.push_front(entry("d"));
        assert_eq!(d, b);
        assert!(list.remove(EntryId(99)).is_none());
    }

    #[test]
    fn touching_a_vacant_id_is_a_no_op() {
        let mut list = LruList::default();
        let a = list.push_front(entry("a"));
        let b = list.push_front(entry("b"));
        list.remove(a);
        list.touch(a);
        list.touch(EntryId(42));
        assert_eq!(keys(&list), ["b"]);
        assert_eq!(list.head(), Some(b));
    }

    #[test]
    fn lru_unreferenced_skips_pinned_entries() {
        let mut list = LruList::default();
        let a = list.push_front(entry("a"));
        let b = list.push_front(entry("b"));
        list.get_mut(a).unwrap().refs = 1;
        assert_eq!(list.lru_unreferenced(), Some(b));
        list.get_mut(b).unwrap().refs = 2;
        assert_eq!(list.lru_unreferenced(), None);
    }
}
