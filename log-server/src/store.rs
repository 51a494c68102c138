//! Fixed-capacity ring of log entries.
//!
//! The store is a plain data structure with no locking of its own; the
//! [`LogService`](crate::service::LogService) serializes access to it.
//! Entries are appended at `in_offs` and the oldest retained entry sits at
//! `out_offs`. Once every slot holds an entry the next append displaces the
//! oldest one, so the store always retains the most recent `capacity`
//! commands.

use crate::error::LogError;
use crate::offset::OffsetIndex;

/// Number of entries retained when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 10;

/// One stored command: its bytes, terminating line feed included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    bytes: Box<[u8]>,
}

impl Entry {
    /// Copies `bytes` into a freshly reserved buffer.
    ///
    /// Reservation is fallible so that a huge command fails only the caller
    /// instead of aborting the process.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, LogError> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(bytes.len())
            .map_err(|_| LogError::Allocation {
                requested: bytes.len(),
            })?;
        buffer.extend_from_slice(bytes);
        Ok(Self {
            bytes: buffer.into_boxed_slice(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Circular buffer of [`Entry`] values with overwrite-on-full semantics.
///
/// Invariant: when `full`, every slot holds an entry and
/// `out_offs == in_offs`. Otherwise the valid entries are the
/// `(in_offs - out_offs) mod capacity` slots starting at `out_offs`, and every
/// other slot is `None`.
#[derive(Debug)]
pub struct EntryStore {
    slots: Vec<Option<Entry>>,
    in_offs: usize,
    out_offs: usize,
    full: bool,
}

impl EntryStore {
    /// Creates an empty store retaining at most `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "entry store capacity must be non-zero");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            in_offs: 0,
            out_offs: 0,
            full: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn is_empty(&self) -> bool {
        !self.full && self.in_offs == self.out_offs
    }

    /// Stores `entry` in the next slot.
    ///
    /// When the store is already full the oldest entry is displaced and
    /// returned; dropping it releases its buffer.
    pub fn append(&mut self, entry: Entry) -> Option<Entry> {
        let previous = self.slots[self.in_offs].replace(entry);
        let displaced = if self.full {
            previous
        } else {
            debug_assert!(previous.is_none(), "slot outside the valid range held an entry");
            None
        };

        self.in_offs = self.wrap(self.in_offs + 1);
        if self.full {
            self.out_offs = self.in_offs;
        } else if self.in_offs == self.out_offs {
            self.full = true;
        }

        displaced
    }

    pub fn entry_count(&self) -> usize {
        if self.full {
            self.capacity()
        } else {
            (self.in_offs + self.capacity() - self.out_offs) % self.capacity()
        }
    }

    /// Length of the logical concatenation of all retained entries.
    pub fn total_bytes(&self) -> usize {
        self.iter().map(Entry::len).sum()
    }

    /// The `index`-th oldest retained entry.
    pub fn entry_at_logical_index(&self, index: usize) -> Option<&Entry> {
        if index >= self.entry_count() {
            return None;
        }
        self.slots[self.wrap(self.out_offs + index)].as_ref()
    }

    /// Retained entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        (0..self.entry_count()).filter_map(move |index| self.entry_at_logical_index(index))
    }

    /// Offset translation over the current content.
    pub fn index(&self) -> OffsetIndex<'_> {
        OffsetIndex::new(self)
    }

    fn wrap(&self, physical: usize) -> usize {
        physical % self.capacity()
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> Entry {
        Entry::try_from_slice(text.as_bytes()).expect("allocate entry")
    }

    fn contents(store: &EntryStore) -> Vec<String> {
        store
            .iter()
            .map(|entry| String::from_utf8_lossy(entry.as_bytes()).into_owned())
            .collect()
    }

    #[test]
    fn empty_store_has_no_entries() {
        let store = EntryStore::default();
        assert_eq!(store.capacity(), DEFAULT_CAPACITY);
        assert!(store.is_empty());
        assert!(!store.is_full());
        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.total_bytes(), 0);
        assert!(store.entry_at_logical_index(0).is_none());
    }

    #[test]
    fn appends_below_capacity_keep_order() {
        let mut store = EntryStore::new(4);
        assert!(store.append(entry("one\n")).is_none());
        assert!(store.append(entry("two\n")).is_none());
        assert!(store.append(entry("three\n")).is_none());

        assert_eq!(store.entry_count(), 3);
        assert_eq!(store.total_bytes(), 14);
        assert_eq!(contents(&store), vec!["one\n", "two\n", "three\n"]);
        assert!(store.entry_at_logical_index(3).is_none());
    }

    #[test]
    fn filling_every_slot_marks_store_full() {
        let mut store = EntryStore::new(3);
        for text in ["a\n", "b\n", "c\n"] {
            assert!(store.append(entry(text)).is_none());
        }
        assert!(store.is_full());
        assert!(!store.is_empty());
        assert_eq!(store.entry_count(), 3);
    }

    #[test]
    fn eleventh_append_drops_the_oldest_entry() {
        let mut store = EntryStore::new(10);
        let commands = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "A"];
        let mut displaced = Vec::new();
        for command in commands {
            if let Some(old) = store.append(entry(&format!("{command}\n"))) {
                displaced.push(old);
            }
        }

        assert_eq!(store.entry_count(), 10);
        assert_eq!(displaced, vec![entry("0\n")]);
        assert_eq!(store.entry_at_logical_index(0), Some(&entry("1\n")));
        assert_eq!(store.entry_at_logical_index(9), Some(&entry("A\n")));
        assert_eq!(store.total_bytes(), 20);
    }

    #[test]
    fn wraps_around_many_times() {
        let mut store = EntryStore::new(3);
        for n in 0..25 {
            store.append(entry(&format!("{n}\n")));
        }
        assert_eq!(contents(&store), vec!["22\n", "23\n", "24\n"]);
        assert_eq!(store.entry_count(), 3);
    }

    #[test]
    fn single_slot_store_keeps_latest() {
        let mut store = EntryStore::new(1);
        assert!(store.append(entry("first\n")).is_none());
        assert!(store.is_full());
        assert_eq!(store.append(entry("second\n")), Some(entry("first\n")));
        assert_eq!(contents(&store), vec!["second\n"]);
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn zero_capacity_is_rejected() {
        let _ = EntryStore::new(0);
    }
}
