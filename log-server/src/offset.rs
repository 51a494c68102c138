//! Translation between global byte offsets and entry positions.
//!
//! A global offset addresses the concatenation of every retained entry from
//! oldest to newest. Nothing is cached: the content changes with every
//! append, so each translation walks the store as it is right now.

use crate::error::RangeError;
use crate::store::{Entry, EntryStore};

/// A byte inside one entry: the entry's logical index and the offset into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub index: usize,
    pub offset: usize,
}

/// Stateless view over an [`EntryStore`] that maps offsets both ways.
#[derive(Debug, Clone, Copy)]
pub struct OffsetIndex<'a> {
    store: &'a EntryStore,
}

impl<'a> OffsetIndex<'a> {
    pub fn new(store: &'a EntryStore) -> Self {
        Self { store }
    }

    /// Finds the entry holding byte `global`.
    ///
    /// Returns `None` when `global >= total_bytes()`; the end of the content
    /// is not a position.
    pub fn locate(&self, global: usize) -> Option<Position> {
        let mut remaining = global;
        for (index, entry) in self.store.iter().enumerate() {
            if remaining < entry.len() {
                return Some(Position {
                    index,
                    offset: remaining,
                });
            }
            remaining -= entry.len();
        }
        None
    }

    /// Global offset of byte `offset` inside the `index`-th oldest entry.
    pub fn resolve(&self, index: usize, offset: usize) -> Result<usize, RangeError> {
        let entry = self
            .store
            .entry_at_logical_index(index)
            .ok_or(RangeError::Index {
                index,
                count: self.store.entry_count(),
            })?;
        if offset >= entry.len() {
            return Err(RangeError::Offset {
                index,
                offset,
                len: entry.len(),
            });
        }

        let preceding: usize = self.store.iter().take(index).map(Entry::len).sum();
        Ok(preceding + offset)
    }

    /// Byte slices from `global` through the end of the content: the tail of
    /// the entry holding `global` followed by every newer entry in full.
    pub fn tail(&self, global: usize) -> impl Iterator<Item = &'a [u8]> + 'a {
        let store = self.store;
        self.locate(global)
            .into_iter()
            .flat_map(move |Position { index, offset }| {
                store.iter().skip(index).enumerate().map(move |(n, entry)| {
                    let bytes = entry.as_bytes();
                    if n == 0 {
                        &bytes[offset..]
                    } else {
                        bytes
                    }
                })
            })
    }
}
