//! # Summary
//!
//! A sparse slot-indexed sequence: a map from slot number to an optional
//! value, with an explicit notion of "length" (one past the highest
//! written index, or zero if nothing has been written). Both `Leader`
//! and `Replica` keep one or two of these (`proposals`/`decisions`); the
//! `max(len(proposals), len(decisions))` rule `Replica::propose` uses to
//! pick the next free slot is exactly `SlotLog::len`.
//!
//! Backed by a `HashMap` rather than a growable `Vec<Option<T>>`. Both
//! are valid as long as "length" is tracked explicitly, and a map avoids
//! reallocating a long run of `None`s when slots are sparse (e.g. right
//! after a leader change).

use hashbrown::HashMap as Map;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
#[derive(Debug)]
pub struct SlotLog<T> {
    entries: Map<usize, T>,
    len: usize,
}

impl<T> Default for SlotLog<T> {
    fn default() -> Self {
        SlotLog { entries: Map::default(), len: 0 }
    }
}

impl<T> SlotLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// One past the highest slot ever written, or zero if empty.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, slot: usize) -> Option<&T> {
        self.entries.get(&slot)
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.entries.contains_key(&slot)
    }

    /// Write `value` at `slot` if nothing is there yet. Returns `true` if
    /// the write happened.
    pub fn insert_if_vacant(&mut self, slot: usize, value: T) -> bool {
        if self.entries.contains_key(&slot) {
            return false;
        }
        self.entries.insert(slot, value);
        self.len = self.len.max(slot + 1);
        true
    }

    /// Overwrite whatever is at `slot`, vacant or not.
    pub fn insert(&mut self, slot: usize, value: T) {
        self.entries.insert(slot, value);
        self.len = self.len.max(slot + 1);
    }

    pub fn remove(&mut self, slot: usize) -> Option<T> {
        self.entries.remove(&slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries.iter().map(|(&slot, value)| (slot, value))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_is_one_past_highest_write() {
        let mut log = SlotLog::new();
        assert_eq!(log.len(), 0);
        log.insert(0, "a");
        assert_eq!(log.len(), 1);
        log.insert(3, "b");
        assert_eq!(log.len(), 4);
        // writing an earlier slot doesn't shrink the length
        log.insert(1, "c");
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn insert_if_vacant_respects_first_writer() {
        let mut log = SlotLog::new();
        assert!(log.insert_if_vacant(2, "first"));
        assert!(!log.insert_if_vacant(2, "second"));
        assert_eq!(log.get(2), Some(&"first"));
    }
}
