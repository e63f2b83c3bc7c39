//! Slot vector with stable indices
//!
//! Removing an element leaves a hole so every other index stays valid; the
//! last slot is popped instead. Inserts fill the lowest free hole first.

use std::collections::BTreeSet;

/// Free-list backed vector whose indices survive unrelated removals
#[derive(Debug, Clone)]
pub struct SlotVec<T> {
    slots: Vec<Option<T>>,
    free: BTreeSet<usize>,
}

impl<T> Default for SlotVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotVec<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: BTreeSet::new(),
        }
    }

    /// Store `value` and return its slot index
    pub fn insert(&mut self, value: T) -> usize {
        if let Some(index) = self.free.pop_first() {
            self.slots[index] = Some(value);
            index
        } else {
            self.slots.push(Some(value));
            self.slots.len() - 1
        }
    }

    /// Take the value out of `index`, if occupied
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let value = self.slots.get_mut(index)?.take()?;
        if index + 1 == self.slots.len() {
            self.slots.pop();
            // Trailing holes are no longer addressable
            while matches!(self.slots.last(), Some(None)) {
                self.slots.pop();
                self.free.remove(&self.slots.len());
            }
        } else {
            self.free.insert(index);
        }
        Some(value)
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots including holes
    pub fn slot_len(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (i, v)))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().flatten()
    }

    pub fn position<F: Fn(&T) -> bool>(&self, pred: F) -> Option<usize> {
        self.iter().find(|(_, v)| pred(v)).map(|(i, _)| i)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

impl<T: PartialEq> SlotVec<T> {
    /// Remove the first slot holding `value`. Returns false if absent.
    pub fn remove_value(&mut self, value: &T) -> bool {
        match self.position(|v| v == value) {
            Some(index) => self.remove(index).is_some(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_stable_across_removal() {
        let mut s = SlotVec::new();
        let a = s.insert("a");
        let b = s.insert("b");
        let c = s.insert("c");
        assert_eq!((a, b, c), (0, 1, 2));

        assert_eq!(s.remove(b), Some("b"));
        assert_eq!(s.get(a), Some(&"a"));
        assert_eq!(s.get(c), Some(&"c"));
        assert_eq!(s.len(), 2);
        assert_eq!(s.slot_len(), 3);

        // Hole is reused
        assert_eq!(s.insert("d"), 1);
    }

    #[test]
    fn test_remove_last_pops() {
        let mut s = SlotVec::new();
        s.insert(1);
        s.insert(2);
        s.insert(3);
        s.remove(1);
        s.remove(2);
        // Popping 2 exposes the hole at 1, which goes too
        assert_eq!(s.slot_len(), 1);
        assert_eq!(s.insert(9), 1);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_remove_absent_is_none() {
        let mut s: SlotVec<u8> = SlotVec::new();
        assert_eq!(s.remove(0), None);
        s.insert(4);
        assert_eq!(s.remove(3), None);
        assert!(s.remove_value(&4));
        assert!(!s.remove_value(&4));
        assert!(s.is_empty());
    }

    #[test]
    fn test_iter_skips_holes() {
        let mut s = SlotVec::new();
        for v in 0..5 {
            s.insert(v * 10);
        }
        s.remove(1);
        s.remove(3);
        let seen: Vec<_> = s.iter().collect();
        assert_eq!(seen, vec![(0, &0), (2, &20), (4, &40)]);
    }
}
