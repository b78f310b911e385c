//! Bounded prediction history.

use serde::{Deserialize, Serialize};

/// One prediction, and later the resources the task actually used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// RFC 3339, UTC.
    pub timestamp: String,
    /// Task name the prediction was made for.
    pub task: String,
    /// Concrete resource ids predicted, deduplicated.
    pub predictions: Vec<String>,
    /// Set once by outcome learning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Vec<String>>,
}

/// Fixed-capacity circular buffer. Once full, each push overwrites the
/// oldest entry.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    slots: Vec<Option<HistoryEntry>>,
    /// Index of the oldest entry.
    head: usize,
    len: usize,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        let cap = self.capacity();
        let idx = (self.head + self.len) % cap;
        self.slots[idx] = Some(entry);
        if self.len < cap {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % cap;
        }
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        let cap = self.capacity();
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % cap].as_ref())
    }

    /// The newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.iter().skip(self.len.saturating_sub(n))
    }

    pub fn newest(&self) -> Option<&HistoryEntry> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.len - 1) % self.capacity();
        self.slots[idx].as_ref()
    }

    pub fn newest_mut(&mut self) -> Option<&mut HistoryEntry> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.len - 1) % self.capacity();
        self.slots[idx].as_mut()
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.iter().cloned().collect()
    }
}
