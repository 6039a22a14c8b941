//! Undo/redo history.
//!
//! A bounded stack of snapshots with a cursor. Only locally initiated
//! changes are recorded here; remote segments draw straight onto the
//! surface without touching history.

use crate::snapshot::Snapshot;

/// Entries kept before the oldest is evicted.
pub const HISTORY_CAPACITY: usize = 20;

/// Navigable sequence of canvas snapshots.
///
/// Invariant: when non-empty, `cursor` always points at a valid entry, and
/// that entry is what the surface currently shows.
#[derive(Debug)]
pub struct HistoryStack {
    entries: Vec<Snapshot>,
    cursor: usize,
    capacity: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Record a new state: prune everything after the cursor, append, and
    /// evict the oldest entry once over capacity.
    pub fn push(&mut self, snapshot: Snapshot) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(snapshot);
        if self.entries.len() > self.capacity {
            self.entries.remove(0);
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Step back. Returns the snapshot to display, or `None` at the oldest
    /// entry (the canvas stays as it is).
    pub fn undo(&mut self) -> Option<&Snapshot> {
        if self.entries.is_empty() || self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    /// Step forward. Returns the snapshot to display, or `None` at the
    /// newest entry.
    pub fn redo(&mut self) -> Option<&Snapshot> {
        if self.entries.is_empty() || self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    /// The entry the cursor points at.
    pub fn current(&self) -> Option<&Snapshot> {
        self.entries.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty() && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.entries.is_empty() && self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
