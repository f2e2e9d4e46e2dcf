//! Per-character record of how many units each emitted character occupies.
//!
//! Only used with double-code tables. Every visual character typed since the
//! last reset has one entry; deleting a character consults the top entry to
//! know whether a second backspace is needed.

/// Stack of emitted unit counts, most recent character last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncKeyStack {
    entries: Vec<u8>,
}

impl SyncKeyStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a character of `len` units. Zero-length entries are ignored.
    pub fn push(&mut self, len: usize) {
        if len > 0 {
            self.entries.push(len.min(u8::MAX as usize) as u8);
        }
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.entries.pop().map(usize::from)
    }

    /// Units of the most recent character.
    pub fn back(&self) -> Option<usize> {
        self.entries.last().copied().map(usize::from)
    }

    /// Account for one unit deleted from the most recent character,
    /// removing the entry once all of its units are gone.
    pub fn consume_one(&mut self) {
        if let Some(top) = self.entries.last_mut() {
            if *top > 1 {
                *top -= 1;
            } else {
                self.entries.pop();
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of visual characters recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Units still on screen.
    pub fn total_units(&self) -> usize {
        self.entries.iter().map(|&n| n as usize).sum()
    }
}
