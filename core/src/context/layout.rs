//! Keyboard-layout remap cache for the first 256 key codes.

use parking_lot::Mutex;

const SLOTS: usize = 256;
const NO_VALUE: u16 = u16::MAX;

#[derive(Debug)]
struct LayoutState {
    slots: [u16; SLOTS],
    valid: bool,
}

#[derive(Debug)]
pub struct LayoutCache {
    state: Mutex<LayoutState>,
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LayoutState {
                slots: [NO_VALUE; SLOTS],
                valid: false,
            }),
        }
    }

    pub fn get(&self, key: u16) -> Option<u16> {
        let index = key as usize;
        if index >= SLOTS {
            return None;
        }
        let state = self.state.lock();
        if !state.valid {
            return None;
        }
        match state.slots[index] {
            NO_VALUE => None,
            mapped => Some(mapped),
        }
    }

    pub fn set(&self, key: u16, mapped: u16) {
        let index = key as usize;
        if index >= SLOTS {
            return;
        }
        let mut state = self.state.lock();
        if !state.valid {
            state.slots = [NO_VALUE; SLOTS];
            state.valid = true;
        }
        state.slots[index] = mapped;
    }

    /// Called when the input source changes.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.slots = [NO_VALUE; SLOTS];
        state.valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_invalidate() {
        let cache = LayoutCache::new();
        assert_eq!(cache.get(12), None);
        cache.set(12, 0);
        assert!(cache.is_valid());
        assert_eq!(cache.get(12), Some(0));
        cache.invalidate();
        assert_eq!(cache.get(12), None);
        assert!(!cache.is_valid());
    }

    #[test]
    fn test_out_of_range_never_cached() {
        let cache = LayoutCache::new();
        cache.set(300, 1);
        assert_eq!(cache.get(300), None);
        assert!(!cache.is_valid());
    }
}
