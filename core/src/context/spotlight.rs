//! Launcher overlay ("Spotlight") focus cache.

use crate::platform::{OverlayProbe, OverlayState};
use parking_lot::Mutex;

/// Outcome of [`OverlayCache::invalidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayInvalidation {
    /// Already empty and invalidated inside the dedup window.
    Skipped,
    WasInactive,
    WasActive,
}

#[derive(Debug, Default)]
struct OverlayEntry {
    state: OverlayState,
    checked_ms: u64,
}

#[derive(Debug, Default)]
struct OverlayCacheState {
    /// Payload and check time live and die together.
    entry: Option<OverlayEntry>,
    last_invalidation_ms: Option<u64>,
}

#[derive(Debug, Default)]
pub struct OverlayCache {
    state: Mutex<OverlayCacheState>,
}

impl OverlayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached probe result when younger than `cache_ms`, otherwise a fresh
    /// probe that replaces the cached one.
    pub fn current(&self, probe: &dyn OverlayProbe, cache_ms: u64, now_ms: u64) -> OverlayState {
        if let Some(entry) = &self.state.lock().entry {
            if now_ms.saturating_sub(entry.checked_ms) < cache_ms {
                return entry.state.clone();
            }
        }
        let state = probe.probe();
        self.state.lock().entry = Some(OverlayEntry {
            state: state.clone(),
            checked_ms: now_ms,
        });
        state
    }

    /// Focused application from a fresh cache entry, without probing.
    pub fn cached_focused_app(&self, cache_ms: u64, now_ms: u64) -> Option<String> {
        let guard = self.state.lock();
        let entry = guard.entry.as_ref()?;
        if now_ms.saturating_sub(entry.checked_ms) < cache_ms {
            entry.state.focused_app.clone()
        } else {
            None
        }
    }

    pub fn invalidate(&self, dedup_window_ms: u64, now_ms: u64) -> OverlayInvalidation {
        let mut state = self.state.lock();
        let recently = state
            .last_invalidation_ms
            .is_some_and(|at| now_ms.saturating_sub(at) < dedup_window_ms);
        let already_empty = state
            .entry
            .as_ref()
            .map_or(true, |e| e.state == OverlayState::default());
        if already_empty && recently {
            return OverlayInvalidation::Skipped;
        }
        let was_active = state.entry.take().is_some_and(|e| e.state.active);
        state.last_invalidation_ms = Some(now_ms);
        if was_active {
            OverlayInvalidation::WasActive
        } else {
            OverlayInvalidation::WasInactive
        }
    }
}
