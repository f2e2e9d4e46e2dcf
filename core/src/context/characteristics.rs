//! Application identifier → characteristics cache.
//!
//! The whole cache is dropped whenever the resolved application changes or
//! the cache grows older than its maximum age. A stale "needs step-by-step"
//! flag duplicates characters on screen, so freshness beats hit rate here.

use crate::app_rules::{AppRules, ApplicationCharacteristics};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use tracing::debug;

const CAPACITY: usize = 64;

/// Why the cache was dropped before a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    AppSwitch,
    /// First use or older than the maximum age.
    Age,
}

struct CharState {
    entries: LruCache<String, ApplicationCharacteristics>,
    /// Last identifier and invalidation time, always updated together.
    last_app: Option<String>,
    last_invalidation_ms: Option<u64>,
    hits: usize,
    misses: usize,
}

pub struct CharacteristicsCache {
    state: Mutex<CharState>,
}

impl Default for CharacteristicsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CharacteristicsCache {
    pub fn new() -> Self {
        let capacity = NonZeroUsize::new(CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CharState {
                entries: LruCache::new(capacity),
                last_app: None,
                last_invalidation_ms: None,
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Characteristics of `app_id`, computing them on a miss. Empty
    /// identifiers have no characteristics.
    pub fn get(
        &self,
        app_id: &str,
        max_age_ms: u64,
        now_ms: u64,
        rules: &AppRules,
    ) -> Option<ApplicationCharacteristics> {
        if app_id.is_empty() {
            return None;
        }
        let mut state = self.state.lock();
        if let Some(reason) = Self::prepare(&mut state, app_id, max_age_ms, now_ms) {
            debug!(app = app_id, ?reason, "characteristics cache invalidated");
        }
        if let Some(found) = state.entries.get(app_id).copied() {
            state.hits += 1;
            return Some(found);
        }
        state.misses += 1;
        let computed = rules.characteristics(app_id);
        state.entries.put(app_id.to_string(), computed);
        Some(computed)
    }

    fn prepare(
        state: &mut CharState,
        app_id: &str,
        max_age_ms: u64,
        now_ms: u64,
    ) -> Option<InvalidationReason> {
        let reason = match (&state.last_app, state.last_invalidation_ms) {
            (Some(last), _) if last != app_id => InvalidationReason::AppSwitch,
            (_, None) => InvalidationReason::Age,
            (_, Some(at)) if now_ms.saturating_sub(at) > max_age_ms => InvalidationReason::Age,
            _ => return None,
        };
        state.entries.clear();
        state.last_app = Some(app_id.to_string());
        state.last_invalidation_ms = Some(now_ms);
        Some(reason)
    }

    /// Drop every entry, e.g. after the rules changed.
    pub fn invalidate(&self, now_ms: u64) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.last_app = None;
        state.last_invalidation_ms = Some(now_ms);
    }

    /// (hits, misses) since creation.
    pub fn cache_stats(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.hits, state.misses)
    }

    pub fn cache_size(&self) -> usize {
        self.state.lock().entries.len()
    }
}
