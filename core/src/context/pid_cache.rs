//! Process id → application identifier cache.

use crate::platform::ProcessTable;
use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::debug;

/// Executable path fragments of system processes that have no bundle
/// identifier of their own.
const PATH_FRAGMENTS: &[(&str, &str)] = &[
    ("Spotlight", "com.apple.Spotlight"),
    ("SystemUIServer", "com.apple.systemuiserver"),
    ("Launchpad", "com.apple.launchpad.launcher"),
];

#[derive(Debug, Default)]
struct PidState {
    /// `None` records a lookup that found nothing.
    entries: AHashMap<i32, Option<String>>,
    last_clean_ms: Option<u64>,
}

/// Whole-cache flushed every `clean_interval_ms`; negative lookups are
/// cached too.
#[derive(Debug, Default)]
pub struct PidCache {
    state: Mutex<PidState>,
}

impl PidCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &self,
        pid: i32,
        safe_mode: bool,
        now_ms: u64,
        clean_interval_ms: u64,
        processes: &dyn ProcessTable,
    ) -> Option<String> {
        if pid <= 0 {
            return None;
        }

        {
            let mut state = self.state.lock();
            let last = *state.last_clean_ms.get_or_insert(now_ms);
            if now_ms.saturating_sub(last) > clean_interval_ms {
                state.entries.clear();
                state.last_clean_ms = Some(now_ms);
                debug!("pid cache cleared after {} ms", now_ms - last);
            }
            if let Some(cached) = state.entries.get(&pid) {
                return cached.clone();
            }
        }

        // Probe outside the lock.
        let resolved = Self::lookup(pid, safe_mode, processes);
        self.state.lock().entries.insert(pid, resolved.clone());
        resolved
    }

    fn lookup(pid: i32, safe_mode: bool, processes: &dyn ProcessTable) -> Option<String> {
        if let Some(id) = processes.bundle_id(pid) {
            return (!id.is_empty()).then_some(id);
        }
        if safe_mode {
            return None;
        }
        let path = processes.executable_path(pid)?;
        PATH_FRAGMENTS
            .iter()
            .find(|(fragment, _)| path.contains(fragment))
            .map(|(_, id)| id.to_string())
    }

    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.last_clean_ms = None;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
