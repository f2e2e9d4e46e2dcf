//! Target-application context.
//!
//! `ContextCache` answers "which application is effectively focused and what
//! does it need" without hitting the OS on every keystroke. It owns four
//! independent caches, each behind its own lock, so that maintenance from a
//! settings thread never waits on the event callback for longer than one
//! short critical section:
//!
//! - [`PidCache`]: process id → application identifier
//! - [`CharacteristicsCache`]: application identifier → behaviour flags
//! - [`OverlayCache`]: launcher overlay focus
//! - [`LayoutCache`]: keyboard-layout remapping
//!
//! Every probe may fail. Failure reads as "no information" and callers fall
//! back to the plain-text-field behaviour.

pub mod characteristics;
pub mod layout;
pub mod pid_cache;
pub mod spotlight;

pub use characteristics::{CharacteristicsCache, InvalidationReason};
pub use layout::LayoutCache;
pub use pid_cache::PidCache;
pub use spotlight::{OverlayCache, OverlayInvalidation};

use crate::app_rules::{AppRules, ApplicationCharacteristics};
use crate::clock::Clock;
use crate::config::CacheTimings;
use crate::pacing::CliTimingProfile;
use crate::platform::{Accessibility, LayoutMapper, OverlayProbe, ProcessTable};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Everything the decision engine needs to know about where output goes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetContext {
    /// Application owning the process the event was addressed to.
    pub event_target_app: Option<String>,
    pub focused_app: Option<String>,
    /// Application that will actually receive the output.
    pub effective_app: Option<String>,
    pub overlay_active: bool,
    pub characteristics: ApplicationCharacteristics,
    pub is_browser: bool,
    pub is_terminal: bool,
    pub is_jetbrains: bool,
    pub is_terminal_panel: bool,
    pub is_cli: bool,
    pub post_to_hid: bool,
    pub cli_profile: Option<CliTimingProfile>,
}

impl TargetContext {
    pub fn effective_app(&self) -> &str {
        self.effective_app.as_deref().unwrap_or("")
    }

    pub fn is_spotlight_target(&self) -> bool {
        self.post_to_hid || self.characteristics.is_spotlight_like
    }
}

#[derive(Debug, Clone, Copy)]
struct DisableCheck {
    /// `-1` when the event carried no usable pid.
    pid: i32,
    checked_ms: u64,
    result: bool,
}

/// Process-wide cache service. Shared between the event callback and any
/// maintenance thread through an `Arc`.
pub struct ContextCache {
    clock: Arc<dyn Clock>,
    processes: Arc<dyn ProcessTable>,
    overlay_probe: Arc<dyn OverlayProbe>,
    accessibility: Arc<dyn Accessibility>,
    rules: RwLock<Arc<AppRules>>,
    pid: PidCache,
    characteristics: CharacteristicsCache,
    overlay: OverlayCache,
    layout: LayoutCache,
    disable: Mutex<Option<DisableCheck>>,
}

impl ContextCache {
    pub fn new(
        clock: Arc<dyn Clock>,
        processes: Arc<dyn ProcessTable>,
        overlay_probe: Arc<dyn OverlayProbe>,
        accessibility: Arc<dyn Accessibility>,
        rules: AppRules,
    ) -> Self {
        Self {
            clock,
            processes,
            overlay_probe,
            accessibility,
            rules: RwLock::new(Arc::new(rules)),
            pid: PidCache::new(),
            characteristics: CharacteristicsCache::new(),
            overlay: OverlayCache::new(),
            layout: LayoutCache::new(),
            disable: Mutex::new(None),
        }
    }

    pub fn rules(&self) -> Arc<AppRules> {
        Arc::clone(&self.rules.read())
    }

    /// Install new rules. Characteristics computed from the old rules are
    /// dropped.
    pub fn replace_rules(&self, rules: AppRules) {
        *self.rules.write() = Arc::new(rules);
        self.characteristics.invalidate(self.clock.now_ms());
        *self.disable.lock() = None;
    }

    pub fn accessibility(&self) -> &dyn Accessibility {
        self.accessibility.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    // ========== Applications ==========

    pub fn resolve_application(
        &self,
        pid: i32,
        safe_mode: bool,
        timings: &CacheTimings,
    ) -> Option<String> {
        self.pid.resolve(
            pid,
            safe_mode,
            self.clock.now_ms(),
            timings.pid_cache_clean_interval_ms,
            self.processes.as_ref(),
        )
    }

    /// Application behind the focused element. Looks through a launcher
    /// overlay unless in safe mode.
    pub fn resolve_focused_application(
        &self,
        safe_mode: bool,
        cache_duration_ms: u64,
        timings: &CacheTimings,
    ) -> Option<String> {
        if safe_mode {
            return self.processes.frontmost_bundle_id();
        }
        let now = self.clock.now_ms();
        if let Some(app) = self.overlay.cached_focused_app(cache_duration_ms, now) {
            return Some(app);
        }
        let state = self
            .overlay
            .current(self.overlay_probe.as_ref(), cache_duration_ms, now);
        state
            .focused_app
            .filter(|app| !app.is_empty())
            .or_else(|| self.resolve_application(state.focused_pid, false, timings))
            .or_else(|| self.processes.frontmost_bundle_id())
    }

    pub fn is_overlay_active(&self, safe_mode: bool, cache_duration_ms: u64) -> bool {
        if safe_mode {
            return false;
        }
        self.overlay
            .current(self.overlay_probe.as_ref(), cache_duration_ms, self.clock.now_ms())
            .active
    }

    pub fn invalidate_overlay(&self, dedup_window_ms: u64) -> OverlayInvalidation {
        let outcome = self.overlay.invalidate(dedup_window_ms, self.clock.now_ms());
        if outcome != OverlayInvalidation::Skipped {
            debug!(?outcome, "overlay cache invalidated");
        }
        outcome
    }

    /// Characteristics of `app_id`; `None` for an empty identifier.
    pub fn characteristics(
        &self,
        app_id: &str,
        max_age_ms: u64,
    ) -> Option<ApplicationCharacteristics> {
        let rules = self.rules();
        self.characteristics
            .get(app_id, max_age_ms, self.clock.now_ms(), &rules)
    }

    pub fn characteristics_stats(&self) -> (usize, usize) {
        self.characteristics.cache_stats()
    }

    /// Whether Vietnamese input is suppressed for the focused application.
    /// The answer is reused for the same pid within `app_switch_cache_ms`.
    pub fn should_disable_vietnamese(
        &self,
        pid: i32,
        safe_mode: bool,
        timings: &CacheTimings,
    ) -> bool {
        let now = self.clock.now_ms();
        if pid > 0 {
            if let Some(last) = *self.disable.lock() {
                if last.pid == pid && now.saturating_sub(last.checked_ms) < timings.app_switch_cache_ms
                {
                    return last.result;
                }
            }
        }

        let rules = self.rules();
        let result = self
            .resolve_focused_application(safe_mode, timings.spotlight_cache_ms, timings)
            .is_some_and(|app| rules.should_disable_vietnamese(&app));

        *self.disable.lock() = Some(DisableCheck {
            pid: if pid > 0 { pid } else { -1 },
            checked_ms: now,
            result,
        });
        result
    }

    // ========== Layout ==========

    pub fn cached_layout_conversion(&self, key: u16) -> Option<u16> {
        self.layout.get(key)
    }

    pub fn set_cached_layout_conversion(&self, key: u16, mapped: u16) {
        self.layout.set(key, mapped);
    }

    pub fn invalidate_layout_cache(&self) {
        self.layout.invalidate();
        debug!("layout cache invalidated");
    }

    /// Key the active layout produces for `key`, or `key` itself when the
    /// mapper has no answer.
    pub fn layout_compatible_key(&self, key: u16, mapper: &dyn LayoutMapper) -> u16 {
        if let Some(mapped) = self.layout.get(key) {
            return mapped;
        }
        match mapper.map(key) {
            Some(mapped) => {
                self.layout.set(key, mapped);
                mapped
            }
            None => key,
        }
    }

    // ========== Target resolution ==========

    /// Resolve where the output of an event addressed to `pid` lands.
    pub fn target_context(&self, pid: i32, safe_mode: bool, timings: &CacheTimings) -> TargetContext {
        let event_target_app = if pid > 0 {
            self.resolve_application(pid, safe_mode, timings)
        } else {
            None
        };
        let overlay_active = self.is_overlay_active(safe_mode, timings.spotlight_cache_ms);
        let focused_app =
            self.resolve_focused_application(safe_mode, timings.spotlight_cache_ms, timings);

        let effective_app = if overlay_active && focused_app.is_some() {
            focused_app.clone()
        } else {
            event_target_app.clone().or_else(|| focused_app.clone())
        };
        let effective = effective_app.as_deref().unwrap_or("");

        let characteristics = self
            .characteristics(effective, timings.characteristics_max_age_ms)
            .unwrap_or_default();

        let rules = self.rules();
        let target_is_browser = event_target_app
            .as_deref()
            .is_some_and(|app| rules.is_browser(app));
        let is_browser = target_is_browser || characteristics.is_browser;
        let is_terminal = characteristics.is_terminal;
        let is_jetbrains = characteristics.is_jetbrains_ide;
        let is_terminal_panel = if !safe_mode && !is_terminal && !is_jetbrains {
            self.accessibility.is_terminal_panel_focused()
        } else {
            false
        };
        let is_cli = is_terminal || is_jetbrains || is_terminal_panel;
        let cli_profile = is_cli.then(|| CliTimingProfile::for_app(&rules, effective_app.as_deref()));
        let post_to_hid = (!is_browser && overlay_active) || characteristics.is_spotlight_like;

        TargetContext {
            event_target_app,
            focused_app,
            effective_app,
            overlay_active,
            characteristics,
            is_browser,
            is_terminal,
            is_jetbrains,
            is_terminal_panel,
            is_cli,
            post_to_hid,
            cli_profile,
        }
    }
}
