// core/tests/context_resolution.rs
//
// Integration tests for target resolution through the shared context cache.
//
// Tests cover:
// - Launcher overlays redirect output to the focused application
// - Overlay probes are cached and invalidated with deduplication
// - Safe mode never probes the overlay
// - Terminal overrides from settings turn a target into a CLI target
// - Settings changes rebuild the rules the pipeline resolves with
// - Applications where Vietnamese input is disabled pass every key

use libviet_core::clock::{ManualClock, RecordingSleeper};
use libviet_core::context::OverlayInvalidation;
use libviet_core::platform::{AlwaysPermitted, NoAccessibility};
use libviet_core::{
    AppRules, CacheTimings, CliProfileKind, Config, ContextCache, Disposition, EngineSignal,
    EventFlags, EventPipeline, KeyEvent, OverlayProbe, OverlayState, Platform, ProcessTable,
    RecordingPoster, ScriptedEngine, SettingsHandle, TerminalSpeed,
};
use libviet_core::keys;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// Process table backed by a map, counting lookups.
struct Processes {
    apps: HashMap<i32, &'static str>,
    frontmost: Mutex<Option<&'static str>>,
    lookups: AtomicUsize,
}

impl Processes {
    fn new(apps: &[(i32, &'static str)], frontmost: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            apps: apps.iter().copied().collect(),
            frontmost: Mutex::new(frontmost),
            lookups: AtomicUsize::new(0),
        })
    }
}

impl ProcessTable for Processes {
    fn bundle_id(&self, pid: i32) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.apps.get(&pid).map(|s| s.to_string())
    }

    fn executable_path(&self, _pid: i32) -> Option<String> {
        None
    }

    fn frontmost_bundle_id(&self) -> Option<String> {
        self.frontmost.lock().map(str::to_string)
    }
}

// Overlay that can be opened and closed, counting probes.
#[derive(Default)]
struct Launcher {
    open: AtomicBool,
    probes: AtomicUsize,
}

impl OverlayProbe for Launcher {
    fn probe(&self) -> OverlayState {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.open.load(Ordering::SeqCst) {
            OverlayState {
                active: true,
                focused_pid: 900,
                focused_app: Some("com.apple.Spotlight".into()),
            }
        } else {
            OverlayState::default()
        }
    }
}

fn cache(
    clock: &Arc<ManualClock>,
    processes: Arc<Processes>,
    launcher: Arc<Launcher>,
    rules: AppRules,
) -> ContextCache {
    ContextCache::new(
        clock.clone(),
        processes,
        launcher,
        Arc::new(NoAccessibility),
        rules,
    )
}

#[test]
fn test_overlay_redirects_to_focused_app() {
    let clock = Arc::new(ManualClock::starting_at_ms(1_000));
    let launcher = Arc::new(Launcher::default());
    launcher.open.store(true, Ordering::SeqCst);
    let processes = Processes::new(&[(7, "com.apple.TextEdit")], Some("com.apple.TextEdit"));
    let ctx = cache(&clock, processes, launcher, AppRules::new());

    let target = ctx.target_context(7, false, &CacheTimings::default());
    assert_eq!(target.event_target_app.as_deref(), Some("com.apple.TextEdit"));
    assert_eq!(target.effective_app(), "com.apple.Spotlight");
    assert!(target.overlay_active);
    assert!(target.post_to_hid);
    assert!(target.is_spotlight_target());
    assert!(!target.is_cli);
}

#[test]
fn test_overlay_probe_is_cached_and_invalidated() {
    let clock = Arc::new(ManualClock::starting_at_ms(1_000));
    let launcher = Arc::new(Launcher::default());
    launcher.open.store(true, Ordering::SeqCst);
    let processes = Processes::new(&[(7, "com.apple.TextEdit")], None);
    let ctx = cache(&clock, processes, launcher.clone(), AppRules::new());
    let timings = CacheTimings::default();

    ctx.target_context(7, false, &timings);
    clock.advance_ms(50);
    ctx.target_context(7, false, &timings);
    assert_eq!(launcher.probes.load(Ordering::SeqCst), 1);

    // The launcher closes; the cached answer is stale until invalidated.
    launcher.open.store(false, Ordering::SeqCst);
    assert!(ctx.target_context(7, false, &timings).overlay_active);
    assert_eq!(ctx.invalidate_overlay(30), OverlayInvalidation::WasActive);
    assert_eq!(ctx.invalidate_overlay(30), OverlayInvalidation::Skipped);

    let target = ctx.target_context(7, false, &timings);
    assert!(!target.overlay_active);
    assert_eq!(target.effective_app(), "com.apple.TextEdit");
    assert_eq!(launcher.probes.load(Ordering::SeqCst), 2);

    clock.advance_ms(200);
    assert_eq!(ctx.invalidate_overlay(30), OverlayInvalidation::WasInactive);
}

#[test]
fn test_safe_mode_skips_overlay_probe() {
    let clock = Arc::new(ManualClock::starting_at_ms(1_000));
    let launcher = Arc::new(Launcher::default());
    launcher.open.store(true, Ordering::SeqCst);
    let processes = Processes::new(&[(7, "com.apple.TextEdit")], Some("com.apple.TextEdit"));
    let ctx = cache(&clock, processes, launcher.clone(), AppRules::new());

    let target = ctx.target_context(7, true, &CacheTimings::default());
    assert!(!target.overlay_active);
    assert!(!target.post_to_hid);
    assert_eq!(target.effective_app(), "com.apple.TextEdit");
    assert_eq!(launcher.probes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_pid_lookups_are_cached() {
    let clock = Arc::new(ManualClock::starting_at_ms(1_000));
    let processes = Processes::new(&[(7, "com.apple.TextEdit")], None);
    let ctx = cache(
        &clock,
        processes.clone(),
        Arc::new(Launcher::default()),
        AppRules::new(),
    );
    let timings = CacheTimings::default();
    for _ in 0..5 {
        assert_eq!(
            ctx.resolve_application(7, false, &timings).as_deref(),
            Some("com.apple.TextEdit")
        );
    }
    assert_eq!(processes.lookups.load(Ordering::SeqCst), 1);

    clock.advance_ms(timings.pid_cache_clean_interval_ms + 1);
    ctx.resolve_application(7, false, &timings);
    assert_eq!(processes.lookups.load(Ordering::SeqCst), 2);
}

#[test]
fn test_terminal_override_makes_cli_target() {
    let mut config = Config::default();
    config
        .terminal_speed_overrides
        .insert("com.example.shell".into(), TerminalSpeed::Slow);
    let clock = Arc::new(ManualClock::starting_at_ms(1_000));
    let processes = Processes::new(&[(7, "com.example.shell")], None);
    let ctx = cache(
        &clock,
        processes,
        Arc::new(Launcher::default()),
        AppRules::from_config(&config),
    );

    let target = ctx.target_context(7, false, &config.timings);
    assert!(target.is_terminal);
    assert!(target.is_cli);
    assert_eq!(
        target.cli_profile.map(|p| p.kind),
        Some(CliProfileKind::SlowTerminal)
    );
}

fn pipeline_for(
    processes: Arc<Processes>,
    config: Config,
) -> (Arc<RecordingPoster>, EventPipeline<ScriptedEngine>) {
    let clock = Arc::new(ManualClock::starting_at_ms(1_000));
    let poster = Arc::new(RecordingPoster::new());
    let platform = Platform {
        processes,
        overlay: Arc::new(Launcher::default()),
        accessibility: Arc::new(NoAccessibility),
        layout: None,
        tap: Arc::new(AlwaysPermitted),
        poster: poster.clone(),
        clock: clock.clone(),
        sleeper: Arc::new(RecordingSleeper::with_clock(clock)),
    };
    let pipeline = EventPipeline::new(ScriptedEngine::new(), SettingsHandle::new(config), platform);
    (poster, pipeline)
}

#[test]
fn test_settings_change_rebuilds_rules() {
    let processes = Processes::new(&[(7, "com.example.shell")], Some("com.example.shell"));
    let (_poster, mut pipeline) = pipeline_for(processes, Config::default());
    let key = KeyEvent::key_down(keys::A, EventFlags::NONE).with_pid(7);

    assert_eq!(pipeline.handle_event(&key), Disposition::PassThrough);
    assert!(!pipeline.last_target().unwrap().is_cli);

    pipeline.settings().update(|c| {
        c.terminal_speed_overrides
            .insert("com.example.shell".into(), TerminalSpeed::Fast);
    });
    assert_eq!(pipeline.handle_event(&key), Disposition::PassThrough);
    let target = pipeline.last_target().unwrap();
    assert!(target.is_cli);
    assert_eq!(
        target.cli_profile.map(|p| p.kind),
        Some(CliProfileKind::FastTerminal)
    );
}

#[test]
fn test_disabled_app_passes_everything() {
    let processes = Processes::new(
        &[(7, "com.apple.apps.launcher")],
        Some("com.apple.apps.launcher"),
    );
    let (poster, mut pipeline) = pipeline_for(processes, Config::default());
    pipeline
        .engine_mut()
        .push(EngineSignal::will_process(1, EngineSignal::unicode_cells("ó")));

    let key = KeyEvent::key_down(keys::S, EventFlags::NONE).with_pid(7);
    assert_eq!(pipeline.handle_event(&key), Disposition::PassThrough);
    assert!(pipeline.engine().calls().is_empty());
    assert_eq!(pipeline.engine().pending(), 1);
    assert!(poster.events().is_empty());
}
