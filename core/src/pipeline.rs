// core/src/pipeline.rs
//
// The event tap callback.
//
// `EventPipeline::handle_event` is called once per intercepted event and
// decides whether the original event reaches the application. Everything it
// sends in place of a swallowed key goes through the `Injector`, marked so
// that the next callback lets it pass untouched.

use crate::app_rules::AppRules;
use crate::code_table::CodeTable;
use crate::config::{Config, RestoreModifier, SettingsHandle};
use crate::context::{ContextCache, TargetContext};
use crate::decision::{
    signal_action, sync_key_action, temporarily_use_unicode, OutputPlan, PlanInput, SignalAction,
    SyncKeyAction,
};
use crate::engine::{CapsStatus, EngineSignal, LinguisticEngine, SignalCode, MAX_BUFFER};
use crate::event::{Disposition, EventKind, KeyEvent};
use crate::injection::{Injector, PostTarget};
use crate::keys::{self, EventFlags};
use crate::output::{self, OutputContext};
use crate::platform::{Platform, TapDisableReason};
use crate::text_replacement::ExternalDeleteTracker;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// The interception pipeline, generic over the linguistic engine.
pub struct EventPipeline<E: LinguisticEngine> {
    engine: E,
    settings: SettingsHandle,
    platform: Platform,
    context: Arc<ContextCache>,
    injector: Injector,
    deletes: ExternalDeleteTracker,
    last_flags: EventFlags,
    /// The restore modifier is down and no key was typed since.
    restore_armed: bool,
    pending_backspace: usize,
    rules_generation: Option<u64>,
    last_plan: Option<OutputPlan>,
    last_target: Option<TargetContext>,
    permission_lost: bool,
}

impl<E: LinguisticEngine> EventPipeline<E> {
    pub fn new(engine: E, settings: SettingsHandle, platform: Platform) -> Self {
        let config = settings.current();
        let context = Arc::new(ContextCache::new(
            platform.clock.clone(),
            platform.processes.clone(),
            platform.overlay.clone(),
            platform.accessibility.clone(),
            AppRules::from_config(&config),
        ));
        let mut injector = Injector::new(
            platform.poster.clone(),
            platform.sleeper.clone(),
            platform.clock.clone(),
        );
        injector.set_code_table(config.code_table);
        Self {
            engine,
            settings,
            platform,
            context,
            injector,
            deletes: ExternalDeleteTracker::new(),
            last_flags: EventFlags::NONE,
            restore_armed: false,
            pending_backspace: 0,
            rules_generation: None,
            last_plan: None,
            last_target: None,
            permission_lost: false,
        }
    }

    pub fn context(&self) -> &Arc<ContextCache> {
        &self.context
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Plan of the last processed signal.
    pub fn last_plan(&self) -> Option<&OutputPlan> {
        self.last_plan.as_ref()
    }

    pub fn take_last_plan(&mut self) -> Option<OutputPlan> {
        self.last_plan.take()
    }

    /// Target resolved for the last key-down.
    pub fn last_target(&self) -> Option<&TargetContext> {
        self.last_target.as_ref()
    }

    pub fn last_flags(&self) -> EventFlags {
        self.last_flags
    }

    /// The active keyboard layout changed: forget cached key remaps so the
    /// next key-down asks the layout mapper again.
    pub fn input_source_changed(&self) {
        info!("input source changed");
        self.context.invalidate_layout_cache();
    }

    /// Decide the fate of one intercepted event.
    pub fn handle_event(&mut self, event: &KeyEvent) -> Disposition {
        let (generation, config) = self.settings.snapshot();
        self.sync_rules(generation, &config);

        if !self.platform.tap.has_permission() {
            if !self.permission_lost {
                warn!("accessibility permission lost, passing all events through");
                self.permission_lost = true;
            }
            return Disposition::PassThrough;
        }
        if self.permission_lost {
            info!("accessibility permission restored");
            self.permission_lost = false;
        }

        if event.kind == EventKind::KeyDown {
            let now = self.platform.clock.now_us();
            let waited = self
                .injector
                .pacing()
                .wait_for_gate(now, self.platform.sleeper.as_ref());
            if waited > 0 {
                trace!(waited, "waited for previous injection to settle");
            }
        }

        if event.kind.is_tap_disabled() {
            let reason = match event.kind {
                EventKind::TapDisabledByTimeout => TapDisableReason::Timeout,
                _ => TapDisableReason::UserInput,
            };
            info!(?reason, "event tap disabled, re-enabling");
            self.platform.tap.reenable(reason);
            return Disposition::PassThrough;
        }

        if event.is_self_injected() {
            return Disposition::PassThrough;
        }

        if event.kind == EventKind::KeyDown {
            self.restore_armed = false;
        }

        let timings = &config.timings;
        let flags = event.flags;
        let mut key = event.key_code;

        if event.kind == EventKind::KeyDown && key == keys::DELETE {
            self.deletes
                .record(self.platform.clock.now_ms(), timings.external_delete_reset_ms);
        }

        if invalidates_overlay(event) {
            self.context
                .invalidate_overlay(timings.overlay_invalidation_dedup_ms);
        }

        if event.kind == EventKind::KeyDown && config.perform_layout_compat {
            if let Some(mapper) = &self.platform.layout {
                key = self.context.layout_compatible_key(key, mapper.as_ref());
            }
        }

        if event.kind == EventKind::FlagsChanged {
            let restore = self.track_restore_modifier(flags, config.restore_modifier);
            self.last_flags = flags;
            if restore
                && config.is_vietnamese()
                && !self
                    .context
                    .should_disable_vietnamese(event.target_pid, config.safe_mode, timings)
            {
                return self.restore_raw_keys(event, &config);
            }
        }

        if !matches!(
            event.kind,
            EventKind::KeyDown | EventKind::KeyUp | EventKind::PointerDown
        ) {
            return Disposition::PassThrough;
        }

        if self
            .context
            .should_disable_vietnamese(event.target_pid, config.safe_mode, timings)
        {
            return Disposition::PassThrough;
        }

        if !config.is_vietnamese() {
            return self.handle_english(event, key, flags, &config);
        }

        if event.kind == EventKind::PointerDown {
            self.engine.request_new_session();
            return Disposition::PassThrough;
        }

        if event.kind == EventKind::KeyDown {
            self.last_flags = flags;
            return self.handle_key_down(event, key, flags, &config);
        }

        Disposition::PassThrough
    }

    /// Follow the restore modifier across `FlagsChanged` events. True when it
    /// was just released with no key typed while it was down.
    fn track_restore_modifier(&mut self, flags: EventFlags, modifier: RestoreModifier) -> bool {
        let Some(flag) = modifier.flag() else {
            self.restore_armed = false;
            return false;
        };
        let was_down = self.last_flags.contains(flag);
        let is_down = flags.contains(flag);
        if is_down && !was_down {
            self.restore_armed = true;
        } else if was_down && !is_down {
            return std::mem::take(&mut self.restore_armed);
        }
        false
    }

    /// Replace the word being typed with the keys that produced it.
    fn restore_raw_keys(&mut self, event: &KeyEvent, config: &Config) -> Disposition {
        let Some(signal) = self.engine.restore_to_raw_keys() else {
            return Disposition::PassThrough;
        };
        let target = self.prepare_target(event, config);
        self.injector.set_code_table(config.code_table);
        debug!(
            backspaces = signal.backspace_count,
            new_chars = signal.new_char_count(),
            "restoring raw keys"
        );
        if signal.backspace_count > 0 && signal.backspace_count < MAX_BUFFER {
            self.injector.send_backspace_sequence(signal.backspace_count);
        }
        let mut ctx = OutputContext {
            injector: &mut self.injector,
            accessibility: self.platform.accessibility.as_ref(),
            target: &target,
            safe_mode: config.safe_mode,
            pending_backspace: &mut self.pending_backspace,
        };
        // The released modifier has no character and is never replayed.
        output::send_new_char_string(
            &mut ctx,
            &signal.new_chars,
            SignalCode::WillProcess,
            event.key_code,
            event.flags,
        );
        if signal.code == SignalCode::RestoreAndNewSession {
            self.engine.start_new_session();
        }
        self.last_target = Some(target);
        Disposition::Swallow
    }

    /// Rebuild the application rules when the settings they derive from
    /// changed.
    fn sync_rules(&mut self, generation: u64, config: &Config) {
        if self.rules_generation == Some(generation) {
            return;
        }
        if self.rules_generation.is_some() {
            debug!(generation, "settings changed, rebuilding application rules");
            self.context.replace_rules(AppRules::from_config(config));
        }
        self.rules_generation = Some(generation);
    }

    /// Resolve the target and set up the injector for it.
    fn prepare_target(&mut self, event: &KeyEvent, config: &Config) -> TargetContext {
        let target = self
            .context
            .target_context(event.target_pid, config.safe_mode, &config.timings);
        let rules = self.context.rules();
        let app = target.effective_app();
        self.injector.configure(
            PostTarget::for_target(target.post_to_hid, target.is_cli),
            event.keyboard_type,
            target.characteristics.contains_unicode_compound,
            !app.is_empty() && rules.needs_nice_space(app),
            target.cli_profile,
        );
        if target.is_cli {
            let now = self.platform.clock.now_us();
            self.injector.pacing_mut().update_speed_factor(now);
        }
        trace!(app, cli = target.is_cli, hid = target.post_to_hid, "target resolved");
        target
    }

    fn handle_english(
        &mut self,
        event: &KeyEvent,
        key: u16,
        flags: EventFlags,
        config: &Config,
    ) -> Disposition {
        if !(config.use_macro && config.use_macro_in_english_mode)
            || event.kind != EventKind::KeyDown
        {
            return Disposition::PassThrough;
        }
        let caps = if flags.has_caps() {
            CapsStatus::Shift
        } else {
            CapsStatus::None
        };
        let signal = self
            .engine
            .handle_english_mode(key, caps, flags.has_other_control());
        if signal.code != SignalCode::ReplaceMacro {
            return Disposition::PassThrough;
        }
        let target = self.prepare_target(event, config);
        self.injector.set_code_table(config.code_table);
        let mut ctx = OutputContext {
            injector: &mut self.injector,
            accessibility: self.platform.accessibility.as_ref(),
            target: &target,
            safe_mode: config.safe_mode,
            pending_backspace: &mut self.pending_backspace,
        };
        output::handle_macro(&mut ctx, &signal, key, flags, config);
        self.last_target = Some(target);
        Disposition::Swallow
    }

    fn handle_key_down(
        &mut self,
        event: &KeyEvent,
        key: u16,
        flags: EventFlags,
        config: &Config,
    ) -> Disposition {
        let target = self.prepare_target(event, config);

        let table = config.code_table;
        let use_unicode = temporarily_use_unicode(
            table,
            target.overlay_active,
            target.characteristics.is_spotlight_like,
        );
        let effective_table = if use_unicode { CodeTable::Unicode } else { table };
        self.injector.set_code_table(effective_table);
        self.engine.set_code_table(effective_table);

        let signal = self.engine.handle_key(
            key,
            CapsStatus::from_flags(flags),
            flags.has_other_control(),
        );
        let disposition = self.dispatch(&signal, key, flags, &target, config);

        if use_unicode {
            self.injector.set_code_table(table);
            self.engine.set_code_table(table);
        }
        self.last_target = Some(target);
        disposition
    }

    fn dispatch(
        &mut self,
        signal: &EngineSignal,
        key: u16,
        flags: EventFlags,
        target: &TargetContext,
        config: &Config,
    ) -> Disposition {
        match signal_action(signal.code) {
            SignalAction::DoNothing => {
                self.apply_sync_action(signal.ext_code, target);
                Disposition::PassThrough
            }
            SignalAction::ProcessSignal => self.process_signal(signal, key, flags, target, config),
            SignalAction::ReplaceMacro => {
                let mut ctx = OutputContext {
                    injector: &mut self.injector,
                    accessibility: self.platform.accessibility.as_ref(),
                    target,
                    safe_mode: config.safe_mode,
                    pending_backspace: &mut self.pending_backspace,
                };
                output::handle_macro(&mut ctx, signal, key, flags, config);
                Disposition::Swallow
            }
        }
    }

    /// Keep the sync stack in line with keys the application types itself.
    fn apply_sync_action(&mut self, ext_code: u8, target: &TargetContext) {
        let action = sync_key_action(
            self.injector.code_table(),
            ext_code,
            self.injector.sync().back(),
            target.characteristics.contains_unicode_compound,
        );
        match action {
            SyncKeyAction::None => {}
            SyncKeyAction::Clear => self.injector.sync_mut().clear(),
            SyncKeyAction::Pop => {
                self.injector.sync_mut().pop();
            }
            SyncKeyAction::PopAndSendBackspace => {
                self.injector.sync_mut().pop();
                self.injector.send_physical_backspace();
            }
            SyncKeyAction::InsertOne => self.injector.sync_mut().push(1),
        }
    }

    fn process_signal(
        &mut self,
        signal: &EngineSignal,
        key: u16,
        flags: EventFlags,
        target: &TargetContext,
        config: &Config,
    ) -> Disposition {
        let now_ms = self.platform.clock.now_ms();
        let external_delete_recent = self
            .deletes
            .evaluate(now_ms, config.timings.text_replacement_delete_window_ms)
            .should_bypass();
        let plan = OutputPlan::build(
            &PlanInput {
                key,
                code: signal.code,
                ext_code: signal.ext_code,
                backspace_count: signal.backspace_count,
                new_char_count: signal.new_char_count(),
                target,
                browser_fix_enabled: config.fix_browser_autocomplete,
                global_step_by_step: config.send_key_step_by_step,
                safe_mode: config.safe_mode,
                external_delete_recent,
            },
            self.platform.accessibility.as_ref(),
        );
        self.last_plan = Some(plan);
        debug!(
            code = ?signal.code,
            backspaces = plan.sanitized_backspace_count,
            new_chars = signal.new_char_count(),
            adjustment = ?plan.adjustment,
            step_by_step = plan.use_step_by_step,
            bypass = plan.bypass,
            "processing signal"
        );
        if plan.bypass {
            // One replacement burst excuses one Space.
            self.deletes.reset();
            return Disposition::PassThrough;
        }

        let mut ctx = OutputContext {
            injector: &mut self.injector,
            accessibility: self.platform.accessibility.as_ref(),
            target,
            safe_mode: config.safe_mode,
            pending_backspace: &mut self.pending_backspace,
        };
        if output::execute_plan(&mut ctx, &plan, signal, key, flags) {
            self.engine.start_new_session();
        }
        Disposition::Swallow
    }
}

/// Clicks and the keys that open or close a launcher overlay make the
/// cached overlay state stale.
fn invalidates_overlay(event: &KeyEvent) -> bool {
    match event.kind {
        EventKind::PointerDown => true,
        EventKind::KeyDown => {
            (event.key_code == keys::SPACE && event.flags.contains(EventFlags::COMMAND))
                || event.key_code == keys::ESC
                || event.key_code == keys::RETURN
        }
        _ => false,
    }
}
