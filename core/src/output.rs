//! Delivery of engine output to the focused application.
//!
//! Three delivery styles exist: one Unicode string per event (the default),
//! one key event per cell ("step by step", for terminals, launchers and
//! apps that drop batched input), and accessibility replacement for
//! launcher overlays. Which one runs is decided by the [`OutputPlan`]; this
//! module only carries it out.

use crate::code_table::CodeTable;
use crate::config::Config;
use crate::context::TargetContext;
use crate::decision::{macro_plan, BackspaceAdjustment, OutputPlan};
use crate::engine::{EngineSignal, PackedCell, SignalCode};
use crate::injection::Injector;
use crate::keys::{self, EventFlags};
use crate::pacing::sequence_plan;
use crate::platform::Accessibility;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// UTF-16 code units per synthetic Unicode string.
pub const MAX_UNITS_PER_STRING: usize = 16;

/// Everything the output functions touch for one event.
pub struct OutputContext<'a> {
    pub injector: &'a mut Injector,
    pub accessibility: &'a dyn Accessibility,
    pub target: &'a TargetContext,
    pub safe_mode: bool,
    /// Backspaces handed over to the accessibility replacement.
    pub pending_backspace: &'a mut usize,
}

impl OutputContext<'_> {
    /// Launchers and precomposed-batched apps cannot take combining marks.
    fn force_precomposed(&self) -> bool {
        let table = self.injector.code_table();
        (table == CodeTable::UnicodeCompound && self.target.is_spotlight_target())
            || (matches!(table, CodeTable::Unicode | CodeTable::UnicodeCompound)
                && self.target.characteristics.needs_precomposed_batched)
    }

    fn precomposed(&self, units: Vec<u16>) -> Vec<u16> {
        if self.force_precomposed() {
            String::from_utf16_lossy(&units).nfc().collect::<String>().encode_utf16().collect()
        } else {
            units
        }
    }

    /// Replace the last `backspaces` characters with `units` through the
    /// accessibility API. Never attempted in safe mode.
    fn try_ax_replace(&self, backspaces: usize, units: &[u16]) -> bool {
        if self.safe_mode {
            return false;
        }
        let text = String::from_utf16_lossy(units);
        let replaced = self
            .accessibility
            .replace_focused_text(backspaces, &text, backspaces > 0);
        if !replaced {
            debug!(backspaces, "accessibility replacement failed, falling back to key events");
        }
        replaced
    }
}

/// Type `cells` as Unicode strings of at most [`MAX_UNITS_PER_STRING`]
/// code units each.
///
/// A cell is never split across two strings, so a batch ends early when the
/// next cell's units would not fit. For restore signals the trigger key's
/// character goes at the end of the last string; a trigger key without a
/// character is replayed as a raw key afterwards. Returns whether the engine
/// should start a new session.
pub fn send_new_char_string(
    ctx: &mut OutputContext<'_>,
    cells: &[PackedCell],
    code: SignalCode,
    key: u16,
    flags: EventFlags,
) -> bool {
    let mut send_control_key = false;
    let mut trigger = Vec::with_capacity(2);
    if code.is_restore() {
        match keys::key_to_char(key, flags.has_caps()) {
            Some(ch) => {
                let mut tmp = [0u16; 2];
                trigger.extend_from_slice(ch.encode_utf16(&mut tmp));
            }
            None => send_control_key = true,
        }
    }

    let mut units = Vec::with_capacity(MAX_UNITS_PER_STRING);
    let mut staged = Vec::with_capacity(2);
    for &cell in cells {
        staged.clear();
        ctx.injector.stage_cell(cell, &mut staged);
        if !units.is_empty() && units.len() + staged.len() > MAX_UNITS_PER_STRING {
            flush_batch(ctx, &mut units);
        }
        units.extend_from_slice(&staged);
    }
    if !units.is_empty() && units.len() + trigger.len() > MAX_UNITS_PER_STRING {
        flush_batch(ctx, &mut units);
    }
    units.extend_from_slice(&trigger);
    flush_batch(ctx, &mut units);

    if send_control_key {
        ctx.injector.send_key_code_cell(key, false);
    }
    code == SignalCode::RestoreAndNewSession
}

fn flush_batch(ctx: &mut OutputContext<'_>, units: &mut Vec<u16>) {
    let batch = ctx.precomposed(std::mem::take(units));
    deliver_units(ctx, &batch);
}

/// One batch goes out as one event, except on CLI targets where the
/// profile's chunk size and text delay apply.
fn deliver_units(ctx: &mut OutputContext<'_>, units: &[u16]) {
    if ctx.target.is_spotlight_target() {
        let backspaces = std::mem::take(ctx.pending_backspace);
        if ctx.try_ax_replace(backspaces, units) {
            return;
        }
        ctx.injector.send_backspace_sequence(backspaces);
        ctx.injector.send_unicode_chunked(units, units.len(), 0);
        return;
    }
    let pacing = ctx.injector.pacing();
    match pacing.text_chunk_size() {
        Some(chunk_size) => {
            let delay = pacing.text_delay_us();
            ctx.injector.send_unicode_chunked(units, chunk_size, delay);
        }
        None => ctx.injector.send_unicode_chunked(units, units.len(), 0),
    }
}

/// One key event per cell, spaced by the scaled text delay on CLI targets.
pub fn step_by_step(ctx: &mut OutputContext<'_>, cells: &[PackedCell]) {
    let pacing = ctx.injector.pacing();
    let plan = sequence_plan(
        pacing.is_cli(),
        cells.len(),
        pacing.scaled(pacing.text_delay_us()),
        pacing.scaled(pacing.post_send_block_us()),
    );
    for (i, &cell) in cells.iter().enumerate() {
        if i > 0 {
            ctx.injector.sleep_us(plan.inter_item_delay_us);
        }
        ctx.injector.send_cell(cell);
    }
    if plan.schedule_cli_block {
        let now = ctx.injector.now_us();
        ctx.injector.pacing_mut().schedule_block(plan.cli_block_us, now);
    }
}

/// Carry out a WillProcess/Restore plan. Returns whether the engine should
/// start a new session.
pub fn execute_plan(
    ctx: &mut OutputContext<'_>,
    plan: &OutputPlan,
    signal: &EngineSignal,
    key: u16,
    flags: EventFlags,
) -> bool {
    match plan.adjustment {
        BackspaceAdjustment::None => {}
        BackspaceAdjustment::SendShiftLeftThenBackspace => {
            ctx.injector.send_shift_left();
            ctx.injector.send_physical_backspace();
        }
        BackspaceAdjustment::SendEmptyCharacter => ctx.injector.send_empty_character(),
    }

    let backspaces = plan.sanitized_backspace_count;
    if plan.defer_backspace_to_ax {
        *ctx.pending_backspace = backspaces;
    } else {
        ctx.injector.send_backspace_sequence(backspaces);
    }

    if !plan.use_step_by_step {
        return send_new_char_string(ctx, &signal.new_chars, signal.code, key, flags);
    }

    if plan.defer_backspace_to_ax {
        // Launchers get one accessibility edit for the whole replacement
        // before falling back to key events.
        let backspaces = std::mem::take(ctx.pending_backspace);
        let snapshot = ctx.injector.sync().clone();
        let mut units = Vec::new();
        for &cell in &signal.new_chars {
            ctx.injector.stage_cell(cell, &mut units);
        }
        let mut control_key = false;
        if signal.code.is_restore() {
            match keys::key_to_char(key, flags.has_caps()) {
                Some(ch) => {
                    let mut tmp = [0u16; 2];
                    units.extend_from_slice(ch.encode_utf16(&mut tmp));
                }
                None => control_key = true,
            }
        }
        let units = ctx.precomposed(units);
        if !units.is_empty() && ctx.try_ax_replace(backspaces, &units) {
            if control_key && plan.replay_trigger_key {
                ctx.injector.send_key_code_cell(key, false);
            }
            return plan.start_new_session;
        }
        *ctx.injector.sync_mut() = snapshot;
        ctx.injector.send_backspace_sequence(backspaces);
    }

    step_by_step(ctx, &signal.new_chars);
    if plan.replay_trigger_key {
        ctx.injector.send_key_code_cell(key, flags.has_caps());
    }
    plan.start_new_session
}

/// Expand a macro in place of its shortcut.
pub fn handle_macro(
    ctx: &mut OutputContext<'_>,
    signal: &EngineSignal,
    key: u16,
    flags: EventFlags,
    config: &Config,
) {
    let target = ctx.target;
    let plan = macro_plan(
        target.post_to_hid,
        target.characteristics.is_spotlight_like,
        config.fix_browser_autocomplete,
        signal.backspace_count,
        target.is_cli,
        config.send_key_step_by_step,
        target.characteristics.needs_step_by_step,
    );
    debug!(
        backspaces = signal.backspace_count,
        cells = signal.macro_data.len(),
        step_by_step = plan.use_step_by_step,
        "expanding macro"
    );

    if plan.try_ax_replacement {
        let snapshot = ctx.injector.sync().clone();
        let mut units = Vec::new();
        for &cell in &signal.macro_data {
            ctx.injector.stage_cell(cell, &mut units);
        }
        let units = ctx.precomposed(units);
        if ctx.try_ax_replace(signal.backspace_count, &units) {
            return;
        }
        *ctx.injector.sync_mut() = snapshot;
    }

    let mut backspaces = signal.backspace_count;
    if plan.apply_browser_fix {
        ctx.injector.send_empty_character();
        backspaces = plan.adjusted_backspace_count;
    }
    ctx.injector.send_backspace_sequence(backspaces);

    if plan.use_step_by_step {
        step_by_step(ctx, &signal.macro_data);
    } else {
        // Macro text is typed verbatim, never as a restore.
        send_new_char_string(ctx, &signal.macro_data, SignalCode::ReplaceMacro, key, flags);
    }

    if plan.send_trigger_key {
        let caps = flags.contains(EventFlags::SHIFT);
        ctx.injector.send_key_code_cell(key, caps);
    }
}
