//! Signal-to-plan decision tables.
//!
//! Everything here is a pure function of the engine signal, the resolved
//! target context and the settings snapshot. The only side effects are the
//! accessibility probes in [`OutputPlan::build`], which run only when a
//! browser fix is actually on the table, since probing is expensive.
//!
//! The trigger conditions for the browser fixes are heuristics carried over
//! as a contract: the probe gates (`is_potential_shortcut`,
//! `should_skip_space`) are not to be "improved" without new evidence from
//! real applications.

use crate::app_rules::{FIGMA, NOTION};
use crate::code_table::CodeTable;
use crate::context::TargetContext;
use crate::engine::{ext, SignalCode, MAX_BUFFER};
use crate::keys;
use crate::platform::Accessibility;
use serde::Serialize;
use tracing::debug;

/// Hard ceiling on backspaces sent for one key. Anything above it means a
/// bug upstream and must not eat unrelated text.
pub const SAFETY_BACKSPACE_LIMIT: usize = 15;

// ========== Signal dispatch ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    DoNothing,
    ProcessSignal,
    ReplaceMacro,
}

pub fn signal_action(code: SignalCode) -> SignalAction {
    match code {
        SignalCode::DoNothing => SignalAction::DoNothing,
        SignalCode::WillProcess | SignalCode::Restore | SignalCode::RestoreAndNewSession => {
            SignalAction::ProcessSignal
        }
        SignalCode::ReplaceMacro => SignalAction::ReplaceMacro,
    }
}

// ========== Sync stack maintenance ==========

/// What the DoNothing path does to the sync key stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKeyAction {
    None,
    Clear,
    Pop,
    /// Pop, then delete the character's second unit with one extra
    /// physical backspace.
    PopAndSendBackspace,
    InsertOne,
}

/// `back` is the top of the sync stack, `None` when empty.
pub fn sync_key_action(
    table: CodeTable,
    ext_code: u8,
    back: Option<usize>,
    compound_quirk: bool,
) -> SyncKeyAction {
    if !table.is_double_code() {
        return SyncKeyAction::None;
    }
    match ext_code {
        ext::WORD_BREAK => SyncKeyAction::Clear,
        ext::DELETE => match back {
            None => SyncKeyAction::None,
            Some(units) if units > 1 && (table == CodeTable::VniWindows || !compound_quirk) => {
                SyncKeyAction::PopAndSendBackspace
            }
            Some(_) => SyncKeyAction::Pop,
        },
        ext::INSERT_ONE => SyncKeyAction::InsertOne,
        _ => SyncKeyAction::None,
    }
}

// ========== Process-signal strategy ==========

/// Inputs to [`process_signal_plan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyInput<'a> {
    pub app_id: &'a str,
    pub key: u16,
    pub ext_code: u8,
    pub backspace_count: usize,
    pub new_char_count: usize,
    pub is_browser: bool,
    pub is_spotlight_target: bool,
    pub needs_precomposed_batched: bool,
    pub browser_fix_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProcessSignalPlan {
    /// Space held as Figma's hand tool must reach the app untouched.
    pub bypass_for_figma: bool,
    pub is_special_app: bool,
    pub is_potential_shortcut: bool,
    pub is_browser_fix: bool,
    pub should_skip_space: bool,
    pub try_address_bar_fix: bool,
    pub try_legacy_fix: bool,
    pub is_notion: bool,
}

pub fn process_signal_plan(input: &StrategyInput<'_>) -> ProcessSignalPlan {
    let is_space = input.key == keys::SPACE;
    let has_backspace = input.backspace_count > 0;
    let not_shortcut_like = input.ext_code != ext::SHORTCUT_LIKE;

    let bypass_for_figma =
        is_space && !has_backspace && input.new_char_count == 1 && input.app_id == FIGMA;
    let is_special_app = input.is_spotlight_target || input.needs_precomposed_batched;
    let is_potential_shortcut = input.key == keys::SLASH;
    let is_browser_fix = input.browser_fix_enabled && input.is_browser;
    let should_skip_space = is_space && !has_backspace;
    let is_notion = input.app_id.eq_ignore_ascii_case(NOTION);

    let try_address_bar_fix = is_browser_fix
        && not_shortcut_like
        && has_backspace
        && !is_special_app
        && !should_skip_space
        && !is_potential_shortcut;

    let try_legacy_fix = input.browser_fix_enabled
        && not_shortcut_like
        && has_backspace
        && (!is_special_app || is_notion)
        && !is_space
        && !is_potential_shortcut
        && !input.is_browser;

    ProcessSignalPlan {
        bypass_for_figma,
        is_special_app,
        is_potential_shortcut,
        is_browser_fix,
        should_skip_space,
        try_address_bar_fix,
        try_legacy_fix,
        is_notion,
    }
}

// ========== Backspace plan ==========

/// Correction sent before the backspaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackspaceAdjustment {
    #[default]
    None,
    /// Select the previous character and delete it in one go.
    SendShiftLeftThenBackspace,
    /// Type an invisible placeholder that the extra backspace removes,
    /// dismissing autocomplete suggestions first.
    SendEmptyCharacter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BackspacePlan {
    pub adjustment: BackspaceAdjustment,
    /// Count after the adjustment, before clamping.
    pub adjusted_count: usize,
    pub sanitized_count: usize,
    pub clamped: bool,
}

/// Probe results feeding [`resolved_backspace_plan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BackspaceProbes {
    pub address_bar_detected: bool,
    pub notion_code_block_detected: bool,
}

pub fn backspace_adjustment(
    plan: &ProcessSignalPlan,
    probes: BackspaceProbes,
    compound_quirk: bool,
    backspace_count: usize,
) -> (BackspaceAdjustment, usize) {
    if backspace_count == 0 {
        return (BackspaceAdjustment::None, 0);
    }
    if plan.try_address_bar_fix && probes.address_bar_detected {
        return (BackspaceAdjustment::SendEmptyCharacter, backspace_count + 1);
    }
    if plan.try_legacy_fix && !probes.notion_code_block_detected {
        return if compound_quirk {
            (
                BackspaceAdjustment::SendShiftLeftThenBackspace,
                backspace_count - 1,
            )
        } else {
            (BackspaceAdjustment::SendEmptyCharacter, backspace_count + 1)
        };
    }
    (BackspaceAdjustment::None, backspace_count)
}

pub fn sanitized_backspace_count(adjusted: usize, max_buffer: usize, safety_limit: usize) -> usize {
    adjusted.min(max_buffer).min(safety_limit)
}

pub fn resolved_backspace_plan(
    plan: &ProcessSignalPlan,
    probes: BackspaceProbes,
    compound_quirk: bool,
    backspace_count: usize,
) -> BackspacePlan {
    let (adjustment, adjusted_count) =
        backspace_adjustment(plan, probes, compound_quirk, backspace_count);
    let sanitized_count =
        sanitized_backspace_count(adjusted_count, MAX_BUFFER, SAFETY_BACKSPACE_LIMIT);
    let clamped = sanitized_count != adjusted_count;
    if clamped {
        debug!(adjusted_count, sanitized_count, "backspace count clamped");
    }
    BackspacePlan {
        adjustment,
        adjusted_count,
        sanitized_count,
        clamped,
    }
}

// ========== Delivery ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CharacterSendPlan {
    pub defer_backspace_to_ax: bool,
    pub use_step_by_step: bool,
    pub replay_trigger_key: bool,
    pub start_new_session: bool,
}

pub fn character_send_plan(
    spotlight_target: bool,
    cli_target: bool,
    global_step_by_step: bool,
    app_needs_step_by_step: bool,
    key: u16,
    code: SignalCode,
) -> CharacterSendPlan {
    let auto_english_with_enter = code == SignalCode::RestoreAndNewSession
        && (key == keys::ENTER || key == keys::RETURN);
    let use_step_by_step = spotlight_target
        || cli_target
        || global_step_by_step
        || app_needs_step_by_step
        || auto_english_with_enter;
    CharacterSendPlan {
        defer_backspace_to_ax: spotlight_target,
        use_step_by_step,
        replay_trigger_key: use_step_by_step && code.is_restore(),
        start_new_session: use_step_by_step && code == SignalCode::RestoreAndNewSession,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MacroPlan {
    pub is_spotlight_like: bool,
    pub try_ax_replacement: bool,
    pub apply_browser_fix: bool,
    pub adjusted_backspace_count: usize,
    pub use_step_by_step: bool,
    pub send_trigger_key: bool,
}

pub fn macro_plan(
    post_to_hid: bool,
    app_spotlight_like: bool,
    browser_fix_enabled: bool,
    backspace_count: usize,
    cli_target: bool,
    global_step_by_step: bool,
    app_needs_step_by_step: bool,
) -> MacroPlan {
    let is_spotlight_like = post_to_hid || app_spotlight_like;
    MacroPlan {
        is_spotlight_like,
        try_ax_replacement: is_spotlight_like,
        apply_browser_fix: browser_fix_enabled,
        adjusted_backspace_count: backspace_count + usize::from(browser_fix_enabled),
        use_step_by_step: cli_target || global_step_by_step || app_needs_step_by_step,
        send_trigger_key: !is_spotlight_like,
    }
}

/// Launchers cannot render combining sequences, so Compound output switches
/// to precomposed Unicode for the event.
pub fn temporarily_use_unicode(table: CodeTable, overlay_active: bool, spotlight_like: bool) -> bool {
    table == CodeTable::UnicodeCompound && (overlay_active || spotlight_like)
}

// ========== Output plan ==========

/// Per-event inputs to [`OutputPlan::build`].
#[derive(Debug, Clone, Copy)]
pub struct PlanInput<'a> {
    pub key: u16,
    pub code: SignalCode,
    pub ext_code: u8,
    pub backspace_count: usize,
    pub new_char_count: usize,
    pub target: &'a TargetContext,
    pub browser_fix_enabled: bool,
    pub global_step_by_step: bool,
    pub safe_mode: bool,
    /// An OS text replacement was seen recently.
    pub external_delete_recent: bool,
}

/// How one WillProcess/Restore signal is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OutputPlan {
    pub bypass: bool,
    pub sanitized_backspace_count: usize,
    pub adjustment: BackspaceAdjustment,
    pub defer_backspace_to_ax: bool,
    pub use_step_by_step: bool,
    pub replay_trigger_key: bool,
    pub start_new_session: bool,
    pub clamped: bool,
}

impl OutputPlan {
    /// Build the plan. `accessibility` is consulted only when a browser fix
    /// is being considered and never in safe mode.
    pub fn build(input: &PlanInput<'_>, accessibility: &dyn Accessibility) -> Self {
        let target = input.target;
        let spotlight_target = target.is_spotlight_target();
        let strategy = process_signal_plan(&StrategyInput {
            app_id: target.effective_app(),
            key: input.key,
            ext_code: input.ext_code,
            backspace_count: input.backspace_count,
            new_char_count: input.new_char_count,
            is_browser: target.is_browser,
            is_spotlight_target: spotlight_target,
            needs_precomposed_batched: target.characteristics.needs_precomposed_batched,
            browser_fix_enabled: input.browser_fix_enabled,
        });

        if strategy.bypass_for_figma {
            debug!("space passed through for figma");
            return OutputPlan {
                bypass: true,
                ..OutputPlan::default()
            };
        }

        let probes = BackspaceProbes {
            address_bar_detected: strategy.try_address_bar_fix
                && !input.safe_mode
                && accessibility.is_address_bar_focused(),
            notion_code_block_detected: strategy.try_legacy_fix
                && strategy.is_notion
                && !input.safe_mode
                && accessibility.is_notion_code_block(),
        };
        let backspace = resolved_backspace_plan(
            &strategy,
            probes,
            target.characteristics.contains_unicode_compound,
            input.backspace_count,
        );

        if text_replacement_bypass(input) {
            debug!("space looks like an os text replacement, passing through");
            return OutputPlan {
                bypass: true,
                sanitized_backspace_count: backspace.sanitized_count,
                adjustment: backspace.adjustment,
                clamped: backspace.clamped,
                ..OutputPlan::default()
            };
        }

        let send = character_send_plan(
            spotlight_target,
            target.is_cli,
            input.global_step_by_step,
            target.characteristics.needs_step_by_step,
            input.key,
            input.code,
        );

        OutputPlan {
            bypass: false,
            sanitized_backspace_count: backspace.sanitized_count,
            adjustment: backspace.adjustment,
            defer_backspace_to_ax: send.defer_backspace_to_ax,
            use_step_by_step: send.use_step_by_step,
            replay_trigger_key: send.replay_trigger_key,
            start_new_session: send.start_new_session,
            clamped: backspace.clamped,
        }
    }
}

/// Only a bare Space that the engine left alone can be the OS's own
/// replacement side effect.
pub fn should_evaluate_text_replacement(key: u16, backspace_count: usize, new_char_count: usize) -> bool {
    key == keys::SPACE && backspace_count == 0 && new_char_count == 0
}

fn text_replacement_bypass(input: &PlanInput<'_>) -> bool {
    should_evaluate_text_replacement(input.key, input.backspace_count, input.new_char_count)
        && input.external_delete_recent
}
