//! Rate adaptation for command-line targets.
//!
//! Terminal emulators and IDE terminals echo injected input asynchronously.
//! Sending a replacement too quickly, or accepting the next keystroke before
//! the previous replacement landed, interleaves characters. For such targets
//! the pacing controller
//!
//! - picks a timing profile per application class,
//! - tracks a speed factor from the user's keystroke rhythm, so fast typists
//!   get proportionally longer delays, and
//! - keeps a "block until" deadline that the event callback waits out before
//!   processing the next key-down.

use crate::app_rules::{AppRules, TerminalSpeed};
use crate::clock::Sleeper;
use serde::{Deserialize, Serialize};

/// Floor for the post-send block window.
pub const MIN_POST_SEND_BLOCK_US: u64 = 20_000;

const FAST_THRESHOLD_US: u64 = 20_000;
const MEDIUM_THRESHOLD_US: u64 = 32_000;
const SLOW_THRESHOLD_US: u64 = 48_000;
const FAST_FACTOR: f64 = 2.1;
const MEDIUM_FACTOR: f64 = 1.6;
const SLOW_FACTOR: f64 = 1.3;

/// Timing class of a CLI target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CliProfileKind {
    Ide,
    FastTerminal,
    MediumTerminal,
    SlowTerminal,
    Default,
}

impl CliProfileKind {
    pub fn for_app(rules: &AppRules, app: Option<&str>) -> Self {
        let Some(app) = app.filter(|a| !a.is_empty()) else {
            return CliProfileKind::Default;
        };
        if rules.is_ide(app) {
            return CliProfileKind::Ide;
        }
        match rules.terminal_speed(app) {
            Some(TerminalSpeed::Fast) => CliProfileKind::FastTerminal,
            Some(TerminalSpeed::Medium) => CliProfileKind::MediumTerminal,
            Some(TerminalSpeed::Slow) => CliProfileKind::SlowTerminal,
            None => CliProfileKind::Default,
        }
    }
}

/// Delays used when sending to a CLI target, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliTimingProfile {
    pub kind: CliProfileKind,
    pub backspace_delay_us: u64,
    pub wait_after_backspace_us: u64,
    pub text_delay_us: u64,
    pub text_chunk_size: usize,
    pub post_send_block_us: u64,
}

impl CliTimingProfile {
    pub fn for_kind(kind: CliProfileKind) -> Self {
        let (backspace_delay_us, wait_after_backspace_us, text_delay_us) = match kind {
            CliProfileKind::Ide => (8_000, 25_000, 8_000),
            CliProfileKind::FastTerminal => (6_000, 18_000, 5_000),
            CliProfileKind::MediumTerminal => (9_000, 27_000, 7_000),
            CliProfileKind::SlowTerminal => (12_000, 36_000, 9_000),
            CliProfileKind::Default => (8_000, 24_000, 6_000),
        };
        Self {
            kind,
            backspace_delay_us,
            wait_after_backspace_us,
            text_delay_us,
            text_chunk_size: 1,
            post_send_block_us: MIN_POST_SEND_BLOCK_US.max(text_delay_us * 3),
        }
    }

    pub fn for_app(rules: &AppRules, app: Option<&str>) -> Self {
        Self::for_kind(CliProfileKind::for_app(rules, app))
    }
}

/// Speed factor implied by the gap between two key-downs.
pub fn target_speed_factor(delta_us: u64) -> f64 {
    match delta_us {
        0 => 1.0,
        d if d <= FAST_THRESHOLD_US => FAST_FACTOR,
        d if d <= MEDIUM_THRESHOLD_US => MEDIUM_FACTOR,
        d if d <= SLOW_THRESHOLD_US => SLOW_FACTOR,
        _ => 1.0,
    }
}

/// Rising targets apply at once; falling ones are smoothed.
pub fn next_speed_factor(delta_us: u64, current: f64) -> f64 {
    let target = target_speed_factor(delta_us);
    if target >= current {
        target
    } else {
        (current * 0.7 + target * 0.3).max(1.0)
    }
}

/// `us` stretched by the speed factor.
pub fn scale(us: u64, factor: f64) -> u64 {
    if factor <= 0.0 {
        return us;
    }
    (us as f64 * factor).round() as u64
}

/// Timing of a step-by-step send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequencePlan {
    pub inter_item_delay_us: u64,
    pub schedule_cli_block: bool,
    pub cli_block_us: u64,
}

pub fn sequence_plan(
    cli: bool,
    item_count: usize,
    scaled_text_delay_us: u64,
    scaled_post_block_us: u64,
) -> SequencePlan {
    if !cli || item_count == 0 {
        return SequencePlan::default();
    }
    let mut cli_block_us = scaled_post_block_us;
    if scaled_text_delay_us > 0 && item_count > 1 {
        cli_block_us += scaled_text_delay_us * (item_count as u64 - 1);
    }
    SequencePlan {
        inter_item_delay_us: scaled_text_delay_us,
        schedule_cli_block: true,
        cli_block_us,
    }
}

/// Per-callback pacing state: the active profile, the speed factor and the
/// block deadline.
#[derive(Debug, Clone)]
pub struct PacingController {
    profile: Option<CliTimingProfile>,
    speed_factor: f64,
    last_keydown_us: Option<u64>,
    block_until_us: Option<u64>,
}

impl Default for PacingController {
    fn default() -> Self {
        Self::new()
    }
}

impl PacingController {
    pub fn new() -> Self {
        Self {
            profile: None,
            speed_factor: 1.0,
            last_keydown_us: None,
            block_until_us: None,
        }
    }

    /// `None` leaves CLI mode.
    pub fn apply_profile(&mut self, profile: Option<CliTimingProfile>) {
        self.profile = profile;
    }

    pub fn profile(&self) -> Option<&CliTimingProfile> {
        self.profile.as_ref()
    }

    pub fn is_cli(&self) -> bool {
        self.profile.is_some()
    }

    pub fn speed_factor(&self) -> f64 {
        self.speed_factor
    }

    /// Feed the time of a key-down to a CLI target.
    pub fn update_speed_factor(&mut self, now_us: u64) {
        match self.last_keydown_us.replace(now_us) {
            None => self.speed_factor = 1.0,
            Some(last) => {
                self.speed_factor = next_speed_factor(now_us.saturating_sub(last), self.speed_factor);
            }
        }
    }

    pub fn reset_speed_state(&mut self) {
        self.speed_factor = 1.0;
        self.last_keydown_us = None;
    }

    pub fn scaled(&self, us: u64) -> u64 {
        scale(us, self.speed_factor)
    }

    pub fn backspace_delay_us(&self) -> u64 {
        self.profile.map_or(0, |p| p.backspace_delay_us)
    }

    pub fn wait_after_backspace_us(&self) -> u64 {
        self.profile.map_or(0, |p| p.wait_after_backspace_us)
    }

    pub fn text_delay_us(&self) -> u64 {
        self.profile.map_or(0, |p| p.text_delay_us)
    }

    /// Units per posted chunk on CLI targets. `None` elsewhere: the whole
    /// string goes out as one event.
    pub fn text_chunk_size(&self) -> Option<usize> {
        self.profile.map(|p| p.text_chunk_size.max(1))
    }

    pub fn post_send_block_us(&self) -> u64 {
        self.profile
            .map_or(MIN_POST_SEND_BLOCK_US, |p| p.post_send_block_us.max(MIN_POST_SEND_BLOCK_US))
    }

    /// Extend the block deadline; it never moves backwards.
    pub fn schedule_block(&mut self, us: u64, now_us: u64) {
        if us == 0 {
            return;
        }
        let until = now_us + us;
        if self.block_until_us.map_or(true, |current| until > current) {
            self.block_until_us = Some(until);
        }
    }

    pub fn remaining_block_us(&self, now_us: u64) -> u64 {
        self.block_until_us
            .map_or(0, |until| until.saturating_sub(now_us))
    }

    /// Sleep out the remaining block window. Returns the time slept.
    pub fn wait_for_gate(&self, now_us: u64, sleeper: &dyn Sleeper) -> u64 {
        let remaining = self.remaining_block_us(now_us);
        if remaining > 0 {
            sleeper.sleep_us(remaining);
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingSleeper;

    #[test]
    fn test_profiles() {
        let ide = CliTimingProfile::for_kind(CliProfileKind::Ide);
        assert_eq!(ide.post_send_block_us, 24_000);
        let fast = CliTimingProfile::for_kind(CliProfileKind::FastTerminal);
        assert_eq!(fast.post_send_block_us, 20_000);
        let slow = CliTimingProfile::for_kind(CliProfileKind::SlowTerminal);
        assert_eq!(slow.post_send_block_us, 27_000);
        assert_eq!(slow.text_chunk_size, 1);
    }

    #[test]
    fn test_profile_kind_for_app() {
        let rules = AppRules::new();
        assert_eq!(CliProfileKind::for_app(&rules, Some("com.microsoft.VSCode")), CliProfileKind::Ide);
        assert_eq!(CliProfileKind::for_app(&rules, Some("io.alacritty")), CliProfileKind::FastTerminal);
        assert_eq!(CliProfileKind::for_app(&rules, Some("com.apple.Terminal")), CliProfileKind::MediumTerminal);
        assert_eq!(CliProfileKind::for_app(&rules, Some("org.example")), CliProfileKind::Default);
        assert_eq!(CliProfileKind::for_app(&rules, None), CliProfileKind::Default);
    }

    #[test]
    fn test_speed_factor_thresholds() {
        assert_eq!(target_speed_factor(0), 1.0);
        assert_eq!(target_speed_factor(20_000), 2.1);
        assert_eq!(target_speed_factor(32_000), 1.6);
        assert_eq!(target_speed_factor(48_000), 1.3);
        assert_eq!(target_speed_factor(48_001), 1.0);
    }

    #[test]
    fn test_speed_factor_rises_fast_and_falls_slowly() {
        let mut pacing = PacingController::new();
        pacing.update_speed_factor(1_000_000);
        assert_eq!(pacing.speed_factor(), 1.0);
        pacing.update_speed_factor(1_015_000);
        assert_eq!(pacing.speed_factor(), 2.1);
        pacing.update_speed_factor(1_515_000);
        let expected = 2.1 * 0.7 + 1.0 * 0.3;
        assert!((pacing.speed_factor() - expected).abs() < 1e-9);
        pacing.reset_speed_state();
        assert_eq!(pacing.speed_factor(), 1.0);
    }

    #[test]
    fn test_scale_rounds() {
        assert_eq!(scale(8_000, 1.0), 8_000);
        assert_eq!(scale(8_000, 2.1), 16_800);
        assert_eq!(scale(5, 1.3), 7);
    }

    #[test]
    fn test_block_gate_is_monotonic() {
        let mut pacing = PacingController::new();
        pacing.schedule_block(30_000, 0);
        pacing.schedule_block(10_000, 0);
        assert_eq!(pacing.remaining_block_us(5_000), 25_000);
        let sleeper = RecordingSleeper::new();
        assert_eq!(pacing.wait_for_gate(5_000, &sleeper), 25_000);
        assert_eq!(sleeper.sleeps(), vec![25_000]);
        assert_eq!(pacing.remaining_block_us(40_000), 0);
    }

    #[test]
    fn test_sequence_plan() {
        assert_eq!(sequence_plan(false, 3, 5_000, 20_000), SequencePlan::default());
        let plan = sequence_plan(true, 3, 5_000, 20_000);
        assert_eq!(plan.inter_item_delay_us, 5_000);
        assert!(plan.schedule_cli_block);
        assert_eq!(plan.cli_block_us, 30_000);
        assert_eq!(sequence_plan(true, 1, 5_000, 20_000).cli_block_us, 20_000);
    }

    #[test]
    fn test_non_cli_defaults() {
        let pacing = PacingController::new();
        assert!(!pacing.is_cli());
        assert_eq!(pacing.text_chunk_size(), None);
        assert_eq!(pacing.backspace_delay_us(), 0);
    }
}
