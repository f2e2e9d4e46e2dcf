//! Synthetic event injection.
//!
//! The [`Injector`] turns output cells into key events and hands them to an
//! [`EventPoster`]. It owns the two pieces of state that must track exactly
//! what was typed into the target: the sync key stack (units per character
//! for double-code tables) and the pacing controller (CLI delays and the
//! block deadline).
//!
//! Every posted event carries [`INJECTION_MARKER`] so the tap can recognise
//! and skip its own output.

use crate::clock::{Clock, Sleeper};
use crate::code_table::CodeTable;
use crate::engine::PackedCell;
use crate::event::INJECTION_MARKER;
use crate::keys::{self, EventFlags};
use crate::pacing::{CliTimingProfile, PacingController};
use crate::sync_stack::SyncKeyStack;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Narrow no-break space, typed as an invisible placeholder.
pub const EMPTY_CHARACTER: u16 = 0x202F;
/// Zero-width non-joiner, used instead of [`EMPTY_CHARACTER`] by apps that
/// render the no-break space visibly.
pub const NICE_SPACE_CHARACTER: u16 = 0x200C;

/// Delay before a CLI backspace burst when the user is typing fast.
const FAST_TYPING_PRE_BURST_US: u64 = 4_000;

/// Where synthetic events are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostTarget {
    /// Hardware level, seen by launcher overlays.
    HidTap,
    /// Session level, used for terminals.
    SessionTap,
    /// Through the tap proxy to the event's own target.
    #[default]
    Proxy,
}

/// One synthetic key event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticEvent {
    pub target: PostTarget,
    pub key_down: bool,
    pub key_code: u16,
    pub flags: EventFlags,
    /// Unicode payload; replaces whatever `key_code` would type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<u16>,
    pub user_data: i64,
    #[serde(default)]
    pub keyboard_type: i64,
}

impl PostTarget {
    pub fn for_target(post_to_hid: bool, cli: bool) -> Self {
        if post_to_hid {
            PostTarget::HidTap
        } else if cli {
            PostTarget::SessionTap
        } else {
            PostTarget::Proxy
        }
    }
}

impl SyntheticEvent {
    pub fn text(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }

    pub fn is_backspace(&self) -> bool {
        self.key_code == keys::DELETE && self.units.is_empty()
    }
}

/// Sink for synthetic events.
pub trait EventPoster: Send + Sync {
    fn post(&self, event: SyntheticEvent);
}

/// Poster that keeps every event, for tests and trace replay.
#[derive(Debug, Default)]
pub struct RecordingPoster {
    events: Mutex<Vec<SyntheticEvent>>,
}

impl RecordingPoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyntheticEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<SyntheticEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn key_downs(&self) -> Vec<SyntheticEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.key_down)
            .cloned()
            .collect()
    }

    pub fn backspace_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.key_down && e.is_backspace())
            .count()
    }

    /// Text a plain editor would show after receiving the recorded key-downs,
    /// starting from `initial` with the caret at the end.
    pub fn rendered_text(&self, initial: &str) -> String {
        let mut buffer: Vec<u16> = initial.encode_utf16().collect();
        let mut selected = 0usize;
        for event in self.events.lock().iter().filter(|e| e.key_down) {
            if !event.units.is_empty() {
                buffer.truncate(buffer.len() - selected);
                selected = 0;
                buffer.extend_from_slice(&event.units);
                continue;
            }
            match event.key_code {
                keys::DELETE => {
                    if selected > 0 {
                        buffer.truncate(buffer.len() - selected);
                        selected = 0;
                    } else {
                        buffer.pop();
                    }
                }
                keys::LEFT if event.flags.contains(EventFlags::SHIFT) => {
                    selected = (selected + 1).min(buffer.len());
                }
                key => {
                    if let Some(ch) = keys::key_to_char(key, event.flags.has_caps()) {
                        buffer.truncate(buffer.len() - selected);
                        selected = 0;
                        let mut tmp = [0u16; 2];
                        buffer.extend_from_slice(ch.encode_utf16(&mut tmp));
                    }
                }
            }
        }
        String::from_utf16_lossy(&buffer)
    }
}

impl EventPoster for RecordingPoster {
    fn post(&self, event: SyntheticEvent) {
        self.events.lock().push(event);
    }
}

/// Flags every synthetic event carries.
pub fn synthetic_flags(flags: EventFlags) -> EventFlags {
    let mut flags = flags | EventFlags::NON_COALESCED;
    flags.remove(EventFlags::SECONDARY_FN);
    flags
}

/// Posts synthetic events and keeps the sync stack and pacing state in line
/// with what was posted.
pub struct Injector {
    poster: Arc<dyn EventPoster>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    target: PostTarget,
    keyboard_type: i64,
    code_table: CodeTable,
    /// The target mishandles a second backspace for compound characters.
    compound_quirk: bool,
    nice_space: bool,
    sync: SyncKeyStack,
    pacing: PacingController,
}

impl Injector {
    pub fn new(poster: Arc<dyn EventPoster>, sleeper: Arc<dyn Sleeper>, clock: Arc<dyn Clock>) -> Self {
        Self {
            poster,
            sleeper,
            clock,
            target: PostTarget::Proxy,
            keyboard_type: 0,
            code_table: CodeTable::Unicode,
            compound_quirk: false,
            nice_space: false,
            sync: SyncKeyStack::new(),
            pacing: PacingController::new(),
        }
    }

    /// Per-event setup. Leaving a CLI target forgets the typing rhythm.
    pub fn configure(
        &mut self,
        target: PostTarget,
        keyboard_type: i64,
        compound_quirk: bool,
        nice_space: bool,
        profile: Option<CliTimingProfile>,
    ) {
        self.target = target;
        self.keyboard_type = keyboard_type;
        self.compound_quirk = compound_quirk;
        self.nice_space = nice_space;
        if self.pacing.is_cli() && profile.is_none() {
            self.pacing.reset_speed_state();
        }
        self.pacing.apply_profile(profile);
    }

    pub fn set_code_table(&mut self, table: CodeTable) {
        self.code_table = table;
    }

    pub fn code_table(&self) -> CodeTable {
        self.code_table
    }

    pub fn target(&self) -> PostTarget {
        self.target
    }

    pub fn sync(&self) -> &SyncKeyStack {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut SyncKeyStack {
        &mut self.sync
    }

    pub fn pacing(&self) -> &PacingController {
        &self.pacing
    }

    pub fn pacing_mut(&mut self) -> &mut PacingController {
        &mut self.pacing
    }

    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    pub fn now_us(&self) -> u64 {
        self.clock.now_us()
    }

    pub fn sleep_us(&self, us: u64) {
        if us > 0 {
            self.sleeper.sleep_us(us);
        }
    }

    // ========== Raw posting ==========

    fn post_key(&self, key_code: u16, flags: EventFlags, units: &[u16]) {
        let flags = synthetic_flags(flags);
        trace!(key_code, flags = flags.bits(), units = units.len(), "post");
        for key_down in [true, false] {
            self.poster.post(SyntheticEvent {
                target: self.target,
                key_down,
                key_code,
                flags,
                units: units.to_vec(),
                user_data: INJECTION_MARKER,
                keyboard_type: self.keyboard_type,
            });
        }
    }

    fn post_units(&self, units: &[u16]) {
        self.post_key(0, EventFlags::NONE, units);
    }

    fn push_one_if_double(&mut self) {
        if self.code_table.is_double_code() {
            self.sync.push(1);
        }
    }

    /// A second backspace is owed when the top character took two units,
    /// except for compound text in apps that merge the mark themselves.
    fn owes_second_unit(&self, back: usize) -> bool {
        back > 1 && !(self.code_table == CodeTable::UnicodeCompound && self.compound_quirk)
    }

    // ========== Deletion ==========

    /// One Delete key press, no bookkeeping.
    pub fn send_physical_backspace(&self) {
        self.post_key(keys::DELETE, EventFlags::NONE, &[]);
    }

    /// Delete one visual character.
    pub fn send_backspace(&mut self) {
        self.send_physical_backspace();
        if !self.code_table.is_double_code() {
            return;
        }
        if let Some(back) = self.sync.back() {
            if self.owes_second_unit(back) {
                self.send_physical_backspace();
            }
            self.sync.pop();
        }
    }

    /// Extend the selection one visual character to the left.
    pub fn send_shift_left(&mut self) {
        self.post_key(keys::LEFT, EventFlags::SHIFT, &[]);
        if !self.code_table.is_double_code() {
            return;
        }
        if let Some(back) = self.sync.back() {
            if self.owes_second_unit(back) {
                self.post_key(keys::LEFT, EventFlags::SHIFT, &[]);
            }
            self.sync.pop();
        }
    }

    /// Delete `count` characters, paced for CLI targets.
    pub fn send_backspace_sequence(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        if !self.pacing.is_cli() {
            for _ in 0..count {
                self.send_backspace();
            }
            return;
        }

        let backspace_delay = self.pacing.scaled(self.pacing.backspace_delay_us());
        let wait_after = self.pacing.scaled(self.pacing.wait_after_backspace_us());
        let mut total = self.pacing.scaled(self.pacing.post_send_block_us());
        if backspace_delay > 0 {
            total += backspace_delay * count as u64;
        }
        total += wait_after;
        let now = self.clock.now_us();
        self.pacing.schedule_block(total, now);

        if self.pacing.speed_factor() > 1.05 {
            self.sleep_us(self.pacing.scaled(FAST_TYPING_PRE_BURST_US));
        }
        for _ in 0..count {
            self.send_physical_backspace();
            self.sync.consume_one();
            self.sleep_us(backspace_delay);
        }
        self.sleep_us(wait_after);

        let now = self.clock.now_us();
        self.pacing.schedule_block(total, now);
    }

    // ========== Typing ==========

    /// Type a raw key, optionally shifted.
    pub fn send_key_code_cell(&mut self, key: u16, caps: bool) {
        self.push_one_if_double();
        let flags = if caps { EventFlags::SHIFT } else { EventFlags::NONE };
        self.post_key(key, flags, &[]);
    }

    /// Type `key` with the given modifier flags as is.
    pub fn send_key_with_flags(&self, key: u16, flags: EventFlags) {
        self.post_key(key, flags, &[]);
    }

    /// Type one table code in the active table.
    pub fn send_table_code(&mut self, code: u16) {
        let encoded = self.code_table.encode(code);
        match self.code_table {
            CodeTable::Unicode => self.post_units(&[code]),
            CodeTable::UnicodeCompound => {
                self.sync.push(encoded.len());
                self.post_units(encoded.as_slice());
            }
            CodeTable::Tcvn3 | CodeTable::VniWindows | CodeTable::Cp1258 => {
                for &unit in encoded.as_slice() {
                    self.post_units(&[unit]);
                }
                if self.code_table.is_double_code() {
                    self.sync.push(encoded.len());
                }
            }
        }
    }

    pub fn send_pure_character(&mut self, unit: u16) {
        self.post_units(&[unit]);
        self.push_one_if_double();
    }

    pub fn send_cell(&mut self, cell: PackedCell) {
        match cell {
            PackedCell::Pure(unit) => self.send_pure_character(unit),
            PackedCell::KeyCode { key, caps } => self.send_key_code_cell(key, caps),
            PackedCell::TableCode(code) => self.send_table_code(code),
        }
    }

    /// Append the units `cell` types to `out`, recording sync lengths as if
    /// it had been sent. Key cells without a character are skipped.
    pub fn stage_cell(&mut self, cell: PackedCell, out: &mut Vec<u16>) {
        match cell {
            PackedCell::Pure(unit) => {
                out.push(unit);
                self.push_one_if_double();
            }
            PackedCell::KeyCode { key, caps } => {
                if let Some(ch) = keys::key_to_char(key, caps) {
                    let mut tmp = [0u16; 2];
                    out.extend_from_slice(ch.encode_utf16(&mut tmp));
                    self.push_one_if_double();
                }
            }
            PackedCell::TableCode(code) => {
                let encoded = self.code_table.encode(code);
                out.extend_from_slice(encoded.as_slice());
                if self.code_table.is_double_code() {
                    self.sync.push(encoded.len());
                }
            }
        }
    }

    /// Type an invisible placeholder.
    pub fn send_empty_character(&mut self) {
        self.push_one_if_double();
        let unit = if self.nice_space {
            NICE_SPACE_CHARACTER
        } else {
            EMPTY_CHARACTER
        };
        self.post_units(&[unit]);
    }

    /// Post `units` in events of at most `chunk_size` units, `delay_us` apart.
    /// CLI targets get the delay scaled and the block window extended over
    /// the whole send.
    pub fn send_unicode_chunked(&mut self, units: &[u16], chunk_size: usize, delay_us: u64) {
        if units.is_empty() {
            return;
        }
        let cli = self.pacing.is_cli();
        let delay = if cli { self.pacing.scaled(delay_us) } else { delay_us };
        let block = if cli {
            let mut block = self.pacing.scaled(self.pacing.post_send_block_us());
            if delay > 0 && units.len() > 1 {
                block += delay * (units.len() as u64 - 1);
            }
            let now = self.clock.now_us();
            self.pacing.schedule_block(block, now);
            block
        } else {
            0
        };

        for (i, chunk) in units.chunks(chunk_size.max(1)).enumerate() {
            if i > 0 {
                self.sleep_us(delay);
            }
            self.post_units(chunk);
        }

        if cli {
            let now = self.clock.now_us();
            self.pacing.schedule_block(block, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, RecordingSleeper};
    use crate::pacing::CliProfileKind;
    use pretty_assertions::assert_eq;

    struct Rig {
        poster: Arc<RecordingPoster>,
        sleeper: Arc<RecordingSleeper>,
        injector: Injector,
    }

    fn rig(table: CodeTable) -> Rig {
        let clock = Arc::new(ManualClock::starting_at_ms(1_000));
        let poster = Arc::new(RecordingPoster::new());
        let sleeper = Arc::new(RecordingSleeper::with_clock(clock.clone()));
        let mut injector = Injector::new(poster.clone(), sleeper.clone(), clock);
        injector.set_code_table(table);
        Rig {
            poster,
            sleeper,
            injector,
        }
    }

    #[test]
    fn test_events_carry_marker_and_flags() {
        let mut r = rig(CodeTable::Unicode);
        r.injector.configure(PostTarget::HidTap, 40, false, false, None);
        r.injector.send_key_code_cell(keys::A, true);
        let events = r.poster.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].key_down && !events[1].key_down);
        for e in &events {
            assert_eq!(e.user_data, INJECTION_MARKER);
            assert_eq!(e.target, PostTarget::HidTap);
            assert_eq!(e.keyboard_type, 40);
            assert!(e.flags.contains(EventFlags::SHIFT | EventFlags::NON_COALESCED));
        }
        assert_eq!(synthetic_flags(EventFlags::SECONDARY_FN), EventFlags::NON_COALESCED);
    }

    #[test]
    fn test_post_target_selection() {
        assert_eq!(PostTarget::for_target(true, true), PostTarget::HidTap);
        assert_eq!(PostTarget::for_target(false, true), PostTarget::SessionTap);
        assert_eq!(PostTarget::for_target(false, false), PostTarget::Proxy);
    }

    #[test]
    fn test_stage_cell_records_sync_lengths() {
        let mut r = rig(CodeTable::VniWindows);
        let mut units = Vec::new();
        r.injector.stage_cell(PackedCell::TableCode(CodeTable::VniWindows.code_for('ố').unwrap()), &mut units);
        r.injector.stage_cell(PackedCell::KeyCode { key: keys::F, caps: false }, &mut units);
        r.injector.stage_cell(PackedCell::KeyCode { key: keys::LEFT, caps: false }, &mut units);
        assert_eq!(units.len(), 3);
        assert_eq!(r.injector.sync().total_units(), 3);
        assert_eq!(r.injector.sync().len(), 2);
        assert!(r.poster.events().is_empty());
    }

    #[test]
    fn test_vni_backspace_deletes_both_units() {
        let mut r = rig(CodeTable::VniWindows);
        let code = CodeTable::VniWindows.code_for('ố').unwrap();
        r.injector.send_table_code(code);
        assert_eq!(r.injector.sync().back(), Some(2));
        assert_eq!(r.poster.key_downs().len(), 2);

        r.poster.take();
        r.injector.send_backspace();
        assert_eq!(r.poster.backspace_count(), 2);
        assert!(r.injector.sync().is_empty());
    }

    #[test]
    fn test_compound_quirk_skips_second_backspace() {
        let mut r = rig(CodeTable::UnicodeCompound);
        r.injector.configure(PostTarget::Proxy, 0, true, false, None);
        let code = CodeTable::UnicodeCompound.code_for('á').unwrap();
        r.injector.send_table_code(code);
        // Base letter and mark travel in one event.
        assert_eq!(r.poster.key_downs().len(), 1);
        assert_eq!(r.injector.sync().back(), Some(2));
        r.poster.take();
        r.injector.send_backspace();
        assert_eq!(r.poster.backspace_count(), 1);
        assert!(r.injector.sync().is_empty());
    }

    #[test]
    fn test_unicode_backspace_has_no_bookkeeping() {
        let mut r = rig(CodeTable::Unicode);
        r.injector.send_table_code(0x1EA1);
        assert!(r.injector.sync().is_empty());
        r.injector.send_backspace();
        assert_eq!(r.poster.backspace_count(), 1);
        assert_eq!(r.poster.rendered_text("x"), "x");
    }

    #[test]
    fn test_empty_character_variants() {
        let mut r = rig(CodeTable::Unicode);
        r.injector.send_empty_character();
        r.injector.configure(PostTarget::Proxy, 0, false, true, None);
        r.injector.send_empty_character();
        let units: Vec<u16> = r.poster.key_downs().iter().flat_map(|e| e.units.clone()).collect();
        assert_eq!(units, vec![EMPTY_CHARACTER, NICE_SPACE_CHARACTER]);
    }

    #[test]
    fn test_chunked_send_non_cli() {
        let mut r = rig(CodeTable::Unicode);
        let units: Vec<u16> = "xin chào các bạn, hôm nay trời đẹp".encode_utf16().collect();
        r.injector.send_unicode_chunked(&units, 20, 0);
        let downs = r.poster.key_downs();
        assert_eq!(downs.len(), 2);
        assert_eq!(downs[0].units.len(), 20);
        assert!(r.sleeper.sleeps().is_empty());
        assert_eq!(r.injector.pacing().remaining_block_us(r.injector.now_us()), 0);
        assert_eq!(r.poster.rendered_text(""), "xin chào các bạn, hôm nay trời đẹp");
    }

    #[test]
    fn test_chunked_send_cli_sleeps_between_chunks() {
        let mut r = rig(CodeTable::Unicode);
        let profile = CliTimingProfile::for_kind(CliProfileKind::FastTerminal);
        r.injector.configure(PostTarget::Proxy, 0, false, false, Some(profile));
        let units: Vec<u16> = "ào".encode_utf16().collect();
        r.injector.send_unicode_chunked(&units, 1, profile.text_delay_us);
        assert_eq!(r.poster.key_downs().len(), 2);
        assert_eq!(r.sleeper.sleeps(), vec![5_000]);
        // Post-send block covers the send and starts again once it is done.
        assert_eq!(
            r.injector.pacing().remaining_block_us(r.injector.now_us()),
            20_000 + 5_000
        );
    }

    #[test]
    fn test_cli_backspace_burst() {
        let mut r = rig(CodeTable::Unicode);
        let profile = CliTimingProfile::for_kind(CliProfileKind::MediumTerminal);
        r.injector.configure(PostTarget::Proxy, 0, false, false, Some(profile));
        r.injector.send_backspace_sequence(3);
        assert_eq!(r.poster.backspace_count(), 3);
        assert_eq!(r.sleeper.sleeps(), vec![9_000, 9_000, 9_000, 27_000]);
        let total = profile.post_send_block_us + 3 * 9_000 + 27_000;
        assert_eq!(r.injector.pacing().remaining_block_us(r.injector.now_us()), total);
    }

    #[test]
    fn test_leaving_cli_resets_speed() {
        let mut r = rig(CodeTable::Unicode);
        let profile = CliTimingProfile::for_kind(CliProfileKind::Ide);
        r.injector.configure(PostTarget::Proxy, 0, false, false, Some(profile));
        r.injector.pacing_mut().update_speed_factor(0);
        r.injector.pacing_mut().update_speed_factor(10_000);
        assert_eq!(r.injector.pacing().speed_factor(), 2.1);
        r.injector.configure(PostTarget::Proxy, 0, false, false, None);
        assert_eq!(r.injector.pacing().speed_factor(), 1.0);
    }

    #[test]
    fn test_rendered_text_handles_selection() {
        let mut r = rig(CodeTable::Unicode);
        r.injector.send_shift_left();
        r.injector.send_physical_backspace();
        r.injector.send_key_code_cell(keys::O, false);
        assert_eq!(r.poster.rendered_text("ab"), "ao");
    }
}
