// core/tests/sync_consistency.rs
//
// The sync key stack must always account for exactly the units still on
// screen, whatever mix of replacements and deletions happened.
//
// Tests cover:
// - Replacements in every double-code table
// - User deletes that remove half of a two-unit character
// - Word breaks reset the stack
// - Single-unit tables keep no bookkeeping

use libviet_core::clock::{ManualClock, RecordingSleeper};
use libviet_core::engine::ext;
use libviet_core::platform::{AlwaysPermitted, NoAccessibility, NoOverlay};
use libviet_core::{
    CodeTable, Config, Disposition, EngineSignal, EventFlags, EventPipeline, KeyEvent, PackedCell,
    Platform, ProcessTable, RecordingPoster, ScriptedEngine, SettingsHandle,
};
use libviet_core::keys;
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct Editor;

impl ProcessTable for Editor {
    fn bundle_id(&self, _pid: i32) -> Option<String> {
        Some("com.apple.TextEdit".to_string())
    }

    fn executable_path(&self, _pid: i32) -> Option<String> {
        None
    }

    fn frontmost_bundle_id(&self) -> Option<String> {
        Some("com.apple.TextEdit".to_string())
    }
}

struct Session {
    table: CodeTable,
    poster: Arc<RecordingPoster>,
    pipeline: EventPipeline<ScriptedEngine>,
    /// Deletes the user typed themselves; they never reach the poster.
    user_deletes: usize,
}

impl Session {
    fn new(table: CodeTable) -> Self {
        let clock = Arc::new(ManualClock::starting_at_ms(5_000));
        let poster = Arc::new(RecordingPoster::new());
        let platform = Platform {
            processes: Arc::new(Editor),
            overlay: Arc::new(NoOverlay),
            accessibility: Arc::new(NoAccessibility),
            layout: None,
            tap: Arc::new(AlwaysPermitted),
            poster: poster.clone(),
            clock: clock.clone(),
            sleeper: Arc::new(RecordingSleeper::with_clock(clock)),
        };
        let config = Config {
            code_table: table,
            fix_browser_autocomplete: false,
            ..Config::default()
        };
        Self {
            table,
            poster,
            pipeline: EventPipeline::new(ScriptedEngine::new(), SettingsHandle::new(config), platform),
            user_deletes: 0,
        }
    }

    fn code(&self, ch: char) -> PackedCell {
        PackedCell::TableCode(self.table.code_for(ch).unwrap())
    }

    fn press(&mut self, key: u16, signal: EngineSignal) -> Disposition {
        self.pipeline.engine_mut().push(signal);
        let disposition = self
            .pipeline
            .handle_event(&KeyEvent::key_down(key, EventFlags::NONE).with_pid(3));
        if key == keys::DELETE && disposition == Disposition::PassThrough {
            self.user_deletes += 1;
        }
        disposition
    }

    /// Units a plain editor would hold now.
    fn screen_units(&self) -> Vec<u16> {
        let mut units: Vec<u16> = self.poster.rendered_text("").encode_utf16().collect();
        // The user's deletes hit the tail before our synthetic ones did.
        units.truncate(units.len().saturating_sub(self.user_deletes));
        units
    }

    fn assert_in_sync(&self) {
        assert_eq!(
            self.pipeline.injector().sync().total_units(),
            self.screen_units().len(),
            "{}",
            self.table
        );
    }
}

#[test]
fn test_replacements_keep_stack_in_sync() {
    for table in [CodeTable::VniWindows, CodeTable::UnicodeCompound, CodeTable::Cp1258] {
        let mut s = Session::new(table);

        // "tố"
        let cells = vec![PackedCell::KeyCode { key: keys::T, caps: false }, s.code('ố')];
        assert_eq!(s.press(keys::S, EngineSignal::will_process(0, cells)), Disposition::Swallow);
        s.assert_in_sync();
        assert_eq!(s.pipeline.injector().sync().len(), 2);

        // "tố" -> "tồ"
        let cells = vec![s.code('ồ')];
        assert_eq!(s.press(keys::F, EngineSignal::will_process(1, cells)), Disposition::Swallow);
        s.assert_in_sync();
        assert_eq!(table.decode_str(&s.screen_units()), "tồ");

        // The user deletes "ồ"; its second unit goes with an extra backspace.
        let delete = EngineSignal::do_nothing().with_ext_code(ext::DELETE);
        assert_eq!(s.press(keys::DELETE, delete), Disposition::PassThrough);
        s.assert_in_sync();
        assert_eq!(table.decode_str(&s.screen_units()), "t");
    }
}

#[test]
fn test_word_break_clears_stack() {
    let mut s = Session::new(CodeTable::VniWindows);
    let cells = vec![s.code('ế')];
    assert_eq!(s.press(keys::S, EngineSignal::will_process(0, cells)), Disposition::Swallow);
    assert!(!s.pipeline.injector().sync().is_empty());

    let space = EngineSignal::do_nothing().with_ext_code(ext::WORD_BREAK);
    assert_eq!(s.press(keys::SPACE, space), Disposition::PassThrough);
    assert!(s.pipeline.injector().sync().is_empty());
}

#[test]
fn test_single_unit_tables_keep_no_stack() {
    for table in [CodeTable::Unicode, CodeTable::Tcvn3] {
        let mut s = Session::new(table);
        let cells = vec![s.code('ố'), s.code('ồ')];
        assert_eq!(s.press(keys::S, EngineSignal::will_process(0, cells)), Disposition::Swallow);
        assert!(s.pipeline.injector().sync().is_empty());
        assert_eq!(s.screen_units().len(), 2);
    }
}
