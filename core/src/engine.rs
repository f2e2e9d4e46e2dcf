// core/src/engine.rs
//
// Boundary with the linguistic engine (Telex/VNI state machine).
//
// The engine itself lives outside this crate. It is consulted once per key
// and answers with an `EngineSignal`: what to do, how many characters to
// delete and what to type instead. Raw 32-bit cells are decoded into
// `PackedCell` here and nowhere else.

use crate::code_table::CodeTable;
use crate::keys::EventFlags;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Upper bound on backspaces and cells the engine reports for one key.
pub const MAX_BUFFER: usize = 32;

pub const PURE_CHARACTER_MASK: u32 = 0x8000_0000;
pub const CHAR_CODE_MASK: u32 = 0x0200_0000;
pub const CAPS_MASK: u32 = 0x0001_0000;
pub const CHAR_MASK: u32 = 0xFFFF;

/// What the engine wants done with the key it was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCode {
    #[default]
    DoNothing,
    WillProcess,
    Restore,
    RestoreAndNewSession,
    ReplaceMacro,
}

impl SignalCode {
    pub fn is_restore(self) -> bool {
        matches!(self, SignalCode::Restore | SignalCode::RestoreAndNewSession)
    }
}

/// `ext_code` values with a fixed meaning.
pub mod ext {
    pub const WORD_BREAK: u8 = 1;
    pub const DELETE: u8 = 2;
    pub const INSERT_ONE: u8 = 3;
    pub const SHORTCUT_LIKE: u8 = 4;
    pub const AUTO_ENGLISH_RESTORE: u8 = 5;
}

/// One output cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum PackedCell {
    /// A UTF-16 unit emitted as is.
    Pure(u16),
    /// A raw key to be typed back, e.g. when restoring English.
    KeyCode { key: u16, caps: bool },
    /// A character code of the active code table.
    TableCode(u16),
}

impl PackedCell {
    pub fn from_raw(raw: u32) -> Self {
        if raw & PURE_CHARACTER_MASK != 0 {
            PackedCell::Pure((raw & CHAR_MASK) as u16)
        } else if raw & CHAR_CODE_MASK == 0 {
            PackedCell::KeyCode {
                key: (raw & CHAR_MASK) as u16,
                caps: raw & CAPS_MASK != 0,
            }
        } else {
            PackedCell::TableCode((raw & CHAR_MASK) as u16)
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            PackedCell::Pure(unit) => PURE_CHARACTER_MASK | unit as u32,
            PackedCell::KeyCode { key, caps: true } => key as u32 | CAPS_MASK,
            PackedCell::KeyCode { key, caps: false } => key as u32,
            PackedCell::TableCode(code) => CHAR_CODE_MASK | code as u32,
        }
    }
}

impl From<u32> for PackedCell {
    fn from(raw: u32) -> Self {
        PackedCell::from_raw(raw)
    }
}

impl From<PackedCell> for u32 {
    fn from(cell: PackedCell) -> Self {
        cell.to_raw()
    }
}

/// The engine's answer for one key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSignal {
    pub code: SignalCode,
    pub ext_code: u8,
    pub backspace_count: usize,
    /// In output order.
    pub new_chars: Vec<PackedCell>,
    pub macro_data: Vec<PackedCell>,
}

impl EngineSignal {
    pub fn do_nothing() -> Self {
        Self::default()
    }

    pub fn will_process(backspace_count: usize, new_chars: Vec<PackedCell>) -> Self {
        Self {
            code: SignalCode::WillProcess,
            backspace_count,
            new_chars,
            ..Self::default()
        }
    }

    /// Cells for `text` in a Unicode-table session.
    pub fn unicode_cells(text: &str) -> Vec<PackedCell> {
        text.encode_utf16().map(PackedCell::TableCode).collect()
    }

    pub fn with_ext_code(mut self, ext_code: u8) -> Self {
        self.ext_code = ext_code;
        self
    }

    pub fn with_code(mut self, code: SignalCode) -> Self {
        self.code = code;
        self
    }

    pub fn new_char_count(&self) -> usize {
        self.new_chars.len()
    }

    /// Decode raw engine buffers, truncated to [`MAX_BUFFER`].
    pub fn from_raw(
        code: SignalCode,
        ext_code: u8,
        backspace_count: usize,
        new_chars: &[u32],
        macro_data: &[u32],
    ) -> Self {
        Self {
            code,
            ext_code,
            backspace_count: backspace_count.min(MAX_BUFFER),
            new_chars: new_chars
                .iter()
                .take(MAX_BUFFER)
                .copied()
                .map(PackedCell::from_raw)
                .collect(),
            macro_data: macro_data.iter().copied().map(PackedCell::from_raw).collect(),
        }
    }
}

/// Shift or caps-lock state passed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapsStatus {
    #[default]
    None,
    Shift,
    CapsLock,
}

impl CapsStatus {
    /// Shift takes precedence over caps lock.
    pub fn from_flags(flags: EventFlags) -> Self {
        if flags.contains(EventFlags::SHIFT) {
            CapsStatus::Shift
        } else if flags.contains(EventFlags::CAPS_LOCK) {
            CapsStatus::CapsLock
        } else {
            CapsStatus::None
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            CapsStatus::None => 0,
            CapsStatus::Shift => 1,
            CapsStatus::CapsLock => 2,
        }
    }

    pub fn is_caps(self) -> bool {
        self != CapsStatus::None
    }
}

/// The linguistic engine as seen by the pipeline.
pub trait LinguisticEngine {
    /// Vietnamese-mode key press.
    fn handle_key(&mut self, key: u16, caps: CapsStatus, other_control: bool) -> EngineSignal;

    /// English-mode key press; only macro expansion produces output here.
    fn handle_english_mode(
        &mut self,
        key: u16,
        caps: CapsStatus,
        other_control: bool,
    ) -> EngineSignal;

    /// A click or focus change invalidated the word being typed.
    fn request_new_session(&mut self);

    /// Start a fresh word right now.
    fn start_new_session(&mut self);

    /// Table the engine encodes `TableCode` cells in for the next key.
    fn set_code_table(&mut self, _table: CodeTable) {}

    /// Undo the marks and tones of the current word, returning the raw keys
    /// as a restore signal. `None` when the word has nothing to undo.
    fn restore_to_raw_keys(&mut self) -> Option<EngineSignal> {
        None
    }
}

/// Calls recorded by [`ScriptedEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "call")]
pub enum EngineCall {
    Key { key: u16, caps: CapsStatus, other_control: bool },
    EnglishKey { key: u16, caps: CapsStatus, other_control: bool },
    RequestNewSession,
    StartNewSession,
    RestoreToRawKeys,
}

/// Engine that answers from a queue of prepared signals. Used by the trace
/// replayer and by tests.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    queue: VecDeque<EngineSignal>,
    restores: VecDeque<EngineSignal>,
    calls: Vec<EngineCall>,
    code_table: CodeTable,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signals(signals: impl IntoIterator<Item = EngineSignal>) -> Self {
        Self {
            queue: signals.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, signal: EngineSignal) {
        self.queue.push_back(signal);
    }

    /// Queue the answer to the next [`LinguisticEngine::restore_to_raw_keys`].
    /// With nothing queued the word has nothing to undo.
    pub fn push_restore(&mut self, signal: EngineSignal) {
        self.restores.push_back(signal);
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    pub fn code_table(&self) -> CodeTable {
        self.code_table
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn next(&mut self) -> EngineSignal {
        self.queue.pop_front().unwrap_or_default()
    }
}

impl LinguisticEngine for ScriptedEngine {
    fn handle_key(&mut self, key: u16, caps: CapsStatus, other_control: bool) -> EngineSignal {
        self.calls.push(EngineCall::Key { key, caps, other_control });
        self.next()
    }

    fn handle_english_mode(
        &mut self,
        key: u16,
        caps: CapsStatus,
        other_control: bool,
    ) -> EngineSignal {
        self.calls.push(EngineCall::EnglishKey { key, caps, other_control });
        self.next()
    }

    fn request_new_session(&mut self) {
        self.calls.push(EngineCall::RequestNewSession);
    }

    fn start_new_session(&mut self) {
        self.calls.push(EngineCall::StartNewSession);
    }

    fn set_code_table(&mut self, table: CodeTable) {
        self.code_table = table;
    }

    fn restore_to_raw_keys(&mut self) -> Option<EngineSignal> {
        self.calls.push(EngineCall::RestoreToRawKeys);
        self.restores.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_cell_decoding() {
        assert_eq!(PackedCell::from_raw(0x8000_00E0), PackedCell::Pure(0xE0));
        assert_eq!(
            PackedCell::from_raw(0x0001_0000 | 8),
            PackedCell::KeyCode { key: 8, caps: true }
        );
        assert_eq!(PackedCell::from_raw(0x0200_1EA1), PackedCell::TableCode(0x1EA1));
        // Pure wins over the table flag.
        assert_eq!(PackedCell::from_raw(0x8200_0041), PackedCell::Pure(0x41));
    }

    #[test]
    fn test_packed_cell_to_raw() {
        for raw in [0x8000_00E0u32, 0x0001_0008, 0x0000_0022, 0x0200_1EA1] {
            assert_eq!(PackedCell::from_raw(raw).to_raw(), raw);
        }
    }

    #[test]
    fn test_signal_serde_uses_raw_cells() {
        let signal = EngineSignal::will_process(3, vec![PackedCell::TableCode(0xE0)]);
        let json = serde_json::to_string(&signal).unwrap();
        assert!(json.contains("33554656"));
        let back: EngineSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, signal);

        let sparse: EngineSignal = serde_json::from_str(r#"{"code":"restore"}"#).unwrap();
        assert_eq!(sparse.code, SignalCode::Restore);
        assert!(sparse.new_chars.is_empty());
    }

    #[test]
    fn test_from_raw_truncates() {
        let raw: Vec<u32> = (0..40).map(|i| CHAR_CODE_MASK | (0x61 + i)).collect();
        let signal = EngineSignal::from_raw(SignalCode::WillProcess, 0, 99, &raw, &[]);
        assert_eq!(signal.backspace_count, MAX_BUFFER);
        assert_eq!(signal.new_char_count(), MAX_BUFFER);
    }

    #[test]
    fn test_caps_status_from_flags() {
        assert_eq!(CapsStatus::from_flags(EventFlags::SHIFT | EventFlags::CAPS_LOCK), CapsStatus::Shift);
        assert_eq!(CapsStatus::from_flags(EventFlags::CAPS_LOCK).as_u8(), 2);
        assert!(!CapsStatus::from_flags(EventFlags::COMMAND).is_caps());
    }

    #[test]
    fn test_scripted_engine() {
        let mut engine = ScriptedEngine::with_signals([EngineSignal::will_process(1, vec![])]);
        assert_eq!(engine.handle_key(0, CapsStatus::None, false).code, SignalCode::WillProcess);
        assert_eq!(engine.handle_key(0, CapsStatus::Shift, false).code, SignalCode::DoNothing);
        engine.start_new_session();
        assert_eq!(engine.calls().len(), 3);
        assert_eq!(engine.calls()[2], EngineCall::StartNewSession);
    }

    #[test]
    fn test_scripted_restore_queue() {
        let mut engine = ScriptedEngine::new();
        assert_eq!(engine.restore_to_raw_keys(), None);
        engine.push_restore(EngineSignal::will_process(2, vec![]).with_code(SignalCode::Restore));
        assert_eq!(engine.pending(), 0);
        let signal = engine.restore_to_raw_keys().unwrap();
        assert_eq!(signal.backspace_count, 2);
        assert_eq!(engine.calls(), &[EngineCall::RestoreToRawKeys, EngineCall::RestoreToRawKeys]);
    }
}
