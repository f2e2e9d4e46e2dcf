//! Intercepted input events and the verdict returned to the event tap.

use crate::keys::EventFlags;
use serde::{Deserialize, Serialize};

/// Value written into the source user-data field of every synthetic event.
///
/// Events carrying it were produced by this pipeline and are passed through
/// untouched, which keeps injected characters from being fed back into the
/// engine.
pub const INJECTION_MARKER: i64 = 0x564E_4B59;

/// Kind of an intercepted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    KeyDown,
    KeyUp,
    FlagsChanged,
    /// Any mouse button press.
    PointerDown,
    TapDisabledByTimeout,
    TapDisabledByUserInput,
}

impl EventKind {
    pub fn is_tap_disabled(self) -> bool {
        matches!(
            self,
            EventKind::TapDisabledByTimeout | EventKind::TapDisabledByUserInput
        )
    }
}

/// A single intercepted event. Consumed synchronously, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub kind: EventKind,
    #[serde(default)]
    pub key_code: u16,
    #[serde(default)]
    pub flags: EventFlags,
    /// Process the event is addressed to, `0` when unknown.
    #[serde(default)]
    pub target_pid: i32,
    /// Source user-data field.
    #[serde(default)]
    pub user_data: i64,
    #[serde(default)]
    pub keyboard_type: i64,
}

impl KeyEvent {
    pub fn new(kind: EventKind, key_code: u16, flags: EventFlags) -> Self {
        Self {
            kind,
            key_code,
            flags,
            target_pid: 0,
            user_data: 0,
            keyboard_type: 0,
        }
    }

    pub fn key_down(key_code: u16, flags: EventFlags) -> Self {
        Self::new(EventKind::KeyDown, key_code, flags)
    }

    pub fn key_up(key_code: u16, flags: EventFlags) -> Self {
        Self::new(EventKind::KeyUp, key_code, flags)
    }

    /// A modifier key went down or up; `flags` is the state after the change.
    pub fn flags_changed(key_code: u16, flags: EventFlags) -> Self {
        Self::new(EventKind::FlagsChanged, key_code, flags)
    }

    pub fn pointer_down() -> Self {
        Self::new(EventKind::PointerDown, 0, EventFlags::NONE)
    }

    pub fn with_pid(mut self, pid: i32) -> Self {
        self.target_pid = pid;
        self
    }

    pub fn with_user_data(mut self, user_data: i64) -> Self {
        self.user_data = user_data;
        self
    }

    /// Whether this event was produced by the injector.
    pub fn is_self_injected(&self) -> bool {
        self.user_data == INJECTION_MARKER
    }
}

/// What the event tap should do with the original event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Deliver the original event unchanged.
    PassThrough,
    /// Drop the original event; synthetic events replace it.
    Swallow,
}
