//! Platform virtual key codes and modifier flags.
//!
//! Key codes follow the macOS ANSI layout (`kVK_*`) and the flag bits mirror
//! the CoreGraphics `CGEventFlags` values, so events captured from a real tap
//! can be fed into the pipeline without translation.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

// ========== Control keys ==========

pub const ESC: u16 = 53;
pub const DELETE: u16 = 51;
pub const TAB: u16 = 48;
pub const ENTER: u16 = 76;
pub const RETURN: u16 = 36;
pub const SPACE: u16 = 49;
pub const LEFT: u16 = 123;
pub const RIGHT: u16 = 124;
pub const DOWN: u16 = 125;
pub const UP: u16 = 126;
pub const HOME: u16 = 115;
pub const PAGE_UP: u16 = 116;
pub const FORWARD_DELETE: u16 = 117;
pub const END: u16 = 119;
pub const PAGE_DOWN: u16 = 121;

// ========== Letters ==========

pub const A: u16 = 0;
pub const B: u16 = 11;
pub const C: u16 = 8;
pub const D: u16 = 2;
pub const E: u16 = 14;
pub const F: u16 = 3;
pub const G: u16 = 5;
pub const H: u16 = 4;
pub const I: u16 = 34;
pub const J: u16 = 38;
pub const K: u16 = 40;
pub const L: u16 = 37;
pub const M: u16 = 46;
pub const N: u16 = 45;
pub const O: u16 = 31;
pub const P: u16 = 35;
pub const Q: u16 = 12;
pub const R: u16 = 15;
pub const S: u16 = 1;
pub const T: u16 = 17;
pub const U: u16 = 32;
pub const V: u16 = 9;
pub const W: u16 = 13;
pub const X: u16 = 7;
pub const Y: u16 = 16;
pub const Z: u16 = 6;

// ========== Digits and symbols ==========

pub const DIGIT_1: u16 = 18;
pub const DIGIT_2: u16 = 19;
pub const DIGIT_3: u16 = 20;
pub const DIGIT_4: u16 = 21;
pub const DIGIT_5: u16 = 23;
pub const DIGIT_6: u16 = 22;
pub const DIGIT_7: u16 = 26;
pub const DIGIT_8: u16 = 28;
pub const DIGIT_9: u16 = 25;
pub const DIGIT_0: u16 = 29;

pub const LEFT_BRACKET: u16 = 33;
pub const RIGHT_BRACKET: u16 = 30;
pub const DOT: u16 = 47;
pub const BACKQUOTE: u16 = 50;
pub const MINUS: u16 = 27;
pub const EQUALS: u16 = 24;
pub const BACKSLASH: u16 = 42;
pub const SEMICOLON: u16 = 41;
pub const QUOTE: u16 = 39;
pub const COMMA: u16 = 43;
pub const SLASH: u16 = 44;

// ========== Modifiers ==========

pub const LEFT_SHIFT: u16 = 57;
pub const RIGHT_SHIFT: u16 = 60;
pub const LEFT_COMMAND: u16 = 55;
pub const RIGHT_COMMAND: u16 = 54;
pub const LEFT_CONTROL: u16 = 59;
pub const RIGHT_CONTROL: u16 = 62;
pub const LEFT_OPTION: u16 = 58;
pub const RIGHT_OPTION: u16 = 61;
pub const FUNCTION: u16 = 63;

/// `(key, unshifted, shifted)` for every key that types a printable ASCII
/// character on the US layout.
const PRINTABLE_KEYS: &[(u16, char, char)] = &[
    (A, 'a', 'A'),
    (B, 'b', 'B'),
    (C, 'c', 'C'),
    (D, 'd', 'D'),
    (E, 'e', 'E'),
    (F, 'f', 'F'),
    (G, 'g', 'G'),
    (H, 'h', 'H'),
    (I, 'i', 'I'),
    (J, 'j', 'J'),
    (K, 'k', 'K'),
    (L, 'l', 'L'),
    (M, 'm', 'M'),
    (N, 'n', 'N'),
    (O, 'o', 'O'),
    (P, 'p', 'P'),
    (Q, 'q', 'Q'),
    (R, 'r', 'R'),
    (S, 's', 'S'),
    (T, 't', 'T'),
    (U, 'u', 'U'),
    (V, 'v', 'V'),
    (W, 'w', 'W'),
    (X, 'x', 'X'),
    (Y, 'y', 'Y'),
    (Z, 'z', 'Z'),
    (DIGIT_1, '1', '!'),
    (DIGIT_2, '2', '@'),
    (DIGIT_3, '3', '#'),
    (DIGIT_4, '4', '$'),
    (DIGIT_5, '5', '%'),
    (DIGIT_6, '6', '^'),
    (DIGIT_7, '7', '&'),
    (DIGIT_8, '8', '*'),
    (DIGIT_9, '9', '('),
    (DIGIT_0, '0', ')'),
    (BACKQUOTE, '`', '~'),
    (MINUS, '-', '_'),
    (EQUALS, '=', '+'),
    (LEFT_BRACKET, '[', '{'),
    (RIGHT_BRACKET, ']', '}'),
    (BACKSLASH, '\\', '|'),
    (SEMICOLON, ';', ':'),
    (QUOTE, '\'', '"'),
    (COMMA, ',', '<'),
    (DOT, '.', '>'),
    (SLASH, '/', '?'),
    (SPACE, ' ', ' '),
];

/// Character typed by `key` on the US layout, or `None` for control keys.
pub fn key_to_char(key: u16, caps: bool) -> Option<char> {
    PRINTABLE_KEYS
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|&(_, lower, upper)| if caps { upper } else { lower })
}

/// Inverse of [`key_to_char`]: the key and whether shift is required.
pub fn char_to_key(ch: char) -> Option<(u16, bool)> {
    PRINTABLE_KEYS.iter().find_map(|&(k, lower, upper)| {
        if ch == lower {
            Some((k, false))
        } else if ch == upper {
            Some((k, true))
        } else {
            None
        }
    })
}

/// Key for a name as written in traces and on the command line: a single
/// printable character (`"a"`, `"/"`) or a control key name (`"space"`,
/// `"delete"`, `"return"`, ...). Numbers are taken as raw key codes.
pub fn key_from_name(name: &str) -> Result<u16, PipelineError> {
    let lower = name.to_ascii_lowercase();
    let named = match lower.as_str() {
        "esc" | "escape" => Some(ESC),
        "delete" | "backspace" => Some(DELETE),
        "tab" => Some(TAB),
        "enter" => Some(ENTER),
        "return" => Some(RETURN),
        "space" => Some(SPACE),
        "left" => Some(LEFT),
        "right" => Some(RIGHT),
        "up" => Some(UP),
        "down" => Some(DOWN),
        "home" => Some(HOME),
        "end" => Some(END),
        _ => None,
    };
    if let Some(key) = named {
        return Ok(key);
    }
    let mut chars = name.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        if let Some((key, _)) = char_to_key(ch) {
            return Ok(key);
        }
    }
    name.parse::<u16>()
        .map_err(|_| PipelineError::UnknownKey(name.to_string()))
}

/// Modifier flag bitset with CoreGraphics-compatible bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventFlags(pub u64);

impl EventFlags {
    pub const NONE: Self = Self(0);
    pub const NON_COALESCED: Self = Self(0x0000_0100);
    pub const CAPS_LOCK: Self = Self(0x0001_0000);
    pub const SHIFT: Self = Self(0x0002_0000);
    pub const CONTROL: Self = Self(0x0004_0000);
    pub const ALTERNATE: Self = Self(0x0008_0000);
    pub const COMMAND: Self = Self(0x0010_0000);
    pub const NUMERIC_PAD: Self = Self(0x0020_0000);
    pub const HELP: Self = Self(0x0040_0000);
    pub const SECONDARY_FN: Self = Self(0x0080_0000);

    const OTHER_CONTROL: u64 = Self::COMMAND.0
        | Self::CONTROL.0
        | Self::ALTERNATE.0
        | Self::SECONDARY_FN.0
        | Self::NUMERIC_PAD.0
        | Self::HELP.0;

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Shift or caps lock is engaged.
    pub fn has_caps(self) -> bool {
        self.contains(Self::SHIFT) || self.contains(Self::CAPS_LOCK)
    }

    /// Any modifier that turns a keystroke into a shortcut.
    pub fn has_other_control(self) -> bool {
        self.0 & Self::OTHER_CONTROL != 0
    }
}

impl BitOr for EventFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
