//! Vietnamese character encodings ("code tables").
//!
//! The engine emits one table code per visual character. Depending on the
//! active table a character occupies one or two emitted UTF-16 units:
//!
//! - **Unicode**: precomposed code point, always one unit.
//! - **TCVN3**: one byte-valued unit.
//! - **VNI Windows** / **CP1258**: low byte first, then the high byte when it
//!   is above 32 (base letter followed by a tone byte).
//! - **Unicode Compound**: base letter in the low 13 bits, the combining mark
//!   index in the top 3 bits.
//!
//! Tables whose characters can span two units are "double-code" tables and
//! need the sync key stack so that later deletions erase the right number of
//! units.

use crate::error::PipelineError;
use ahash::AHashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;

/// Combining marks for sắc, huyền, hỏi, ngã, nặng.
pub const COMPOUND_MARKS: [u16; 5] = [0x0301, 0x0300, 0x0309, 0x0303, 0x0323];

/// Character encoding used for emitted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeTable {
    #[default]
    Unicode,
    Tcvn3,
    VniWindows,
    UnicodeCompound,
    Cp1258,
}

impl CodeTable {
    pub const ALL: [CodeTable; 5] = [
        CodeTable::Unicode,
        CodeTable::Tcvn3,
        CodeTable::VniWindows,
        CodeTable::UnicodeCompound,
        CodeTable::Cp1258,
    ];

    pub fn index(self) -> u8 {
        match self {
            CodeTable::Unicode => 0,
            CodeTable::Tcvn3 => 1,
            CodeTable::VniWindows => 2,
            CodeTable::UnicodeCompound => 3,
            CodeTable::Cp1258 => 4,
        }
    }

    /// Whether one visual character may occupy two emitted units.
    pub fn is_double_code(self) -> bool {
        matches!(
            self,
            CodeTable::VniWindows | CodeTable::UnicodeCompound | CodeTable::Cp1258
        )
    }

    /// Emitted units for a table code.
    pub fn encode(self, code: u16) -> EncodedChar {
        match self {
            CodeTable::Unicode => EncodedChar::one(code),
            CodeTable::Tcvn3 | CodeTable::VniWindows | CodeTable::Cp1258 => {
                let lo = code & 0xFF;
                let hi = code >> 8;
                if hi > 32 {
                    EncodedChar::two(lo, hi)
                } else {
                    EncodedChar::one(lo)
                }
            }
            CodeTable::UnicodeCompound => {
                let marker = (code >> 13) as usize;
                let base = code & 0x1FFF;
                match marker.checked_sub(1).and_then(|i| COMPOUND_MARKS.get(i)) {
                    Some(&mark) => EncodedChar::two(base, mark),
                    None => EncodedChar::one(base),
                }
            }
        }
    }

    /// Table code of a Vietnamese letter, `None` for anything else.
    pub fn code_for(self, ch: char) -> Option<u16> {
        let &(row, col) = LETTER_POSITIONS.get(&ch)?;
        match TABLES[self.index() as usize][row][col] {
            0 => None,
            code => Some(code),
        }
    }

    /// Decode the character starting at `units[0]`.
    ///
    /// Returns the character and how many units it consumed. Units that are
    /// not part of a Vietnamese letter decode to themselves.
    pub fn decode(self, units: &[u16]) -> Option<(char, usize)> {
        let first = *units.first()?;
        match self {
            CodeTable::Unicode => char::from_u32(first as u32).map(|c| (c, 1)),
            CodeTable::UnicodeCompound => {
                if let Some(&mark) = units.get(1) {
                    if COMPOUND_MARKS.contains(&mark) {
                        if let Some(c) = compose(first, mark) {
                            return Some((c, 2));
                        }
                    }
                }
                char::from_u32(first as u32).map(|c| (c, 1))
            }
            CodeTable::Tcvn3 | CodeTable::VniWindows | CodeTable::Cp1258 => {
                let reverse = &REVERSE[self.index() as usize];
                if let Some(&hi) = units.get(1) {
                    if hi > 32 && hi <= 0xFF && first <= 0xFF {
                        if let Some(&c) = reverse.get(&((hi << 8) | first)) {
                            return Some((c, 2));
                        }
                    }
                }
                if let Some(&c) = reverse.get(&first) {
                    return Some((c, 1));
                }
                char::from_u32(first as u32).map(|c| (c, 1))
            }
        }
    }

    /// Decode a whole unit sequence into a Unicode string.
    pub fn decode_str(self, units: &[u16]) -> String {
        let mut out: Vec<u16> = Vec::with_capacity(units.len());
        let mut i = 0;
        while i < units.len() {
            match self.decode(&units[i..]) {
                Some((c, used)) => {
                    let mut buf = [0u16; 2];
                    out.extend_from_slice(c.encode_utf16(&mut buf));
                    i += used;
                }
                None => {
                    // Lone surrogate, kept for the lossy join below.
                    out.push(units[i]);
                    i += 1;
                }
            }
        }
        String::from_utf16_lossy(&out)
    }

    /// Encode Unicode text into this table's units. Characters that are not
    /// Vietnamese letters are emitted unchanged.
    pub fn encode_str(self, text: &str) -> Vec<u16> {
        let mut out = Vec::with_capacity(text.len());
        for ch in text.nfc() {
            match self.code_for(ch) {
                Some(code) => out.extend_from_slice(self.encode(code).as_slice()),
                None => {
                    let mut buf = [0u16; 2];
                    out.extend_from_slice(ch.encode_utf16(&mut buf));
                }
            }
        }
        out
    }
}

impl TryFrom<u8> for CodeTable {
    type Error = PipelineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        CodeTable::ALL
            .get(value as usize)
            .copied()
            .ok_or(PipelineError::UnknownCodeTable(value))
    }
}

impl FromStr for CodeTable {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "unicode" | "0" => Ok(CodeTable::Unicode),
            "tcvn3" | "abc" | "1" => Ok(CodeTable::Tcvn3),
            "vni" | "vni_windows" | "2" => Ok(CodeTable::VniWindows),
            "unicode_compound" | "compound" | "3" => Ok(CodeTable::UnicodeCompound),
            "cp1258" | "4" => Ok(CodeTable::Cp1258),
            other => Err(PipelineError::UnknownCodeTableName(other.to_string())),
        }
    }
}

impl fmt::Display for CodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodeTable::Unicode => "unicode",
            CodeTable::Tcvn3 => "tcvn3",
            CodeTable::VniWindows => "vni_windows",
            CodeTable::UnicodeCompound => "unicode_compound",
            CodeTable::Cp1258 => "cp1258",
        };
        f.write_str(name)
    }
}

/// One visual character's worth of emitted units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedChar {
    units: [u16; 2],
    len: u8,
}

impl EncodedChar {
    pub(crate) fn one(unit: u16) -> Self {
        Self {
            units: [unit, 0],
            len: 1,
        }
    }

    pub(crate) fn two(first: u16, second: u16) -> Self {
        Self {
            units: [first, second],
            len: 2,
        }
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.units[..self.len as usize]
    }

    /// Units emitted, which is also the length recorded on the sync stack.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Re-encode `text` from one table to another.
///
/// The input is interpreted as the UTF-16 units an application would hold
/// for text typed with `from`; units that are not part of a Vietnamese
/// letter pass through unchanged.
pub fn convert(text: &str, from: CodeTable, to: CodeTable) -> String {
    if from == to {
        return text.to_string();
    }
    let units: Vec<u16> = text.encode_utf16().collect();
    let unicode = from.decode_str(&units);
    String::from_utf16_lossy(&to.encode_str(&unicode))
}

fn compose(base: u16, mark: u16) -> Option<char> {
    let base = char::from_u32(base as u32)?;
    let mark = char::from_u32(mark as u32)?;
    let mut composed = [base, mark].into_iter().nfc();
    match (composed.next(), composed.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

// ========== Tables ==========

const ROW_COUNT: usize = 13;

/// Rows in engine key order: A, O, U, E, D, A^, A(, O^, O+, U+, E^, I, Y.
/// Rows of 14 hold circumflex/breve pairs then five tone pairs; rows of 10
/// hold five tone pairs (sắc, huyền, hỏi, ngã, nặng); each pair is upper
/// then lower case.
static TABLES: [[&[u16]; ROW_COUNT]; 5] = [
    // Unicode
    [
        &[0x00C2, 0x00E2, 0x0102, 0x0103, 0x00C1, 0x00E1, 0x00C0, 0x00E0, 0x1EA2, 0x1EA3, 0x00C3, 0x00E3, 0x1EA0, 0x1EA1],
        &[0x00D4, 0x00F4, 0x01A0, 0x01A1, 0x00D3, 0x00F3, 0x00D2, 0x00F2, 0x1ECE, 0x1ECF, 0x00D5, 0x00F5, 0x1ECC, 0x1ECD],
        &[0x0000, 0x0000, 0x01AF, 0x01B0, 0x00DA, 0x00FA, 0x00D9, 0x00F9, 0x1EE6, 0x1EE7, 0x0168, 0x0169, 0x1EE4, 0x1EE5],
        &[0x00CA, 0x00EA, 0x0000, 0x0000, 0x00C9, 0x00E9, 0x00C8, 0x00E8, 0x1EBA, 0x1EBB, 0x1EBC, 0x1EBD, 0x1EB8, 0x1EB9],
        &[0x0110, 0x0111],
        &[0x1EA4, 0x1EA5, 0x1EA6, 0x1EA7, 0x1EA8, 0x1EA9, 0x1EAA, 0x1EAB, 0x1EAC, 0x1EAD],
        &[0x1EAE, 0x1EAF, 0x1EB0, 0x1EB1, 0x1EB2, 0x1EB3, 0x1EB4, 0x1EB5, 0x1EB6, 0x1EB7],
        &[0x1ED0, 0x1ED1, 0x1ED2, 0x1ED3, 0x1ED4, 0x1ED5, 0x1ED6, 0x1ED7, 0x1ED8, 0x1ED9],
        &[0x1EDA, 0x1EDB, 0x1EDC, 0x1EDD, 0x1EDE, 0x1EDF, 0x1EE0, 0x1EE1, 0x1EE2, 0x1EE3],
        &[0x1EE8, 0x1EE9, 0x1EEA, 0x1EEB, 0x1EEC, 0x1EED, 0x1EEE, 0x1EEF, 0x1EF0, 0x1EF1],
        &[0x1EBE, 0x1EBF, 0x1EC0, 0x1EC1, 0x1EC2, 0x1EC3, 0x1EC4, 0x1EC5, 0x1EC6, 0x1EC7],
        &[0x00CD, 0x00ED, 0x00CC, 0x00EC, 0x1EC8, 0x1EC9, 0x0128, 0x0129, 0x1ECA, 0x1ECB],
        &[0x00DD, 0x00FD, 0x1EF2, 0x1EF3, 0x1EF6, 0x1EF7, 0x1EF8, 0x1EF9, 0x1EF4, 0x1EF5],
    ],
    // TCVN3
    [
        &[0xA2, 0xA9, 0xA1, 0xA8, 0xB8, 0xB8, 0xB5, 0xB5, 0xB6, 0xB6, 0xB7, 0xB7, 0xB9, 0xB9],
        &[0xA4, 0xAB, 0xA5, 0xAC, 0xE3, 0xE3, 0xDF, 0xDF, 0xE1, 0xE1, 0xE2, 0xE2, 0xE4, 0xE4],
        &[0x00, 0x00, 0xA6, 0xAD, 0xF3, 0xF3, 0xEF, 0xEF, 0xF1, 0xF1, 0xF2, 0xF2, 0xF4, 0xF4],
        &[0xA3, 0xAA, 0x00, 0x00, 0xD0, 0xD0, 0xCC, 0xCC, 0xCE, 0xCE, 0xCF, 0xCF, 0xD1, 0xD1],
        &[0xA7, 0xAE],
        &[0xCA, 0xCA, 0xC7, 0xC7, 0xC8, 0xC8, 0xC9, 0xC9, 0xCB, 0xCB],
        &[0xBE, 0xBE, 0xBB, 0xBB, 0xBC, 0xBC, 0xBD, 0xBD, 0xC6, 0xC6],
        &[0xE8, 0xE8, 0xE5, 0xE5, 0xE6, 0xE6, 0xE7, 0xE7, 0xE9, 0xE9],
        &[0xED, 0xED, 0xEA, 0xEA, 0xEB, 0xEB, 0xEC, 0xEC, 0xEE, 0xEE],
        &[0xF8, 0xF8, 0xF5, 0xF5, 0xF6, 0xF6, 0xF7, 0xF7, 0xF9, 0xF9],
        &[0xD5, 0xD5, 0xD2, 0xD2, 0xD3, 0xD3, 0xD4, 0xD4, 0xD6, 0xD6],
        &[0xDD, 0xDD, 0xD7, 0xD7, 0xD8, 0xD8, 0xDC, 0xDC, 0xDE, 0xDE],
        &[0xFD, 0xFD, 0xFA, 0xFA, 0xFB, 0xFB, 0xFC, 0xFC, 0xFE, 0xFE],
    ],
    // VNI Windows
    [
        &[0xC241, 0xE261, 0xCA41, 0xEA61, 0xD941, 0xF961, 0xD841, 0xF861, 0xDB41, 0xFB61, 0xD541, 0xF561, 0xCF41, 0xEF61],
        &[0xC24F, 0xE26F, 0x00D4, 0x00F4, 0xD94F, 0xF96F, 0xD84F, 0xF86F, 0xDB4F, 0xFB6F, 0xD54F, 0xF56F, 0xCF4F, 0xEF6F],
        &[0x0000, 0x0000, 0x00D6, 0x00F6, 0xD955, 0xF975, 0xD855, 0xF875, 0xDB55, 0xFB75, 0xD555, 0xF575, 0xCF55, 0xEF75],
        &[0xC245, 0xE265, 0x0000, 0x0000, 0xD945, 0xF965, 0xD845, 0xF865, 0xDB45, 0xFB65, 0xD545, 0xF565, 0xCF45, 0xEF65],
        &[0x00D1, 0x00F1],
        &[0xC141, 0xE161, 0xC041, 0xE061, 0xC541, 0xE561, 0xC341, 0xE361, 0xC441, 0xE461],
        &[0xC941, 0xE961, 0xC841, 0xE861, 0xDA41, 0xFA61, 0xDC41, 0xFC61, 0xCB41, 0xEB61],
        &[0xC14F, 0xE16F, 0xC04F, 0xE06F, 0xC54F, 0xE56F, 0xC34F, 0xE36F, 0xC44F, 0xE46F],
        &[0xD9D4, 0xF9F4, 0xD8D4, 0xF8F4, 0xDBD4, 0xFBF4, 0xD5D4, 0xF5F4, 0xCFD4, 0xEFF4],
        &[0xD9D6, 0xF9F6, 0xD8D6, 0xF8F6, 0xDBD6, 0xFBF6, 0xD5D6, 0xF5F6, 0xCFD6, 0xEFF6],
        &[0xC145, 0xE165, 0xC045, 0xE065, 0xC545, 0xE565, 0xC345, 0xE365, 0xC445, 0xE465],
        &[0x00CD, 0x00ED, 0x00CC, 0x00EC, 0x00C6, 0x00E6, 0x00D3, 0x00F3, 0x00D2, 0x00F2],
        &[0xD959, 0xF979, 0xD859, 0xF879, 0xDB59, 0xFB79, 0xD559, 0xF579, 0x00CE, 0x00EE],
    ],
    // Unicode Compound
    [
        &[0x00C2, 0x00E2, 0x0102, 0x0103, 0x2041, 0x2061, 0x4041, 0x4061, 0x6041, 0x6061, 0x8041, 0x8061, 0xA041, 0xA061],
        &[0x00D4, 0x00F4, 0x01A0, 0x01A1, 0x204F, 0x206F, 0x404F, 0x406F, 0x604F, 0x606F, 0x804F, 0x806F, 0xA04F, 0xA06F],
        &[0x0000, 0x0000, 0x01AF, 0x01B0, 0x2055, 0x2075, 0x4055, 0x4075, 0x6055, 0x6075, 0x8055, 0x8075, 0xA055, 0xA075],
        &[0x00CA, 0x00EA, 0x0000, 0x0000, 0x2045, 0x2065, 0x4045, 0x4065, 0x6045, 0x6065, 0x8045, 0x8065, 0xA045, 0xA065],
        &[0x0110, 0x0111],
        &[0x20C2, 0x20E2, 0x40C2, 0x40E2, 0x60C2, 0x60E2, 0x80C2, 0x80E2, 0xA0C2, 0xA0E2],
        &[0x2102, 0x2103, 0x4102, 0x4103, 0x6102, 0x6103, 0x8102, 0x8103, 0xA102, 0xA103],
        &[0x20D4, 0x20F4, 0x40D4, 0x40F4, 0x60D4, 0x60F4, 0x80D4, 0x80F4, 0xA0D4, 0xA0F4],
        &[0x21A0, 0x21A1, 0x41A0, 0x41A1, 0x61A0, 0x61A1, 0x81A0, 0x81A1, 0xA1A0, 0xA1A1],
        &[0x21AF, 0x21B0, 0x41AF, 0x41B0, 0x61AF, 0x61B0, 0x81AF, 0x81B0, 0xA1AF, 0xA1B0],
        &[0x20CA, 0x20EA, 0x40CA, 0x40EA, 0x60CA, 0x60EA, 0x80CA, 0x80EA, 0xA0CA, 0xA0EA],
        &[0x2049, 0x2069, 0x4049, 0x4069, 0x6049, 0x6069, 0x8049, 0x8069, 0xA049, 0xA069],
        &[0x2059, 0x2079, 0x4059, 0x4079, 0x6059, 0x6079, 0x8059, 0x8079, 0xA059, 0xA079],
    ],
    // CP1258
    [
        &[0x00C2, 0x00E2, 0x00C3, 0x00E3, 0xEC41, 0xEC61, 0xCC41, 0xCC61, 0xD241, 0xD261, 0xDE41, 0xDE61, 0xF241, 0xF261],
        &[0x00D4, 0x00F4, 0x00D5, 0x00F5, 0xEC4F, 0xEC6F, 0xCC4F, 0xCC6F, 0xD24F, 0xD26F, 0xDE4F, 0xDE6F, 0xF24F, 0xF26F],
        &[0x0000, 0x0000, 0x00DD, 0x00FD, 0xEC55, 0xEC75, 0xCC55, 0xCC75, 0xD255, 0xD275, 0xDE55, 0xDE75, 0xF255, 0xF275],
        &[0x00CA, 0x00EA, 0x0000, 0x0000, 0xEC45, 0xEC65, 0xCC45, 0xCC65, 0xD245, 0xD265, 0xDE45, 0xDE65, 0xF245, 0xF265],
        &[0x00D0, 0x00F0],
        &[0xECC2, 0xECE2, 0xCCC2, 0xCCE2, 0xD2C2, 0xD2E2, 0xDEC2, 0xDEE2, 0xF2C2, 0xF2E2],
        &[0xECC3, 0xECE3, 0xCCC3, 0xCCE3, 0xD2C3, 0xD2E3, 0xDEC3, 0xDEE3, 0xF2C3, 0xF2E3],
        &[0xECD4, 0xECF4, 0xCCD4, 0xCCF4, 0xD2D4, 0xD2F4, 0xDED4, 0xDEF4, 0xF2D4, 0xF2F4],
        &[0xECD5, 0xECF5, 0xCCD5, 0xCCF5, 0xD2D5, 0xD2F5, 0xDED5, 0xDEF5, 0xF2D5, 0xF2F5],
        &[0xECDD, 0xECFD, 0xCCDD, 0xCCFD, 0xD2DD, 0xD2FD, 0xDEDD, 0xDEFD, 0xF2DD, 0xF2FD],
        &[0xECCA, 0xECEA, 0xCCCA, 0xCCEA, 0xD2CA, 0xD2EA, 0xDECA, 0xDEEA, 0xF2CA, 0xF2EA],
        &[0xEC49, 0xEC69, 0xCC49, 0xCC69, 0xD249, 0xD269, 0xDE49, 0xDE69, 0xF249, 0xF269],
        &[0xEC59, 0xEC79, 0xCC59, 0xCC79, 0xD259, 0xD279, 0xDE59, 0xDE79, 0xF259, 0xF279],
    ],
];

/// Vietnamese letter → (row, column) in [`TABLES`], keyed by the Unicode row.
static LETTER_POSITIONS: Lazy<AHashMap<char, (usize, usize)>> = Lazy::new(|| {
    let mut map = AHashMap::with_capacity(140);
    for (row, cells) in TABLES[0].iter().enumerate() {
        for (col, &code) in cells.iter().enumerate() {
            if code == 0 {
                continue;
            }
            if let Some(ch) = char::from_u32(code as u32) {
                map.insert(ch, (row, col));
            }
        }
    }
    map
});

/// Table code → letter for each table. Later entries win, so TCVN3 codes
/// shared by both cases decode to the lowercase letter.
static REVERSE: Lazy<Vec<AHashMap<u16, char>>> = Lazy::new(|| {
    TABLES
        .iter()
        .map(|table| {
            let mut map = AHashMap::with_capacity(140);
            for (row, cells) in table.iter().enumerate() {
                for (col, &code) in cells.iter().enumerate() {
                    if code == 0 {
                        continue;
                    }
                    if let Some(ch) = char::from_u32(TABLES[0][row][col] as u32) {
                        map.insert(code, ch);
                    }
                }
            }
            map
        })
        .collect()
});

/// Every Vietnamese letter known to the code tables, in table order.
pub fn vietnamese_letters() -> impl Iterator<Item = char> {
    TABLES[0]
        .iter()
        .flat_map(|row| row.iter())
        .filter(|&&code| code != 0)
        .filter_map(|&code| char::from_u32(code as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_count() {
        assert_eq!(vietnamese_letters().count(), 134);
        assert_eq!(LETTER_POSITIONS.len(), 134);
    }

    #[test]
    fn test_encode_unicode_is_single_unit() {
        let code = CodeTable::Unicode.code_for('ờ').unwrap();
        let enc = CodeTable::Unicode.encode(code);
        assert_eq!(enc.as_slice(), &[0x1EDD]);
        assert_eq!(enc.len(), 1);
    }

    #[test]
    fn test_encode_vni_emits_base_then_tone_byte() {
        let code = CodeTable::VniWindows.code_for('á').unwrap();
        assert_eq!(code, 0xF961);
        assert_eq!(CodeTable::VniWindows.encode(code).as_slice(), &[0x61, 0xF9]);
        // Single byte letters stay single.
        let code = CodeTable::VniWindows.code_for('ơ').unwrap();
        assert_eq!(CodeTable::VniWindows.encode(code).as_slice(), &[0xF4]);
    }

    #[test]
    fn test_encode_compound_appends_mark() {
        let code = CodeTable::UnicodeCompound.code_for('ồ').unwrap();
        let enc = CodeTable::UnicodeCompound.encode(code);
        assert_eq!(enc.as_slice(), &[0xF4, 0x0300]);
        let plain = CodeTable::UnicodeCompound.code_for('ơ').unwrap();
        assert_eq!(CodeTable::UnicodeCompound.encode(plain).len(), 1);
    }

    #[test]
    fn test_round_trip_all_tables() {
        for table in CodeTable::ALL {
            for ch in vietnamese_letters() {
                let code = table.code_for(ch).unwrap();
                let enc = table.encode(code);
                let (decoded, used) = table.decode(enc.as_slice()).unwrap();
                assert_eq!(used, enc.len(), "{table} {ch}");
                if table == CodeTable::Tcvn3 {
                    assert_eq!(decoded.to_lowercase().next(), ch.to_lowercase().next());
                } else {
                    assert_eq!(decoded, ch, "{table}");
                }
            }
        }
    }

    #[test]
    fn test_sync_units_match_emitted_units() {
        for table in CodeTable::ALL.into_iter().filter(|t| t.is_double_code()) {
            for ch in vietnamese_letters() {
                let enc = table.encode(table.code_for(ch).unwrap());
                assert!(enc.len() == 1 || enc.len() == 2);
            }
        }
        assert!(!CodeTable::Unicode.is_double_code());
        assert!(!CodeTable::Tcvn3.is_double_code());
    }

    #[test]
    fn test_non_vietnamese_has_no_code() {
        assert_eq!(CodeTable::Unicode.code_for('a'), None);
        assert_eq!(CodeTable::VniWindows.code_for('z'), None);
    }

    #[test]
    fn test_convert_between_tables() {
        let text = "Việt Nam đẹp";
        let vni = convert(text, CodeTable::Unicode, CodeTable::VniWindows);
        assert_ne!(vni, text);
        assert_eq!(convert(&vni, CodeTable::VniWindows, CodeTable::Unicode), text);

        let compound = convert(text, CodeTable::Unicode, CodeTable::UnicodeCompound);
        // ệ and ẹ each gain a combining dot below.
        assert_eq!(compound.chars().count(), text.chars().count() + 2);
        assert_eq!(
            convert(&compound, CodeTable::UnicodeCompound, CodeTable::Unicode),
            text
        );
    }

    #[test]
    fn test_table_names() {
        assert_eq!("vni".parse::<CodeTable>().unwrap(), CodeTable::VniWindows);
        assert_eq!(CodeTable::try_from(4).unwrap(), CodeTable::Cp1258);
        assert!(CodeTable::try_from(9).is_err());
        assert!("klingon".parse::<CodeTable>().is_err());
    }
}
