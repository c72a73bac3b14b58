//! Status line classification
//!
//! Status lines start with a one-character class marker:
//!
//! | Marker | Layout                         | Meaning            |
//! |--------|--------------------------------|--------------------|
//! | `\|`   | LED index `1`-`5`, then `0`/`1` | LED off/on         |
//! | `~`    | 2-digit code, numeric payload  | sensor parameter   |
//! | `#`    | free text                      | device message     |
//!
//! Anything else is ignored.

use serde::{Deserialize, Serialize};

use super::LineFault;

/// Sensor parameters reported on the status channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKey {
    CellTempError,
    CellTempVoltage,
    Bz,
    By,
    B0,
}

impl ParamKey {
    pub const ALL: [ParamKey; 5] = [
        ParamKey::CellTempError,
        ParamKey::CellTempVoltage,
        ParamKey::Bz,
        ParamKey::By,
        ParamKey::B0,
    ];

    /// Two-digit wire code
    pub fn code(&self) -> &'static str {
        match self {
            ParamKey::CellTempError => "04",
            ParamKey::CellTempVoltage => "05",
            ParamKey::Bz => "07",
            ParamKey::By => "08",
            ParamKey::B0 => "09",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "04" => Some(ParamKey::CellTempError),
            "05" => Some(ParamKey::CellTempVoltage),
            "07" => Some(ParamKey::Bz),
            "08" => Some(ParamKey::By),
            "09" => Some(ParamKey::B0),
            _ => None,
        }
    }

    /// Field readings keep their last value when a batch omits them.
    pub fn is_field(&self) -> bool {
        matches!(self, ParamKey::Bz | ParamKey::By | ParamKey::B0)
    }
}

/// Conversion from raw status payloads to physical values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusScaling {
    /// Midpoint of the 16-bit field readings
    pub field_offset: f64,
    /// pT per count applied after removing the offset
    pub field_scale: f64,
    /// Midpoint of the 24-bit temperature error reading
    pub temp_error_offset: f64,
    pub temp_error_divisor: f64,
}

impl Default for StatusScaling {
    fn default() -> Self {
        Self {
            field_offset: 32768.0,
            field_scale: 1.0,
            temp_error_offset: 8_388_608.0,
            temp_error_divisor: 524_288.0,
        }
    }
}

impl StatusScaling {
    /// Convert a validated raw payload for `key`
    pub fn convert(&self, key: ParamKey, raw: f64) -> f64 {
        match key {
            ParamKey::CellTempError => (raw - self.temp_error_offset) / self.temp_error_divisor,
            ParamKey::CellTempVoltage => raw,
            ParamKey::Bz | ParamKey::By | ParamKey::B0 => {
                (raw - self.field_offset) * self.field_scale
            }
        }
    }
}

/// A classified status line
#[derive(Debug, Clone, PartialEq)]
pub enum Code {
    /// LED `index` (1-5) on/off
    Led { index: u8, on: bool },
    /// Raw (unconverted) parameter reading
    Param { key: ParamKey, raw: f64 },
    /// Free-text device message
    Message(String),
}

/// Prefix used to deduplicate status lines within one batch.
///
/// LED lines dedupe on marker + index, parameter lines on marker + code.
/// Messages and unclassified lines have no prefix.
pub fn dedup_prefix(line: &str) -> Option<&str> {
    let width = match line.chars().next()? {
        '|' => 2,
        '~' => 3,
        _ => return None,
    };
    line.get(..width)
}

/// Strict numeric check: digits with optional `.` and `-`, at least one digit.
pub fn is_numeric_payload(payload: &str) -> bool {
    let mut digits = 0;
    for c in payload.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' | '-' => {}
            _ => return false,
        }
    }
    digits > 0
}

/// Classify one status line
pub fn classify(line: &str) -> Result<Code, LineFault> {
    let mut chars = line.chars();
    let marker = chars.next().ok_or(LineFault::Empty)?;
    let rest = chars.as_str();

    match marker {
        '|' => {
            let mut it = rest.chars();
            let (Some(index), Some(state)) = (it.next(), it.next()) else {
                return Err(LineFault::Truncated(line.to_string()));
            };
            let index = match index {
                '1'..='5' => index as u8 - b'0',
                _ => return Err(LineFault::UnknownCode(line.to_string())),
            };
            let on = match state {
                '1' => true,
                '0' => false,
                _ => return Err(LineFault::UnknownCode(line.to_string())),
            };
            Ok(Code::Led { index, on })
        }
        '~' => {
            let (Some(code), Some(payload)) = (rest.get(..2), rest.get(2..)) else {
                return Err(LineFault::Truncated(line.to_string()));
            };
            let key =
                ParamKey::from_code(code).ok_or_else(|| LineFault::UnknownCode(line.to_string()))?;
            if !is_numeric_payload(payload) {
                return Err(LineFault::NonNumeric(line.to_string()));
            }
            let raw = payload
                .parse::<f64>()
                .map_err(|_| LineFault::NonNumeric(line.to_string()))?;
            Ok(Code::Param { key, raw })
        }
        '#' => Ok(Code::Message(rest.to_string())),
        other => Err(LineFault::Unclassified(other)),
    }
}

/// The codes extracted from one bounded status read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusBatch {
    /// Most recent LED/parameter code per prefix, latest line first
    pub codes: Vec<Code>,
    /// Every message in arrival order
    pub messages: Vec<String>,
}

impl StatusBatch {
    /// Build a batch from lines in arrival order (oldest first).
    ///
    /// Lines are scanned newest first and only the first line seen per dedup
    /// prefix is kept, so the latest value of each code wins.
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut seen: Vec<&str> = Vec::new();
        let mut codes = Vec::new();

        for line in lines.iter().rev() {
            let line = line.as_ref();
            let Some(prefix) = dedup_prefix(line) else {
                continue;
            };
            if seen.contains(&prefix) {
                continue;
            }
            seen.push(prefix);

            match classify(line) {
                Ok(code) => codes.push(code),
                Err(fault) => tracing::trace!("skipping status line: {fault}"),
            }
        }

        let messages = lines
            .iter()
            .filter_map(|line| match classify(line.as_ref()) {
                Ok(Code::Message(text)) => Some(text),
                _ => None,
            })
            .collect();

        Self { codes, messages }
    }

    /// True if the batch carried a reading for any of `keys`
    pub fn has_param(&self, keys: &[ParamKey]) -> bool {
        self.codes
            .iter()
            .any(|code| matches!(code, Code::Param { key, .. } if keys.contains(key)))
    }
}
