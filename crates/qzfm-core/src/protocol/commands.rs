//! Protocol commands
//!
//! Every QZFM command is a single byte. Mode arguments are closed enums so an
//! unknown token is rejected while parsing, before anything reaches the port.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::QzfmError;

/// Field-sensitive axis configuration of the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisMode {
    #[default]
    Z,
    Y,
    Dual,
}

/// Axis reported by the readback stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadAxis {
    X,
    Y,
    #[default]
    Z,
}

/// Analog output gain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gain {
    #[serde(rename = "0.1x")]
    G0_1x,
    #[serde(rename = "0.33x")]
    G0_33x,
    #[default]
    #[serde(rename = "1x")]
    G1x,
    #[serde(rename = "3x")]
    G3x,
}

impl Gain {
    /// Output scaling in V/nT
    pub fn volts_per_nanotesla(&self) -> f64 {
        match self {
            Gain::G0_1x => 0.27,
            Gain::G0_33x => 0.9,
            Gain::G1x => 2.7,
            Gain::G3x => 8.1,
        }
    }
}

/// Axes driven by the field-zeroing coils
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroAxes {
    #[default]
    Xyz,
    Yz,
}

/// Protocol commands for sensor control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the high-rate digital data stream ("print on")
    DataStreamOn,
    /// Stop the data stream and resume status output ("print off")
    DataStreamOff,
    /// Select the readback axis
    SelectAxis(ReadAxis),
    /// Change the field-sensitive axis mode
    SetAxisMode(AxisMode),
    /// Change the analog gain
    SetGain(Gain),
    /// Set internal coil fields to zero
    FieldReset,
    /// Choose the axes that field zeroing acts on
    ZeroAxes(ZeroAxes),
    /// Start field zeroing
    ZeroOn,
    /// Stop field zeroing and hold the compensation field
    ZeroOff,
    /// Run the internal calibration
    Calibrate,
    /// Device-driven startup sequence
    AutoStart,
    /// Reboot the microprocessor and reload firmware
    Reboot,
}

impl Command {
    /// Wire byte for this command
    pub fn byte(&self) -> u8 {
        match self {
            Command::DataStreamOn => 0x37,
            Command::DataStreamOff => 0x38,
            Command::SelectAxis(ReadAxis::X) => 0x47,
            Command::SelectAxis(ReadAxis::Y) => 0x40,
            Command::SelectAxis(ReadAxis::Z) => 0x3F,
            Command::SetAxisMode(AxisMode::Z) => 0x43,
            Command::SetAxisMode(AxisMode::Y) => 0x46,
            Command::SetAxisMode(AxisMode::Dual) => 0x42,
            Command::SetGain(Gain::G0_1x) => 0x1E,
            Command::SetGain(Gain::G0_33x) => 0x61,
            Command::SetGain(Gain::G1x) => 0x60,
            Command::SetGain(Gain::G3x) => 0x62,
            Command::FieldReset => 0x56,
            Command::ZeroAxes(ZeroAxes::Xyz) => 0x69,
            Command::ZeroAxes(ZeroAxes::Yz) => 0x68,
            Command::ZeroOn => 0x44,
            Command::ZeroOff => 0x45,
            Command::Calibrate => 0x39,
            Command::AutoStart => 0x3E,
            Command::Reboot => 0x65,
        }
    }
}

fn normalize(token: &str) -> String {
    token.trim().to_ascii_lowercase()
}

impl FromStr for AxisMode {
    type Err = QzfmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "z" => Ok(AxisMode::Z),
            "y" => Ok(AxisMode::Y),
            "dual" => Ok(AxisMode::Dual),
            _ => Err(QzfmError::Precondition(format!(
                "bad axis mode {s:?}: must be one of z, y, dual"
            ))),
        }
    }
}

impl FromStr for ReadAxis {
    type Err = QzfmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "x" => Ok(ReadAxis::X),
            "y" => Ok(ReadAxis::Y),
            "z" => Ok(ReadAxis::Z),
            _ => Err(QzfmError::Precondition(format!(
                "unknown axis {s:?}: must be one of x, y, z"
            ))),
        }
    }
}

impl FromStr for Gain {
    type Err = QzfmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "0.1x" => Ok(Gain::G0_1x),
            "0.33x" => Ok(Gain::G0_33x),
            "1x" => Ok(Gain::G1x),
            "3x" => Ok(Gain::G3x),
            _ => Err(QzfmError::Precondition(format!(
                "bad gain setting {s:?}: must be 0.1x|0.33x|1x|3x"
            ))),
        }
    }
}

impl FromStr for ZeroAxes {
    type Err = QzfmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "xyz" => Ok(ZeroAxes::Xyz),
            "yz" => Ok(ZeroAxes::Yz),
            _ => Err(QzfmError::Precondition(format!(
                "bad zeroing axes {s:?}: must be xyz or yz"
            ))),
        }
    }
}

impl fmt::Display for ReadAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReadAxis::X => "x",
            ReadAxis::Y => "y",
            ReadAxis::Z => "z",
        };
        f.write_str(s)
    }
}

impl fmt::Display for AxisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AxisMode::Z => "z",
            AxisMode::Y => "y",
            AxisMode::Dual => "dual",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Gain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Gain::G0_1x => "0.1x",
            Gain::G0_33x => "0.33x",
            Gain::G1x => "1x",
            Gain::G3x => "3x",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(Command::DataStreamOn.byte(), b'7');
        assert_eq!(Command::SelectAxis(ReadAxis::Z).byte(), b'?');
        assert_eq!(Command::SetGain(Gain::G1x).byte(), b'`');
        assert_eq!(Command::SetGain(Gain::G0_1x).byte(), 30);
        assert_eq!(Command::ZeroOff.byte(), b'E');
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!(" Dual ".parse::<AxisMode>().unwrap(), AxisMode::Dual);
        assert_eq!("X".parse::<ReadAxis>().unwrap(), ReadAxis::X);
        assert_eq!("0.33x".parse::<Gain>().unwrap(), Gain::G0_33x);
        assert_eq!("yz".parse::<ZeroAxes>().unwrap(), ZeroAxes::Yz);
    }

    #[test]
    fn test_unknown_tokens_rejected() {
        assert!(matches!(
            "w".parse::<ReadAxis>(),
            Err(QzfmError::Precondition(_))
        ));
        assert!(matches!("xy".parse::<AxisMode>(), Err(QzfmError::Precondition(_))));
        assert!(matches!("2x".parse::<Gain>(), Err(QzfmError::Precondition(_))));
    }

    #[test]
    fn test_gain_values() {
        assert_eq!(Gain::G0_1x.volts_per_nanotesla(), 0.27);
        assert_eq!(Gain::G3x.volts_per_nanotesla(), 8.1);
        assert_eq!(Gain::default().to_string(), "1x");
    }
}
