//! Driver configuration
//!
//! All structs deserialize with per-field defaults, so a JSON file only needs
//! the values that differ from a stock sensor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::acquisition::AdcDecoder;
use crate::protocol::{QzfmError, Result, StatusScaling, DEFAULT_BAUD_RATE, DEFAULT_STATUS_CHUNK};

/// Serial port settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name (e.g. "/dev/ttyUSB0" or "COM3")
    pub port_name: String,
    pub baud_rate: u32,
    /// Per-read timeout; a read returns what it has when this expires
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
        }
    }
}

/// Decoding constants for the high-rate ADC stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    /// Characters per word on the wire, excluding CRLF (`!` marker + digits)
    pub word_width: usize,
    /// Raw reading corresponding to zero field
    pub midpoint: i64,
    /// pT per count
    pub scale: f64,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            word_width: 8,
            midpoint: 8_388_608,
            scale: 0.01,
        }
    }
}

/// Complete driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub serial: SerialConfig,
    /// Bytes per bounded status read
    pub nbytes_status: usize,
    /// High-rate data stream sample rate in Hz
    pub data_rate_hz: f64,
    /// Nominal cadence of the offset-capture channel in Hz
    pub offset_rate_hz: f64,
    pub adc: AdcConfig,
    pub status: StatusScaling,
    /// Wait for a command confirmation message
    pub message_timeout_ms: u64,
    /// Wait for the gain change confirmation
    pub gain_timeout_ms: u64,
    /// Wait for the calibration result message
    pub calibration_timeout_ms: u64,
    /// Offset capture may take this multiple of its nominal duration
    pub offset_timeout_factor: f64,
    /// Fixed allowance added to the offset capture bound
    pub offset_timeout_slack_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            nbytes_status: DEFAULT_STATUS_CHUNK,
            data_rate_hz: 200.0,
            offset_rate_hz: 7.5,
            adc: AdcConfig::default(),
            status: StatusScaling::default(),
            message_timeout_ms: 1_000,
            gain_timeout_ms: 10_000,
            calibration_timeout_ms: 100_000,
            offset_timeout_factor: 3.0,
            offset_timeout_slack_ms: 2_000,
        }
    }
}

impl DriverConfig {
    /// Parse a JSON document, filling unspecified fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DriverConfig =
            serde_json::from_str(json).map_err(|e| QzfmError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the decoders cannot work with.
    ///
    /// The ADC scale is also checked against its reference reading: the
    /// midpoint word must decode to exactly zero field.
    pub fn validate(&self) -> Result<()> {
        fn bad(msg: impl Into<String>) -> Result<()> {
            Err(QzfmError::InvalidConfig(msg.into()))
        }

        if self.nbytes_status == 0 {
            return bad("nbytes_status must be positive");
        }
        if !(self.data_rate_hz.is_finite() && self.data_rate_hz > 0.0) {
            return bad("data_rate_hz must be a positive number");
        }
        if !(self.offset_rate_hz.is_finite() && self.offset_rate_hz > 0.0) {
            return bad("offset_rate_hz must be a positive number");
        }
        if self.adc.word_width < 2 {
            return bad("adc.word_width must leave room for the marker and digits");
        }
        if !(self.adc.scale.is_finite() && self.adc.scale != 0.0) {
            return bad("adc.scale must be finite and non-zero");
        }
        if !(self.status.field_scale.is_finite() && self.status.field_scale != 0.0) {
            return bad("status.field_scale must be finite and non-zero");
        }
        if !(self.status.temp_error_divisor.is_finite() && self.status.temp_error_divisor != 0.0)
        {
            return bad("status.temp_error_divisor must be finite and non-zero");
        }
        if !(self.offset_timeout_factor.is_finite() && self.offset_timeout_factor > 0.0) {
            return bad("offset_timeout_factor must be a positive number");
        }

        let decoder = AdcDecoder::from_config(&self.adc);
        let reference = format!("{:0width$}", self.adc.midpoint, width = decoder.digits());
        if decoder.decode_word(&reference) != Ok(0.0) {
            return bad(format!(
                "ADC midpoint {} does not decode to zero field",
                self.adc.midpoint
            ));
        }
        Ok(())
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn gain_timeout(&self) -> Duration {
        Duration::from_millis(self.gain_timeout_ms)
    }

    pub fn calibration_timeout(&self) -> Duration {
        Duration::from_millis(self.calibration_timeout_ms)
    }

    /// Upper bound on an offset capture of `npts` samples per axis
    pub fn offset_timeout(&self, npts: usize) -> Duration {
        let nominal = npts as f64 / self.offset_rate_hz;
        Duration::from_secs_f64(nominal * self.offset_timeout_factor)
            + Duration::from_millis(self.offset_timeout_slack_ms)
    }

    /// Samples in `seconds` of high-rate data
    pub fn samples_for(&self, seconds: f64) -> usize {
        (seconds * self.data_rate_hz).max(0.0) as usize
    }
}
