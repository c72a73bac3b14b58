//! Device state record
//!
//! One instance lives inside the driver. Every status read and command
//! updates it; collaborators only ever see it through `&DeviceState`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CalibrationReport;
use crate::protocol::{AxisMode, Code, Gain, ParamKey, ReadAxis, StatusBatch, StatusScaling};
use crate::zeroing::ZeroPhase;

/// The five front-panel status LEDs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedStatus {
    /// LED1
    pub laser_on: bool,
    /// LED2
    pub cell_temp_lock: bool,
    /// LED3
    pub laser_lock: bool,
    /// LED4
    pub field_zeroed: bool,
    /// LED5
    pub is_master: bool,
}

impl LedStatus {
    fn slot(&mut self, index: u8) -> Option<&mut bool> {
        match index {
            1 => Some(&mut self.laser_on),
            2 => Some(&mut self.cell_temp_lock),
            3 => Some(&mut self.laser_lock),
            4 => Some(&mut self.field_zeroed),
            5 => Some(&mut self.is_master),
            _ => None,
        }
    }
}

/// Sensor parameter readback; NaN means unknown
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorParams {
    pub cell_temp_error: f64,
    pub cell_temp_voltage: f64,
    /// pT
    pub bz: f64,
    /// pT
    pub by: f64,
    /// pT
    pub b0: f64,
}

impl Default for SensorParams {
    fn default() -> Self {
        Self {
            cell_temp_error: f64::NAN,
            cell_temp_voltage: f64::NAN,
            bz: f64::NAN,
            by: f64::NAN,
            b0: f64::NAN,
        }
    }
}

impl SensorParams {
    pub fn set(&mut self, key: ParamKey, value: f64) {
        match key {
            ParamKey::CellTempError => self.cell_temp_error = value,
            ParamKey::CellTempVoltage => self.cell_temp_voltage = value,
            ParamKey::Bz => self.bz = value,
            ParamKey::By => self.by = value,
            ParamKey::B0 => self.b0 = value,
        }
    }
}

/// A device message and the time its status read completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Everything the driver knows about the sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub axis_mode: AxisMode,
    /// `None` until an axis is selected this session
    pub read_axis: Option<ReadAxis>,
    pub gain: Gain,
    pub is_data_streaming: bool,
    pub is_field_zeroed: bool,
    pub is_xyz_zeroing: bool,
    pub is_calibrated: bool,
    pub led: LedStatus,
    pub sensor_par: SensorParams,
    /// Append-only for the life of the session
    pub messages: Vec<Message>,
    pub status_last_updated: Option<DateTime<Utc>>,
    pub zero_phase: ZeroPhase,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            axis_mode: AxisMode::default(),
            read_axis: None,
            gain: Gain::default(),
            is_data_streaming: false,
            is_field_zeroed: false,
            is_xyz_zeroing: true,
            is_calibrated: false,
            led: LedStatus::default(),
            sensor_par: SensorParams::default(),
            messages: Vec::new(),
            status_last_updated: None,
            zero_phase: ZeroPhase::Idle,
        }
    }
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore modes and flags to power-on defaults.
    ///
    /// LEDs, parameters and the message log are left alone; the next status
    /// read refreshes them.
    pub fn reset_attributes(&mut self) {
        self.is_data_streaming = false;
        self.is_field_zeroed = false;
        self.is_xyz_zeroing = true;
        self.is_calibrated = false;
        self.axis_mode = AxisMode::default();
        self.read_axis = None;
        self.gain = Gain::default();
        self.zero_phase = ZeroPhase::Idle;
    }

    /// Record an axis-mode change. Null and calibration no longer hold.
    pub fn set_axis_mode(&mut self, mode: AxisMode) {
        self.axis_mode = mode;
        self.invalidate_null();
    }

    pub fn invalidate_null(&mut self) {
        self.is_calibrated = false;
        self.is_field_zeroed = false;
    }

    /// Fold one status batch into the state.
    ///
    /// LEDs missing from the batch turn off. Field readings missing from the
    /// batch keep their last value; other parameters become NaN.
    pub fn apply_status(&mut self, batch: &StatusBatch, scaling: &StatusScaling, at: DateTime<Utc>) {
        let mut led = LedStatus::default();
        let mut seen: Vec<(ParamKey, f64)> = Vec::new();

        for code in &batch.codes {
            match code {
                Code::Led { index, on } => {
                    if let Some(slot) = led.slot(*index) {
                        *slot = *on;
                    }
                }
                Code::Param { key, raw } => seen.push((*key, scaling.convert(*key, *raw))),
                Code::Message(_) => {}
            }
        }

        self.led = led;
        for key in ParamKey::ALL {
            match seen.iter().find(|(k, _)| *k == key) {
                Some((_, value)) => self.sensor_par.set(key, *value),
                None if key.is_field() => {}
                None => self.sensor_par.set(key, f64::NAN),
            }
        }

        self.record_messages(batch.messages.iter().cloned(), at);
        self.status_last_updated = Some(at);
    }

    pub fn record_messages(&mut self, texts: impl IntoIterator<Item = String>, at: DateTime<Utc>) {
        self.messages.extend(texts.into_iter().map(|text| Message {
            text,
            received_at: at,
        }));
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Most recent calibration result found in the message log
    pub fn calibration(&self) -> Option<CalibrationReport> {
        self.messages
            .iter()
            .rev()
            .find_map(|m| CalibrationReport::parse(&m.text))
    }

    pub fn snapshot(&self) -> super::StatusSnapshot {
        super::StatusSnapshot {
            sensor_par: self.sensor_par,
            gain_volts_per_nt: self.gain.volts_per_nanotesla(),
            led: self.led,
            last_updated: self.status_last_updated,
            calibration: if self.is_calibrated {
                self.calibration()
            } else {
                None
            },
            last_message: self.last_message().map(|m| m.text.clone()),
        }
    }
}
