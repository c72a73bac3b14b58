//! Device State
//!
//! The mutable record of sensor modes, LEDs, parameter readback and messages.

mod calibration;
mod state;

pub use calibration::CalibrationReport;
pub use state::{DeviceState, LedStatus, Message, SensorParams};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Point-in-time view of the sensor status, suitable for export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub sensor_par: SensorParams,
    pub gain_volts_per_nt: f64,
    pub led: LedStatus,
    pub last_updated: Option<DateTime<Utc>>,
    /// Present only while the sensor is calibrated
    pub calibration: Option<CalibrationReport>,
    pub last_message: Option<String>,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_updated {
            Some(t) => writeln!(f, "Last updated: {}", t.format("%Y-%m-%d %H:%M:%S%.3f"))?,
            None => writeln!(f, "Last updated: never")?,
        }
        writeln!(f)?;
        writeln!(f, "Field zeroed:    {}", self.led.field_zeroed)?;
        writeln!(f, "Laser lock:      {}", self.led.laser_lock)?;
        writeln!(f, "Cell T lock:     {}", self.led.cell_temp_lock)?;
        writeln!(f, "Laser on:        {}", self.led.laser_on)?;
        writeln!(f)?;
        writeln!(f, "Cell T error:    {:.5}", self.sensor_par.cell_temp_error)?;
        writeln!(f, "Bz field:        {:.4} pT", self.sensor_par.bz)?;
        writeln!(f, "By field:        {:.4} pT", self.sensor_par.by)?;
        write!(f, "B0 field:        {:.4} pT", self.sensor_par.b0)?;
        if let Some(message) = &self.last_message {
            write!(f, "\n\n{message}")?;
        }
        Ok(())
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "is_data_streaming:   {}", self.is_data_streaming)?;
        writeln!(f, "is_field_zeroed:     {}", self.is_field_zeroed)?;
        writeln!(f, "is_xyz_zeroing:      {}", self.is_xyz_zeroing)?;
        writeln!(f, "is_calibrated:       {}", self.is_calibrated)?;
        writeln!(f, "axis_mode:           {}", self.axis_mode)?;
        match self.read_axis {
            Some(axis) => writeln!(f, "read_axis:           {axis}")?,
            None => writeln!(f, "read_axis:           unknown")?,
        }
        write!(
            f,
            "gain:                {} V/nT",
            self.gain.volts_per_nanotesla()
        )
    }
}
