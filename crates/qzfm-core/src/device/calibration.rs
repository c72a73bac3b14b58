//! Calibration result parsing
//!
//! After a calibration the sensor reports its result as a message of the form
//! `Calib X: 1.02, Y: 0.98, Z: 1.01, (Bz)0.35, (By)0.12`: one factor per axis,
//! followed by any number of labelled terms.

use serde::{Deserialize, Serialize};

/// Parsed calibration confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Additional `(label)value` terms in message order
    pub extra: Vec<(String, f64)>,
}

impl CalibrationReport {
    /// Parse a message, or `None` if it is not a well-formed calibration result
    pub fn parse(text: &str) -> Option<Self> {
        if !text.contains("Calib") {
            return None;
        }

        let mut parts = text.split(',').map(str::trim);
        let mut axis = || -> Option<f64> { parts.next()?.rsplit(':').next()?.trim().parse().ok() };
        let (x, y, z) = (axis()?, axis()?, axis()?);

        let mut extra = Vec::new();
        for term in parts {
            let (label, value) = term.strip_prefix('(')?.split_once(')')?;
            extra.push((label.to_string(), value.trim().parse().ok()?));
        }

        Some(Self { x, y, z, extra })
    }
}
