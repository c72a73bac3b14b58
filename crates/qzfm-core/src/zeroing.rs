//! Field-zero convergence
//!
//! While zeroing runs the sensor drives its coils toward null and reports the
//! compensation fields on the status channel. The driver polls status and
//! feeds each reading to a [`ConvergenceTracker`], which decides when the
//! readings have settled.
//!
//! Zeroing stops when every enabled criterion holds:
//!
//! ```text
//! |ΔBz| <= d_bz  AND  |ΔBy| <= d_by  AND  |ΔB0| <= d_b0  AND  |T_error| <= t_error
//! ```
//!
//! An infinite threshold disables its criterion. With every criterion
//! disabled the loop never stops on its own and only cancellation ends it.

use serde::{Deserialize, Serialize};

use crate::device::SensorParams;
use crate::protocol::ParamKey;

/// Where the field-zero procedure currently stands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZeroPhase {
    #[default]
    Idle,
    Zeroing,
    Converged,
    Cancelled,
}

/// How a zeroing run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroOutcome {
    /// Stop criteria met after this many polls
    Converged { iterations: usize },
    /// Cancelled at an iteration boundary after this many polls
    Cancelled { iterations: usize },
}

/// Stop thresholds; `f64::INFINITY` disables a criterion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeroThresholds {
    /// pT between polls
    pub d_bz: f64,
    /// pT between polls
    pub d_by: f64,
    /// pT between polls
    pub d_b0: f64,
    /// Absolute cell temperature error
    pub t_error: f64,
}

impl Default for ZeroThresholds {
    fn default() -> Self {
        Self {
            d_bz: f64::INFINITY,
            d_by: f64::INFINITY,
            d_b0: f64::INFINITY,
            t_error: f64::INFINITY,
        }
    }
}

impl ZeroThresholds {
    /// Same threshold on all three field deltas, temperature disabled
    pub fn fields(d: f64) -> Self {
        Self {
            d_bz: d,
            d_by: d,
            d_b0: d,
            ..Default::default()
        }
    }

    pub fn with_t_error(mut self, t_error: f64) -> Self {
        self.t_error = t_error;
        self
    }

    pub fn any_enabled(&self) -> bool {
        [self.d_bz, self.d_by, self.d_b0, self.t_error]
            .iter()
            .any(|t| t.is_finite())
    }
}

/// The readings zeroing watches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroReading {
    pub bz: f64,
    pub by: f64,
    pub b0: f64,
    pub t_error: f64,
}

impl ZeroReading {
    /// Status parameters a convergence step depends on
    pub const KEYS: [ParamKey; 4] = [
        ParamKey::Bz,
        ParamKey::By,
        ParamKey::B0,
        ParamKey::CellTempError,
    ];
}

impl From<&SensorParams> for ZeroReading {
    fn from(p: &SensorParams) -> Self {
        Self {
            bz: p.bz,
            by: p.by,
            b0: p.b0,
            t_error: p.cell_temp_error,
        }
    }
}

/// One poll's worth of zeroing progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroProgress {
    /// 1-based poll count
    pub iteration: usize,
    pub reading: ZeroReading,
    pub d_bz: f64,
    pub d_by: f64,
    pub d_b0: f64,
    pub converged: bool,
}

fn within(value: f64, threshold: f64) -> bool {
    threshold.is_infinite() || value.abs() <= threshold
}

/// Tracks successive readings against [`ZeroThresholds`]
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    thresholds: ZeroThresholds,
    previous: ZeroReading,
    iteration: usize,
}

impl ConvergenceTracker {
    pub fn new(thresholds: ZeroThresholds) -> Self {
        Self {
            thresholds,
            previous: ZeroReading {
                bz: f64::INFINITY,
                by: f64::INFINITY,
                b0: f64::INFINITY,
                t_error: f64::NAN,
            },
            iteration: 0,
        }
    }

    /// Record the reading taken before the first poll without counting it
    pub fn seed(&mut self, reading: ZeroReading) {
        self.previous = reading;
    }

    pub fn iterations(&self) -> usize {
        self.iteration
    }

    /// Compare a new reading with the previous one
    pub fn observe(&mut self, reading: ZeroReading) -> ZeroProgress {
        self.iteration += 1;
        let d_bz = reading.bz - self.previous.bz;
        let d_by = reading.by - self.previous.by;
        let d_b0 = reading.b0 - self.previous.b0;
        self.previous = reading;

        let t = &self.thresholds;
        let converged = t.any_enabled()
            && within(d_bz, t.d_bz)
            && within(d_by, t.d_by)
            && within(d_b0, t.d_b0)
            && within(reading.t_error, t.t_error);

        ZeroProgress {
            iteration: self.iteration,
            reading,
            d_bz,
            d_by,
            d_b0,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(bz: f64, by: f64, b0: f64, t_error: f64) -> ZeroReading {
        ZeroReading { bz, by, b0, t_error }
    }

    #[test]
    fn test_converges_on_small_deltas() {
        let mut tracker = ConvergenceTracker::new(ZeroThresholds::fields(1.0).with_t_error(0.01));
        tracker.seed(reading(100.0, 50.0, 20.0, 0.5));

        assert!(!tracker.observe(reading(40.0, 20.0, 8.0, 0.1)).converged);
        assert!(!tracker.observe(reading(38.0, 19.0, 7.5, 0.02)).converged);
        let p = tracker.observe(reading(37.5, 18.8, 7.4, 0.005));
        assert!(p.converged);
        assert_eq!(p.iteration, 3);
    }

    #[test]
    fn test_unseeded_first_poll_never_converges() {
        let mut tracker = ConvergenceTracker::new(ZeroThresholds::fields(1e9));
        assert!(!tracker.observe(reading(0.0, 0.0, 0.0, 0.0)).converged);
        assert!(tracker.observe(reading(0.0, 0.0, 0.0, 0.0)).converged);
    }

    #[test]
    fn test_all_disabled_never_converges() {
        let mut tracker = ConvergenceTracker::new(ZeroThresholds::default());
        tracker.seed(reading(0.0, 0.0, 0.0, 0.0));
        for _ in 0..100 {
            assert!(!tracker.observe(reading(0.0, 0.0, 0.0, 0.0)).converged);
        }
    }

    #[test]
    fn test_disabled_criterion_ignored() {
        let thresholds = ZeroThresholds {
            t_error: 0.01,
            ..Default::default()
        };
        let mut tracker = ConvergenceTracker::new(thresholds);
        tracker.seed(reading(0.0, 0.0, 0.0, 1.0));
        assert!(tracker.observe(reading(500.0, -300.0, f64::NAN, 0.001)).converged);
    }

    #[test]
    fn test_unknown_temperature_blocks() {
        let mut tracker = ConvergenceTracker::new(ZeroThresholds::default().with_t_error(0.01));
        tracker.seed(reading(0.0, 0.0, 0.0, 0.0));
        assert!(!tracker.observe(reading(0.0, 0.0, 0.0, f64::NAN)).converged);
    }
}
