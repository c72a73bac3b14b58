//! # QZFM Core Library
//!
//! Protocol engine for QuSpin zero-field magnetometers (QZFM) over USB-serial.
//!
//! This library provides:
//! - Framing of status and data lines under bounded-chunk and continuous-carry reads
//! - Status line classification and device state tracking
//! - Decoding of the high-rate ADC data stream into field samples
//! - Reassembly of the per-axis offset channel seen during field zeroing
//! - A cancellable field-zero convergence loop and calibration
//!
//! ## Example
//!
//! ```rust,ignore
//! use qzfm_core::{CancelToken, DriverConfig, Qzfm, ReadAxis, ZeroAxes, ZeroThresholds};
//!
//! let mut config = DriverConfig::default();
//! config.serial.port_name = "/dev/ttyUSB0".into();
//! let mut sensor = Qzfm::connect(config)?;
//!
//! let cancel = CancelToken::new();
//! sensor.field_zero(ZeroAxes::Xyz, ZeroThresholds::fields(0.5), &cancel, |p| {
//!     println!("dBz = {:.3} pT", p.d_bz);
//! })?;
//! sensor.calibrate()?;
//!
//! let trace = sensor.read_data(200, ReadAxis::Z, true)?;
//! println!("{} samples, {} bad", trace.len(), trace.bad_samples());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod acquisition;
pub mod cancel;
pub mod config;
pub mod device;
pub mod driver;
pub mod protocol;
pub mod zeroing;

pub use acquisition::{FieldTrace, OffsetTable};
pub use cancel::CancelToken;
pub use config::DriverConfig;
pub use device::{DeviceState, StatusSnapshot};
pub use driver::{AutoStartOptions, AutoStartReport, CalibrationOutcome, Qzfm};
pub use protocol::{AxisMode, Gain, QzfmError, ReadAxis, Result, Transport, ZeroAxes};
pub use zeroing::{ZeroOutcome, ZeroPhase, ZeroProgress, ZeroThresholds};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
