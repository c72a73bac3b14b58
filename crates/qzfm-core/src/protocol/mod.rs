//! QZFM Serial Protocol
//!
//! Single-byte commands go out; CRLF-terminated ASCII lines come back, either
//! as status codes or as the high-rate ADC data stream.

pub mod commands;
mod error;
pub mod framing;
pub mod serial;
pub mod status;
pub mod transport;

pub use commands::{AxisMode, Command, Gain, ReadAxis, ZeroAxes};
pub use error::{LineFault, QzfmError, Result};
pub use framing::{BoundedFraming, CarryFramer};
pub use serial::SerialTransport;
pub use status::{Code, ParamKey, StatusBatch, StatusScaling};
pub use transport::Transport;

/// Default baud rate for the sensor's USB-serial port
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default status read chunk in bytes
pub const DEFAULT_STATUS_CHUNK: usize = 1000;
