//! Numeric acquisition
//!
//! Decoders for the two numeric channels: the high-rate ADC data stream and
//! the low-rate per-axis offset readings seen during field zeroing.

mod adc;
mod offsets;

pub use adc::{interpolate_times, AdcDecoder, FieldTrace};
pub use offsets::{OffsetCollector, OffsetTable};
