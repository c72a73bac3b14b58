//! High-rate ADC stream decoding
//!
//! In data-streaming mode the sensor emits one fixed-width word per sample,
//! `!` followed by a 24-bit reading in decimal, terminated by CRLF. A read of
//! `npts` samples is sized to hold `npts + 2` words so that both boundary
//! fragments can be dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AdcConfig;
use crate::protocol::{BoundedFraming, LineFault, QzfmError, ReadAxis, Result};

/// Timestamped field samples from one axis
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldTrace {
    pub axis: ReadAxis,
    pub time: Vec<DateTime<Utc>>,
    /// pT; NaN where the word was corrupt
    pub field: Vec<f64>,
}

impl FieldTrace {
    pub fn new(axis: ReadAxis) -> Self {
        Self {
            axis,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.field.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field.is_empty()
    }

    /// Number of samples that failed to decode
    pub fn bad_samples(&self) -> usize {
        self.field.iter().filter(|v| v.is_nan()).count()
    }

    /// Append `other` and keep only the newest `window` samples
    pub fn extend_window(&mut self, other: FieldTrace, window: usize) {
        self.time.extend(other.time);
        self.field.extend(other.field);
        let excess = self.field.len().saturating_sub(window);
        self.time.drain(..excess);
        self.field.drain(..excess);
    }
}

/// Converts raw ADC words to field values
#[derive(Debug, Clone, Copy)]
pub struct AdcDecoder {
    word_width: usize,
    midpoint: i64,
    scale: f64,
}

impl AdcDecoder {
    pub fn from_config(config: &AdcConfig) -> Self {
        Self {
            word_width: config.word_width,
            midpoint: config.midpoint,
            scale: config.scale,
        }
    }

    /// Digits per word once the `!` marker is stripped
    pub fn digits(&self) -> usize {
        self.word_width.saturating_sub(1)
    }

    /// Bytes to request for `npts` samples: CRLF per word, two boundary words
    pub fn read_size(&self, npts: usize) -> usize {
        (self.word_width + 2) * (npts + 2)
    }

    /// Decode one word to pT
    pub fn decode_word(&self, word: &str) -> std::result::Result<f64, LineFault> {
        let actual = word.chars().count();
        if actual != self.digits() {
            return Err(LineFault::WordLength {
                expected: self.digits(),
                actual,
            });
        }
        let raw: i64 = word
            .parse()
            .map_err(|_| LineFault::NonNumeric(word.to_string()))?;
        Ok((raw - self.midpoint) as f64 * self.scale)
    }

    /// Decode one bounded read of `npts` samples.
    ///
    /// Corrupt words keep their slot as NaN. Sample times are spread evenly
    /// over the wall-clock span of the read. Fewer than `npts` words means the
    /// byte-to-sample alignment broke and the whole read is rejected.
    pub fn decode_burst(
        &self,
        chunk: &[u8],
        npts: usize,
        axis: ReadAxis,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
    ) -> Result<FieldTrace> {
        let mut words = BoundedFraming::DATA.split(chunk);
        words.truncate(npts);
        if words.len() != npts {
            return Err(QzfmError::Quota {
                expected: npts,
                decoded: words.len(),
            });
        }

        let field: Vec<f64> = words
            .iter()
            .map(|word| {
                self.decode_word(word).unwrap_or_else(|fault| {
                    tracing::trace!("bad data word: {fault}");
                    f64::NAN
                })
            })
            .collect();

        let trace = FieldTrace {
            axis,
            time: interpolate_times(started, finished, npts),
            field,
        };
        let bad = trace.bad_samples();
        if bad > 0 {
            tracing::debug!(bad, npts, "data words marked NaN");
        }
        Ok(trace)
    }
}

/// `n` timestamps starting at `started`, spaced `(finished - started) / n`
pub fn interpolate_times(
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
    n: usize,
) -> Vec<DateTime<Utc>> {
    if n == 0 {
        return Vec::new();
    }
    let span_ns = (finished - started).num_nanoseconds().unwrap_or(0) as f64;
    let step_ns = span_ns / n as f64;
    (0..n)
        .map(|i| started + chrono::Duration::nanoseconds((step_ns * i as f64) as i64))
        .collect()
}
