//! Offset-capture channel
//!
//! While field zeroing runs, the status channel carries the raw compensation
//! readings for all three axes (`~09` x, `~08` y, `~07` z) at roughly 7.5 Hz.
//! The axes advance independently and a line can straddle two reads, so the
//! stream is reassembled with a [`CarryFramer`] and each axis is counted on its
//! own until every one has `npts` samples.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::{status, CarryFramer, Code, ParamKey, ReadAxis, StatusScaling};

/// Per-axis offset samples with nominal timestamps
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OffsetTable {
    pub time: Vec<DateTime<Utc>>,
    /// B0 (pT)
    pub x: Vec<f64>,
    /// By (pT)
    pub y: Vec<f64>,
    /// Bz (pT)
    pub z: Vec<f64>,
}

impl OffsetTable {
    pub fn axis(&self, axis: ReadAxis) -> &[f64] {
        match axis {
            ReadAxis::X => &self.x,
            ReadAxis::Y => &self.y,
            ReadAxis::Z => &self.z,
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Accumulates offset samples across arbitrarily split reads
#[derive(Debug)]
pub struct OffsetCollector {
    npts: usize,
    scaling: StatusScaling,
    framer: CarryFramer,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl OffsetCollector {
    pub fn new(npts: usize, scaling: StatusScaling) -> Self {
        Self {
            npts,
            scaling,
            framer: CarryFramer::new(),
            x: Vec::with_capacity(npts * 2),
            y: Vec::with_capacity(npts * 2),
            z: Vec::with_capacity(npts * 2),
        }
    }

    /// Feed one raw read; returns how many samples it added across all axes.
    pub fn push(&mut self, chunk: &[u8]) -> usize {
        let mut added = 0;
        for line in self.framer.push(chunk) {
            let Ok(Code::Param { key, raw }) = status::classify(&line) else {
                continue;
            };
            let value = self.scaling.convert(key, raw);
            let column = match key {
                ParamKey::B0 => &mut self.x,
                ParamKey::By => &mut self.y,
                ParamKey::Bz => &mut self.z,
                ParamKey::CellTempError | ParamKey::CellTempVoltage => continue,
            };
            column.push(value);
            added += 1;
        }
        added
    }

    /// Samples collected so far as (x, y, z)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.x.len(), self.y.len(), self.z.len())
    }

    /// True once every axis has at least `npts` samples
    pub fn is_complete(&self) -> bool {
        let (nx, ny, nz) = self.counts();
        nx >= self.npts && ny >= self.npts && nz >= self.npts
    }

    /// Trim every axis to `npts` and stamp samples at the nominal cadence.
    pub fn finish(mut self, started: DateTime<Utc>, rate_hz: f64) -> OffsetTable {
        self.x.truncate(self.npts);
        self.y.truncate(self.npts);
        self.z.truncate(self.npts);

        let step_ns = 1e9 / rate_hz;
        let n = self.x.len().max(self.y.len()).max(self.z.len());
        let time = (0..n)
            .map(|i| started + chrono::Duration::nanoseconds((step_ns * i as f64) as i64))
            .collect();

        OffsetTable {
            time,
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_counts_axes_independently() {
        let mut collector = OffsetCollector::new(2, StatusScaling::default());
        let added = collector.push(b"ment\r\n~07032770\r\n~07032771\r\n~08032760\r\n|11\r\n~0903");
        assert_eq!(added, 3);
        assert_eq!(collector.counts(), (0, 1, 2));
        assert!(!collector.is_complete());

        collector.push(b"2768\r\n~09032769\r\n~08032761\r\n");
        assert!(collector.is_complete());
    }

    #[test]
    fn test_finish_trims_and_stamps() {
        let mut collector = OffsetCollector::new(1, StatusScaling::default());
        collector.push(b"x\n~07032770\n~07032780\n~08032768\n~09032767\n");
        let t0 = Utc.timestamp_opt(0, 0).unwrap();
        let table = collector.finish(t0, 7.5);
        assert_eq!(table.z, vec![2.0]);
        assert_eq!(table.y, vec![0.0]);
        assert_eq!(table.x, vec![-1.0]);
        assert_eq!(table.time, vec![t0]);
    }

    #[test]
    fn test_ignores_bad_payloads() {
        let mut collector = OffsetCollector::new(1, StatusScaling::default());
        assert_eq!(collector.push(b"x\n~0703a768\n~04008388608\n#msg\n"), 0);
    }
}
