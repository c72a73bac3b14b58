//! QZFM driver
//!
//! Owns the transport and the [`DeviceState`]. The protocol is strictly
//! half-duplex: every command is written before the read that answers it, and
//! responses are matched by program order alone. A `Qzfm` must therefore stay
//! on one thread, or behind one lock with no overlapping requests.

use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::acquisition::{AdcDecoder, FieldTrace, OffsetCollector, OffsetTable};
use crate::cancel::CancelToken;
use crate::config::DriverConfig;
use crate::device::{CalibrationReport, DeviceState, Message, StatusSnapshot};
use crate::protocol::framing::split_status;
use crate::protocol::transport::{read_chunk, write_bytes};
use crate::protocol::{
    AxisMode, Command, Gain, QzfmError, ReadAxis, Result, SerialTransport, StatusBatch, Transport,
    ZeroAxes,
};
use crate::zeroing::{ConvergenceTracker, ZeroOutcome, ZeroPhase, ZeroProgress, ZeroReading, ZeroThresholds};

/// Result of a calibration request
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    /// The sensor answered with a message
    Confirmed {
        message: String,
        report: Option<CalibrationReport>,
    },
    /// No message arrived in time; calibration status is unknown
    Unconfirmed,
}

/// Options for [`Qzfm::auto_start`]
#[derive(Debug, Clone, Copy)]
pub struct AutoStartOptions {
    /// Wait for laser lock and cell temperature lock
    pub block: bool,
    /// Field zero and calibrate once locked (implies `block`)
    pub zero_calibrate: bool,
    pub zero_axes: ZeroAxes,
    pub thresholds: ZeroThresholds,
}

impl Default for AutoStartOptions {
    fn default() -> Self {
        Self {
            block: true,
            zero_calibrate: true,
            zero_axes: ZeroAxes::Xyz,
            thresholds: ZeroThresholds::default().with_t_error(0.001),
        }
    }
}

/// What [`Qzfm::auto_start`] got through
#[derive(Debug, Clone, PartialEq)]
pub struct AutoStartReport {
    /// Laser and cell temperature were both locked when startup returned
    pub locked: bool,
    pub zero: Option<ZeroOutcome>,
    pub calibration: Option<CalibrationOutcome>,
}

/// Driver for one QZFM sensor
pub struct Qzfm<T: Transport> {
    transport: T,
    state: DeviceState,
    config: DriverConfig,
    adc: AdcDecoder,
}

impl Qzfm<SerialTransport> {
    /// Open the serial port named in `config` and attach a driver to it
    pub fn connect(config: DriverConfig) -> Result<Self> {
        config.validate()?;
        let transport = SerialTransport::open(&config.serial)?;
        Self::new(transport, config)
    }
}

impl<T: Transport> Qzfm<T> {
    /// Attach a driver to an already-open transport
    pub fn new(transport: T, config: DriverConfig) -> Result<Self> {
        config.validate()?;
        let adc = AdcDecoder::from_config(&config.adc);
        Ok(Self {
            transport,
            state: DeviceState::new(),
            config,
            adc,
        })
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.state.snapshot()
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Disable streaming and hand the transport back
    pub fn disconnect(mut self) -> Result<T> {
        self.set_data_stream(false)?;
        info!("disconnected");
        Ok(self.transport)
    }

    fn send(&mut self, command: Command) -> Result<()> {
        debug!("sending {:?} ({:#04x})", command, command.byte());
        write_bytes(&mut self.transport, &[command.byte()])?;
        Ok(())
    }

    fn read_status_lines(&mut self, clear_buffer: bool) -> Result<Vec<String>> {
        if clear_buffer {
            self.transport.clear_input_buffer()?;
        }
        let chunk = read_chunk(&mut self.transport, self.config.nbytes_status)?;
        Ok(split_status(&chunk))
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Read one status chunk and fold it into the device state.
    ///
    /// Leaves data-streaming mode first if it is active.
    pub fn update_status(&mut self, clear_buffer: bool) -> Result<()> {
        self.poll_status(clear_buffer).map(|_| ())
    }

    fn poll_status(&mut self, clear_buffer: bool) -> Result<StatusBatch> {
        if self.state.is_data_streaming {
            self.set_data_stream(false)?;
        }

        let lines = self.read_status_lines(clear_buffer)?;
        let batch = StatusBatch::from_lines(&lines);
        trace!(
            lines = lines.len(),
            codes = batch.codes.len(),
            messages = batch.messages.len(),
            "status update"
        );
        for text in &batch.messages {
            info!(message = %text, "device message");
        }
        self.state.apply_status(&batch, &self.config.status, Utc::now());
        Ok(batch)
    }

    /// Block until a `#` message arrives or `timeout` elapses.
    ///
    /// Returns `false` on timeout; that is not an error.
    pub fn wait_for_message(&mut self, timeout: Duration, clear_buffer: bool) -> Result<bool> {
        let started = Instant::now();
        loop {
            let lines = self.read_status_lines(clear_buffer)?;
            let received_at = Utc::now();
            let texts: Vec<String> = lines
                .iter()
                .filter_map(|line| line.strip_prefix('#'))
                .map(str::to_string)
                .collect();

            if !texts.is_empty() {
                for text in &texts {
                    info!(message = %text, "device message");
                }
                self.state.record_messages(texts, received_at);
                return Ok(true);
            }

            if started.elapsed() > timeout {
                warn!("no device message within {:?}", timeout);
                return Ok(false);
            }
        }
    }

    /// Poll status until `cancel` fires, reporting each update.
    ///
    /// Returns the number of polls made.
    pub fn monitor_status<F>(&mut self, cancel: &CancelToken, mut on_update: F) -> Result<usize>
    where
        F: FnMut(&StatusSnapshot),
    {
        self.update_status(true)?;
        on_update(&self.state.snapshot());
        let mut polls = 1;

        while !cancel.is_cancelled() {
            self.update_status(false)?;
            on_update(&self.state.snapshot());
            polls += 1;
        }
        Ok(polls)
    }

    /// LED1, refreshed
    pub fn laser_on(&mut self) -> Result<bool> {
        self.update_status(true)?;
        Ok(self.state.led.laser_on)
    }

    /// LED2, refreshed
    pub fn cell_temp_locked(&mut self) -> Result<bool> {
        self.update_status(true)?;
        Ok(self.state.led.cell_temp_lock)
    }

    /// LED3, refreshed
    pub fn laser_locked(&mut self) -> Result<bool> {
        self.update_status(true)?;
        Ok(self.state.led.laser_lock)
    }

    /// LED4, refreshed
    pub fn field_zeroed(&mut self) -> Result<bool> {
        self.update_status(true)?;
        Ok(self.state.led.field_zeroed)
    }

    /// LED5, refreshed
    pub fn is_master(&mut self) -> Result<bool> {
        self.update_status(true)?;
        Ok(self.state.led.is_master)
    }

    // ------------------------------------------------------------------
    // Modes
    // ------------------------------------------------------------------

    /// Switch between the digital data stream and status output
    pub fn set_data_stream(&mut self, on: bool) -> Result<()> {
        if on {
            self.send(Command::DataStreamOn)?;
            self.wait_for_message(self.config.message_timeout(), true)?;
            self.state.is_data_streaming = true;
        } else {
            self.send(Command::DataStreamOff)?;
            self.state.is_data_streaming = false;
        }
        Ok(())
    }

    /// Select the readback axis.
    ///
    /// A no-op only if this session already selected `axis`; the sensor may
    /// hold any axis from an earlier session, so the first call always writes.
    pub fn select_read_axis(&mut self, axis: ReadAxis) -> Result<()> {
        if self.state.read_axis == Some(axis) {
            return Ok(());
        }
        self.send(Command::SelectAxis(axis))?;
        self.state.read_axis = Some(axis);
        self.wait_for_message(self.config.message_timeout(), true)?;
        Ok(())
    }

    /// Change the field-sensitive axis. Invalidates zeroing and calibration.
    ///
    /// Triaxial sensors ignore this command.
    pub fn set_axis_mode(&mut self, mode: AxisMode) -> Result<()> {
        self.send(Command::SetAxisMode(mode))?;
        self.state.set_axis_mode(mode);
        self.update_status(true)
    }

    /// Set the analog output gain; returns whether the sensor confirmed it
    pub fn set_gain(&mut self, gain: Gain) -> Result<bool> {
        self.send(Command::SetGain(gain))?;
        self.state.gain = gain;
        self.wait_for_message(self.config.gain_timeout(), true)
    }

    /// Choose which axes field zeroing acts on
    pub fn set_zero_axes(&mut self, axes: ZeroAxes) -> Result<()> {
        self.send(Command::ZeroAxes(axes))?;
        self.state.is_xyz_zeroing = axes == ZeroAxes::Xyz;
        Ok(())
    }

    /// Set the internal coil fields to zero
    pub fn field_reset(&mut self) -> Result<()> {
        self.send(Command::FieldReset)?;
        self.wait_for_message(self.config.message_timeout(), true)?;
        self.state.sensor_par.bz = 0.0;
        self.state.sensor_par.by = 0.0;
        self.state.sensor_par.b0 = 0.0;
        self.state.invalidate_null();
        Ok(())
    }

    /// Reboot the microprocessor and reload firmware
    pub fn reboot(&mut self) -> Result<()> {
        self.send(Command::Reboot)?;
        self.update_status(true)?;
        self.state.reset_attributes();
        info!("sensor rebooted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Field zeroing and calibration
    // ------------------------------------------------------------------

    /// Run field zeroing until `thresholds` are met or `cancel` fires.
    ///
    /// Status reads that carry none of the field or temperature error
    /// readings are not counted as iterations.
    ///
    /// On convergence the zeroing is switched off, which holds the
    /// compensation field, and the field is marked zeroed. On cancellation
    /// zeroing is switched off but the field is not marked zeroed.
    pub fn field_zero<F>(
        &mut self,
        axes: ZeroAxes,
        thresholds: ZeroThresholds,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<ZeroOutcome>
    where
        F: FnMut(&ZeroProgress),
    {
        self.state.is_calibrated = false;
        self.set_zero_axes(axes)?;
        self.send(Command::ZeroOn)?;
        self.state.is_field_zeroed = false;
        self.state.zero_phase = ZeroPhase::Zeroing;
        info!(?axes, "field zeroing started");

        self.update_status(true)?;
        let mut tracker = ConvergenceTracker::new(thresholds);
        tracker.seed(ZeroReading::from(&self.state.sensor_par));

        loop {
            if cancel.is_cancelled() {
                self.send(Command::ZeroOff)?;
                self.state.zero_phase = ZeroPhase::Cancelled;
                self.update_status(true)?;
                info!(iterations = tracker.iterations(), "field zeroing cancelled");
                return Ok(ZeroOutcome::Cancelled {
                    iterations: tracker.iterations(),
                });
            }

            let batch = self.poll_status(true)?;
            if !batch.has_param(&ZeroReading::KEYS) {
                trace!("status read carried no zeroing readings");
                continue;
            }
            let progress = tracker.observe(ZeroReading::from(&self.state.sensor_par));
            debug!(
                iteration = progress.iteration,
                bz = progress.reading.bz,
                d_bz = progress.d_bz,
                d_by = progress.d_by,
                d_b0 = progress.d_b0,
                t_error = progress.reading.t_error,
                "zeroing"
            );
            on_progress(&progress);
            if progress.converged {
                break;
            }
        }

        self.send(Command::ZeroOff)?;
        self.state.is_field_zeroed = true;
        self.state.zero_phase = ZeroPhase::Converged;
        self.update_status(true)?;
        info!(iterations = tracker.iterations(), "field zeroing converged");
        Ok(ZeroOutcome::Converged {
            iterations: tracker.iterations(),
        })
    }

    /// Stop zeroing by hand and hold the current compensation field
    pub fn field_zero_off(&mut self) -> Result<()> {
        self.state.is_calibrated = false;
        self.send(Command::ZeroOff)?;
        self.state.is_field_zeroed = true;
        self.state.zero_phase = ZeroPhase::Idle;
        self.update_status(true)
    }

    /// Calibrate the field-to-voltage response against the internal reference.
    ///
    /// Requires LED4 (field zeroed), read fresh from the sensor. Waits for the
    /// result message up to the configured calibration timeout.
    pub fn calibrate(&mut self) -> Result<CalibrationOutcome> {
        self.update_status(true)?;
        if !self.state.led.field_zeroed {
            return Err(QzfmError::Precondition(
                "sensor must be field zeroed before calibration".to_string(),
            ));
        }

        self.send(Command::Calibrate)?;
        if !self.wait_for_message(self.config.calibration_timeout(), true)? {
            warn!("calibration not confirmed");
            return Ok(CalibrationOutcome::Unconfirmed);
        }

        self.state.is_calibrated = true;
        let message = self
            .state
            .last_message()
            .map(|m| m.text.clone())
            .unwrap_or_default();
        let report = CalibrationReport::parse(&message);
        info!(%message, "calibration confirmed");
        Ok(CalibrationOutcome::Confirmed { message, report })
    }

    /// Run the sensor's automated startup, optionally zeroing and calibrating.
    ///
    /// Cancelling while waiting for lock returns a report with `locked` false
    /// and nothing else done; cancelling during zeroing is reported in `zero`.
    pub fn auto_start<F>(
        &mut self,
        options: AutoStartOptions,
        cancel: &CancelToken,
        mut on_status: F,
    ) -> Result<AutoStartReport>
    where
        F: FnMut(&StatusSnapshot),
    {
        self.send(Command::AutoStart)?;
        self.update_status(true)?;
        on_status(&self.state.snapshot());

        let mut report = AutoStartReport {
            locked: self.is_locked(),
            zero: None,
            calibration: None,
        };

        if options.block || options.zero_calibrate {
            while !self.is_locked() {
                if cancel.is_cancelled() {
                    info!("auto start cancelled before lock");
                    return Ok(report);
                }
                self.update_status(false)?;
                on_status(&self.state.snapshot());
            }
            report.locked = true;
            info!("laser and cell temperature locked");
        }

        if !options.zero_calibrate {
            return Ok(report);
        }

        let zero = self.field_zero(options.zero_axes, options.thresholds, cancel, |_| {})?;
        report.zero = Some(zero);
        if let ZeroOutcome::Converged { .. } = zero {
            report.calibration = Some(self.calibrate()?);
        }
        Ok(report)
    }

    fn is_locked(&self) -> bool {
        self.state.led.laser_lock && self.state.led.cell_temp_lock
    }

    // ------------------------------------------------------------------
    // Acquisition
    // ------------------------------------------------------------------

    /// Read `npts` samples of `axis` from the high-rate data stream.
    ///
    /// Selects the axis and enables streaming if needed. A read that does not
    /// decode to exactly `npts` samples fails with [`QzfmError::Quota`] and
    /// must be retried as a whole.
    pub fn read_data(&mut self, npts: usize, axis: ReadAxis, clear_buffer: bool) -> Result<FieldTrace> {
        self.select_read_axis(axis)?;
        if !self.state.is_data_streaming {
            self.set_data_stream(true)?;
        }

        let nbytes = self.adc.read_size(npts);
        if clear_buffer {
            self.transport.clear_input_buffer()?;
        }

        let started = Utc::now();
        let chunk = read_chunk(&mut self.transport, nbytes)?;
        let finished = Utc::now();

        self.adc.decode_burst(&chunk, npts, axis, started, finished)
    }

    /// Read `seconds` worth of data at the configured stream rate
    pub fn read_data_for(&mut self, seconds: f64, axis: ReadAxis) -> Result<FieldTrace> {
        let npts = self.config.samples_for(seconds);
        self.read_data(npts, axis, true)
    }

    /// Stream `axis` into a rolling window of `window_s` seconds until cancelled.
    ///
    /// Reads that fail the sample quota are dropped and retried. Returns the
    /// final window.
    pub fn monitor_data<F>(
        &mut self,
        axis: ReadAxis,
        window_s: f64,
        cancel: &CancelToken,
        mut on_window: F,
    ) -> Result<FieldTrace>
    where
        F: FnMut(&FieldTrace),
    {
        let window = self.config.samples_for(window_s);
        let step = self.config.samples_for(0.1).max(1);

        let mut trace = self.read_data(window, axis, true)?;
        on_window(&trace);

        while !cancel.is_cancelled() {
            match self.read_data(step, axis, false) {
                Ok(chunk) => trace.extend_window(chunk, window),
                Err(QzfmError::Quota { expected, decoded }) => {
                    warn!(expected, decoded, "dropping misaligned data read");
                    continue;
                }
                Err(e) => return Err(e),
            }
            on_window(&trace);
        }
        Ok(trace)
    }

    /// Capture `npts` offset readings per axis from the zeroing status channel.
    ///
    /// Fails with [`QzfmError::Timeout`] if any axis is still short when the
    /// configured bound runs out, and with [`QzfmError::Cancelled`] if
    /// `cancel` fires between reads.
    pub fn read_offsets(
        &mut self,
        npts: usize,
        clear_buffer: bool,
        cancel: &CancelToken,
    ) -> Result<OffsetTable> {
        if self.state.is_data_streaming {
            self.set_data_stream(false)?;
        }

        let mut collector = OffsetCollector::new(npts, self.config.status);
        let limit = self.config.offset_timeout(npts);
        if clear_buffer {
            self.transport.clear_input_buffer()?;
        }

        let started = Utc::now();
        let clock = Instant::now();
        while !collector.is_complete() {
            if cancel.is_cancelled() {
                return Err(QzfmError::Cancelled);
            }
            if clock.elapsed() > limit {
                let (nx, ny, nz) = collector.counts();
                warn!(nx, ny, nz, npts, "offset capture timed out");
                return Err(QzfmError::Timeout {
                    what: "offset samples on every axis",
                    waited: limit,
                });
            }

            let chunk = read_chunk(&mut self.transport, self.config.nbytes_status)?;
            if collector.push(&chunk) > 0 {
                let (nx, ny, nz) = collector.counts();
                trace!(nx, ny, nz, npts, "offset samples");
            }
        }

        Ok(collector.finish(started, self.config.offset_rate_hz))
    }
}
