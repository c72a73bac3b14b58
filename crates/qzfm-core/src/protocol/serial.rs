//! Serial port transport
//!
//! Opens a USB-serial port with the fixed QZFM line settings and adapts it to
//! [`Transport`]. Finding the right port is left to the caller.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::transport::Transport;
use crate::config::SerialConfig;
use crate::protocol::Result;

/// Serial port wrapper implementing [`Transport`]
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    /// Open and configure `config.port_name`
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let mut port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()?;
        configure_port(port.as_mut())?;
        tracing::info!(port = %config.port_name, baud = config.baud_rate, "opened serial port");
        Ok(Self::new(port))
    }

    /// Name of the underlying port, if known
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

/// Standard 8N1, no flow control
pub fn configure_port(port: &mut dyn SerialPort) -> Result<()> {
    port.set_data_bits(serialport::DataBits::Eight)?;
    port.set_parity(serialport::Parity::None)?;
    port.set_stop_bits(serialport::StopBits::One)?;
    port.set_flow_control(serialport::FlowControl::None)?;
    Ok(())
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialTransport {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }
}
