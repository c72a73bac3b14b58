#![allow(dead_code)]

use qzfm_core::{DriverConfig, Qzfm, Transport};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};

/// Mock sensor port.
///
/// Each scripted chunk is served as one physical read: the read after a chunk
/// is exhausted times out. Clearing the input buffer is recorded but keeps the
/// script, standing in for the sensor emitting fresh output after the clear.
pub struct MockSerial {
    pub sent: Vec<u8>,
    pub chunks: VecDeque<Vec<u8>>,
    pub clears: usize,
    pub fail_on_send: bool,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            chunks: VecDeque::new(),
            clears: 0,
            fail_on_send: false,
        }
    }

    pub fn with_chunks<I: IntoIterator<Item = Vec<u8>>>(chunks: I) -> Self {
        let mut mock = Self::new();
        mock.chunks.extend(chunks);
        mock
    }

    pub fn push(&mut self, chunk: Vec<u8>) {
        self.chunks.push_back(chunk);
    }

    /// How many times `byte` was written
    pub fn count(&self, byte: u8) -> usize {
        self.sent.iter().filter(|&&b| b == byte).count()
    }
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(front) = self.chunks.front_mut() else {
            return Ok(0);
        };
        if front.is_empty() {
            self.chunks.pop_front();
            return Err(io::Error::new(ErrorKind::TimedOut, "read timed out"));
        }
        let n = buf.len().min(front.len());
        buf[..n].copy_from_slice(&front[..n]);
        front.drain(..n);
        Ok(n)
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_on_send {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "serial write failed"));
        }
        self.sent.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockSerial {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.clears += 1;
        Ok(())
    }
}

/// A status read containing exactly `lines` once boundary fragments are dropped
pub fn status_chunk(lines: &[&str]) -> Vec<u8> {
    let mut out = b"00\r\n".to_vec();
    for line in lines {
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"|");
    out
}

/// A data-stream read containing exactly `words` between the boundary fragments
pub fn data_chunk(words: &[&str]) -> Vec<u8> {
    let mut out = b"608\r\n".to_vec();
    for word in words {
        out.push(b'!');
        out.extend_from_slice(word.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"!83");
    out
}

/// Config with short timeouts so unconfirmed waits end quickly
pub fn fast_config() -> DriverConfig {
    DriverConfig {
        message_timeout_ms: 10,
        gain_timeout_ms: 10,
        calibration_timeout_ms: 20,
        offset_timeout_factor: 0.01,
        offset_timeout_slack_ms: 30,
        ..Default::default()
    }
}

pub fn driver(mock: MockSerial) -> Qzfm<MockSerial> {
    init_logging();
    Qzfm::new(mock, fast_config()).expect("valid config")
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
