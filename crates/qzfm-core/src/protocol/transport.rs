//! Byte transport abstraction
//!
//! The driver only needs three things from a connection: write bytes, read a
//! chunk of up to `n` bytes, and discard whatever is waiting in the input buffer.

use std::io::{self, ErrorKind, Read, Write};

/// A duplex byte connection to the sensor
pub trait Transport: Read + Write + Send {
    /// Discard bytes received but not yet read
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

/// Read up to `nbytes`, stopping early when the transport times out.
///
/// Mirrors a blocking serial `read(n)`: a timeout or end of stream ends the
/// chunk and whatever arrived so far is returned.
pub fn read_chunk<T: Transport + ?Sized>(transport: &mut T, nbytes: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; nbytes];
    let mut filled = 0;

    while filled < nbytes {
        match transport.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
            Err(e) => return Err(e),
        }
    }

    buf.truncate(filled);
    Ok(buf)
}

/// Write a command sequence and flush it
pub fn write_bytes<T: Transport + ?Sized>(transport: &mut T, data: &[u8]) -> io::Result<()> {
    transport.write_all(data)?;
    transport.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Chunks {
        chunks: VecDeque<Vec<u8>>,
    }

    impl Read for Chunks {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(front) = self.chunks.front_mut() else {
                return Ok(0);
            };
            if front.is_empty() {
                self.chunks.pop_front();
                return Err(io::Error::new(ErrorKind::TimedOut, "timeout"));
            }
            let n = buf.len().min(front.len());
            buf[..n].copy_from_slice(&front[..n]);
            front.drain(..n);
            Ok(n)
        }
    }

    impl Write for Chunks {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for Chunks {
        fn clear_input_buffer(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_read_chunk_stops_on_timeout() {
        let mut t = Chunks {
            chunks: VecDeque::from(vec![b"abc".to_vec(), b"def".to_vec()]),
        };
        assert_eq!(read_chunk(&mut t, 10).unwrap(), b"abc");
        assert_eq!(read_chunk(&mut t, 2).unwrap(), b"de");
        assert_eq!(read_chunk(&mut t, 2).unwrap(), b"f");
        assert!(read_chunk(&mut t, 2).unwrap().is_empty());
    }
}
