//! Line framing
//!
//! Two contracts are used depending on the call site:
//!
//! - Bounded-chunk framing decodes one read on its own and throws away the first
//!   and last lines, which are assumed to be fragments cut by the read boundary.
//! - Continuous-carry framing keeps the trailing partial line between reads so
//!   that no complete line is ever lost.

/// How a bounded chunk is cleaned before it is split into lines
#[derive(Debug, Clone, Copy)]
pub struct BoundedFraming {
    /// Characters removed anywhere in the chunk before splitting
    pub strip: &'static [char],
    /// Trim surrounding whitespace before splitting
    pub trim: bool,
}

impl BoundedFraming {
    /// Status channel: CRLF terminated lines
    pub const STATUS: BoundedFraming = BoundedFraming {
        strip: &['\0', '\r'],
        trim: false,
    };

    /// High-rate data stream: `!`-prefixed words, CRLF terminated
    pub const DATA: BoundedFraming = BoundedFraming {
        strip: &['\0', '\r', '!'],
        trim: true,
    };

    /// Split one chunk into the complete lines it contains.
    pub fn split(&self, chunk: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(chunk);
        let cleaned: String = text.chars().filter(|c| !self.strip.contains(c)).collect();
        let body = if self.trim {
            cleaned.trim()
        } else {
            cleaned.as_str()
        };

        let parts: Vec<&str> = body.split('\n').collect();
        if parts.len() <= 2 {
            return Vec::new();
        }
        parts[1..parts.len() - 1]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Split a status chunk with the status framing profile
pub fn split_status(chunk: &[u8]) -> Vec<String> {
    BoundedFraming::STATUS.split(chunk)
}

/// Line framer that carries the trailing partial line across reads.
///
/// The alignment of the very first byte is unknown, so the first complete line
/// ever produced is dropped once. After that every terminated line is emitted.
#[derive(Debug, Default)]
pub struct CarryFramer {
    leftover: Vec<u8>,
    synced: bool,
}

impl CarryFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes, oldest first.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.leftover.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        for (i, &b) in self.leftover.iter().enumerate() {
            if b == b'\n' {
                lines.push(clean_line(&self.leftover[start..i]));
                start = i + 1;
            }
        }
        self.leftover.drain(..start);

        if !self.synced && !lines.is_empty() {
            lines.remove(0);
            self.synced = true;
        }
        lines
    }

    /// Bytes held back waiting for a terminator
    pub fn leftover(&self) -> &[u8] {
        &self.leftover
    }
}

fn clean_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|&c| c != '\0' && c != '\r')
        .collect()
}
