//! Delimiter-based re-framing of the serial byte stream.
//!
//! The scale may write one frame across several reads, so bytes accumulate
//! here until a delimiter arrives. Only delimiter consumption advances the
//! buffer; a read boundary never does.

use tracing::warn;

/// Default upper bound on buffered bytes without a delimiter.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024;

/// Bytes of one frame, delimiter stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub bytes: Vec<u8>,
}

impl RawFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Splits a byte stream on a single delimiter byte.
#[derive(Debug)]
pub struct DelimiterFramer {
    buffer: Vec<u8>,
    delimiter: u8,
    max_length: usize,
    /// Set once the current frame outgrew `max_length`; cleared by the next delimiter
    overflowed: bool,
}

impl DelimiterFramer {
    pub fn new(delimiter: u8, max_length: usize) -> Self {
        Self {
            buffer: Vec::new(),
            delimiter,
            max_length: max_length.max(1),
            overflowed: false,
        }
    }

    /// Append `data` and return every frame it completes, in arrival order.
    ///
    /// An empty frame (two delimiters in a row) is returned as-is and left to
    /// the decoder to reject. A frame body longer than `max_length` is dropped
    /// whole: bytes are discarded up to and including its delimiter and no
    /// frame is produced for it.
    pub fn feed(&mut self, data: &[u8]) -> Vec<RawFrame> {
        let delimiter = self.delimiter;
        let mut frames = Vec::new();

        for chunk in data.split_inclusive(|&b| b == delimiter) {
            match chunk.split_last() {
                Some((&last, body)) if last == delimiter => {
                    self.extend(body);
                    if self.overflowed {
                        self.overflowed = false;
                    } else {
                        frames.push(RawFrame::new(std::mem::take(&mut self.buffer)));
                    }
                }
                _ => self.extend(chunk),
            }
        }

        frames
    }

    fn extend(&mut self, bytes: &[u8]) {
        if self.overflowed {
            return;
        }
        if self.buffer.len() + bytes.len() > self.max_length {
            warn!(
                max_length = self.max_length,
                "no delimiter within maximum frame length, discarding frame"
            );
            self.buffer.clear();
            self.overflowed = true;
            return;
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame, e.g. after the port was reopened.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }
}
