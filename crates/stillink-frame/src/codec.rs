use std::borrow::Cow;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Line delimiter on every stillink link.
pub const DELIMITER: u8 = b'\n';

/// Default cap on a single line and on unterminated carry-over: 4 KiB.
///
/// Matches the console's receive buffer; telemetry lines are well under 100
/// bytes.
pub const DEFAULT_MAX_LINE: usize = 4 * 1024;

/// One line extracted from a byte stream, delimiter stripped, not yet
/// validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    line: Bytes,
}

impl RawFrame {
    /// Wrap a line. The caller guarantees it holds no delimiter.
    pub fn new(line: impl Into<Bytes>) -> Self {
        Self { line: line.into() }
    }

    /// Raw line bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.line
    }

    /// The line as UTF-8, if it is valid.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.line).ok()
    }

    /// The line as text with invalid bytes replaced, for logging.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.line)
    }

    /// Length without the delimiter.
    pub fn len(&self) -> usize {
        self.line.len()
    }

    /// True for the empty frame produced by back-to-back delimiters.
    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    /// Give up the frame and keep its bytes.
    pub fn into_bytes(self) -> Bytes {
        self.line
    }
}

impl From<&'static str> for RawFrame {
    fn from(line: &'static str) -> Self {
        Self::new(Bytes::from_static(line.as_bytes()))
    }
}

/// Append `line` and a delimiter to `dst`.
///
/// Lines must not contain the delimiter; a command never spans two frames.
pub fn encode_line(line: &[u8], dst: &mut BytesMut) -> Result<()> {
    if line.contains(&DELIMITER) {
        return Err(FrameError::EmbeddedDelimiter);
    }
    dst.reserve(line.len() + 1);
    dst.put_slice(line);
    dst.put_u8(DELIMITER);
    Ok(())
}

/// Split the first complete line off `src`.
///
/// Returns `Ok(None)` if `src` holds no delimiter yet and the unterminated
/// remainder is still within `max_line_len`. On success the line and its
/// delimiter are consumed from the buffer.
pub fn decode_line(src: &mut BytesMut, max_line_len: usize) -> Result<Option<RawFrame>> {
    let Some(pos) = src.iter().position(|&b| b == DELIMITER) else {
        if src.len() > max_line_len {
            return Err(FrameError::LineTooLong {
                size: src.len(),
                max: max_line_len,
            });
        }
        return Ok(None); // Need more data
    };

    if pos > max_line_len {
        return Err(FrameError::LineTooLong {
            size: pos,
            max: max_line_len,
        });
    }

    let line = src.split_to(pos).freeze();
    src.advance(1);
    Ok(Some(RawFrame { line }))
}

/// Configuration for line framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum line length and carry-over size in bytes. Default: 4 KiB.
    pub max_line_len: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
