//! `tokio_util::codec` adapter for consoles driven by an async runtime.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_line, encode_line, FrameConfig, RawFrame};
use crate::error::{FrameError, Result};

/// Line codec for `FramedRead`/`FramedWrite`.
///
/// Same framing rules as [`crate::FrameReader`]: capped carry-over, empty
/// lines passed through, trailing partial data never emitted.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line_len: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            max_line_len: config.max_line_len,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = RawFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        decode_line(src, self.max_line_len)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                src.clear();
                Err(FrameError::ConnectionClosed)
            }
        }
    }
}

impl<'a> Encoder<&'a [u8]> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, line: &'a [u8], dst: &mut BytesMut) -> Result<()> {
        if line.len() > self.max_line_len {
            return Err(FrameError::LineTooLong {
                size: line.len(),
                max: self.max_line_len,
            });
        }
        encode_line(line, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_lines_incrementally() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"BEAT\n24.5,25"[..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.as_str(), Some("BEAT"));
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b".0\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.as_str(), Some("24.5,25.0"));
    }

    #[test]
    fn eof_with_partial_line_is_closed() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"partial"[..]);
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn encodes_with_delimiter() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(&b"CONN"[..], &mut buf).unwrap();
        assert_eq!(&buf[..], b"CONN\n");
    }
}
