use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::codec::{decode_line, FrameConfig, RawFrame};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Bytes requested from the stream per read.
pub const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Splits a chunked byte stream into complete lines.
///
/// Unterminated trailing bytes are carried over to the next call and never
/// emitted on their own.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    config: FrameConfig,
    overflow: Option<FrameError>,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Create a new frame reader with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY.min(config.max_line_len + 1)),
            config,
            overflow: None,
        }
    }

    /// Append `chunk` and return every line it completes, in order.
    ///
    /// An empty chunk yields nothing. Back-to-back delimiters yield empty
    /// frames; callers filter them. If the carry-over exceeds
    /// [`FrameConfig::max_line_len`] the buffer is dropped and
    /// [`FrameError::LineTooLong`] is returned. Lines completed earlier in the
    /// same chunk are returned first; the error then comes from the next
    /// call, which still buffers its own chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<RawFrame>> {
        if let Some(err) = self.overflow.take() {
            self.buf.extend_from_slice(chunk);
            return Err(err);
        }
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            match decode_line(&mut self.buf, self.config.max_line_len) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(err) => {
                    debug!(
                        pending = self.buf.len(),
                        max = self.config.max_line_len,
                        complete = frames.len(),
                        "dropping oversized carry-over"
                    );
                    self.buf.clear();
                    if frames.is_empty() {
                        return Err(err);
                    }
                    self.overflow = Some(err);
                    break;
                }
            }
        }

        trace!(frames = frames.len(), pending = self.buf.len(), "fed chunk");
        Ok(frames)
    }

    /// True when an overflow is waiting to be reported by the next call.
    pub fn has_pending_overflow(&self) -> bool {
        self.overflow.is_some()
    }

    /// Perform one read from `src` and feed what arrived.
    ///
    /// EOF is [`FrameError::ConnectionClosed`]. Timeouts are returned as
    /// [`FrameError::Io`] untouched so the caller can tell idle from dead.
    pub fn read_from<R: Read + ?Sized>(&mut self, src: &mut R) -> Result<Vec<RawFrame>> {
        if let Some(err) = self.overflow.take() {
            return Err(err);
        }
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let read = loop {
            match src.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        };

        if read == 0 {
            return Err(FrameError::ConnectionClosed);
        }

        self.feed(&chunk[..read])
    }

    /// Number of unterminated bytes currently carried over.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Discard the carry-over, e.g. when a session is closed.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.overflow = None;
    }

    /// Update the line cap for subsequent calls.
    pub fn set_max_line_len(&mut self, max_line_len: usize) {
        self.config.max_line_len = max_line_len;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const STREAM: &[u8] = b"24.5,25.0,120.0,HEATING,28.00,1.00,18.00\nBEAT\n\n\
24.6,25.0,121.0,HEATING,28.00,1.00,18.00\n24.7,25.0,122.0,IDLE,28.00,1.00,18.00\npartial-tail";

    fn rejoin(frames: &[RawFrame]) -> Vec<u8> {
        let mut out = Vec::new();
        for frame in frames {
            out.extend_from_slice(frame.as_bytes());
            out.push(b'\n');
        }
        out
    }

    fn undelimited_prefix(input: &[u8]) -> &[u8] {
        match input.iter().rposition(|&b| b == b'\n') {
            Some(pos) => &input[..=pos],
            None => &[],
        }
    }

    #[test]
    fn empty_chunk_yields_nothing() {
        let mut reader = FrameReader::new();
        assert!(reader.feed(b"").unwrap().is_empty());
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn delimiters_only_yield_empty_frames() {
        let mut reader = FrameReader::new();
        let frames = reader.feed(b"\n\n\n").unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(RawFrame::is_empty));
    }

    #[test]
    fn partial_line_is_carried_over() {
        let mut reader = FrameReader::new();
        assert!(reader.feed(b"24.5,25.0,12").unwrap().is_empty());
        assert_eq!(reader.pending(), 12);

        let frames = reader.feed(b"0.0,HEATING,28.00,1.00,18.00\nBE").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].as_str(),
            Some("24.5,25.0,120.0,HEATING,28.00,1.00,18.00")
        );
        assert_eq!(reader.pending(), 2);

        let frames = reader.feed(b"AT\n").unwrap();
        assert_eq!(frames[0].as_str(), Some("BEAT"));
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn chunk_boundaries_never_change_extracted_lines() {
        let expected = undelimited_prefix(STREAM);

        for size in 1..=STREAM.len() {
            let mut reader = FrameReader::new();
            let mut frames = Vec::new();
            for chunk in STREAM.chunks(size) {
                frames.extend(reader.feed(chunk).unwrap());
            }
            assert_eq!(rejoin(&frames), expected, "chunk size {size}");
            assert_eq!(reader.pending(), b"partial-tail".len());
        }
    }

    #[test]
    fn uneven_chunk_boundaries_never_change_extracted_lines() {
        let expected = undelimited_prefix(STREAM);
        // Deterministic ragged splits: 1, 2, 3, ... bytes cycling with an offset.
        for offset in 0..7 {
            let mut reader = FrameReader::new();
            let mut frames = Vec::new();
            let mut pos = 0;
            let mut step = 1 + offset;
            while pos < STREAM.len() {
                let end = (pos + step).min(STREAM.len());
                frames.extend(reader.feed(&STREAM[pos..end]).unwrap());
                pos = end;
                step = step % 11 + 1;
            }
            assert_eq!(rejoin(&frames), expected, "offset {offset}");
        }
    }

    #[test]
    fn unterminated_stream_hits_cap() {
        let mut reader = FrameReader::with_config(FrameConfig {
            max_line_len: 32,
            ..FrameConfig::default()
        });
        assert!(reader.feed(&[b'a'; 20]).unwrap().is_empty());
        let err = reader.feed(&[b'a'; 20]).unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { size: 40, max: 32 }));
        assert_eq!(reader.pending(), 0, "overflowed carry-over is dropped");
    }

    #[test]
    fn lines_before_an_oversized_tail_are_delivered_first() {
        let mut reader = FrameReader::with_config(FrameConfig {
            max_line_len: 16,
            ..FrameConfig::default()
        });
        let mut chunk = b"BEAT\n".to_vec();
        chunk.extend_from_slice(&[b'x'; 20]);

        let frames = reader.feed(&chunk).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_str(), Some("BEAT"));
        assert!(reader.has_pending_overflow());
        assert_eq!(reader.pending(), 0);

        let err = reader.feed(b"CONN\n").unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { size: 20, max: 16 }));
        assert!(!reader.has_pending_overflow());
        let frames = reader.feed(b"BEAT\n").unwrap();
        let lines: Vec<_> = frames.iter().filter_map(RawFrame::as_str).collect();
        assert_eq!(lines, vec!["CONN", "BEAT"]);
    }

    #[test]
    fn read_from_reports_deferred_overflow_before_reading() {
        let mut reader = FrameReader::with_config(FrameConfig {
            max_line_len: 16,
            ..FrameConfig::default()
        });
        let mut data = b"BEAT\n".to_vec();
        data.extend_from_slice(&[b'x'; 20]);
        let mut src = Cursor::new(data);

        assert_eq!(reader.read_from(&mut src).unwrap().len(), 1);
        let err = reader.read_from(&mut src).unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { .. }));
        assert!(matches!(
            reader.read_from(&mut src).unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn read_from_feeds_one_chunk() {
        let mut reader = FrameReader::new();
        let mut src = Cursor::new(b"BEAT\nCONN\n".to_vec());
        let frames = reader.read_from(&mut src).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].as_str(), Some("CONN"));
    }

    #[test]
    fn read_from_reports_eof() {
        let mut reader = FrameReader::new();
        let mut src = Cursor::new(Vec::<u8>::new());
        let err = reader.read_from(&mut src).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn read_from_passes_timeouts_through() {
        let mut reader = FrameReader::new();
        let mut src = TimeoutThenData {
            timed_out: false,
            bytes: b"BEAT\n".to_vec(),
        };
        let err = reader.read_from(&mut src).unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::WouldBlock));

        let frames = reader.read_from(&mut src).unwrap();
        assert_eq!(frames[0].as_str(), Some("BEAT"));
    }

    #[test]
    fn read_from_retries_interrupted() {
        let mut reader = FrameReader::new();
        let mut src = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(b"BEAT\n".to_vec()),
        };
        let frames = reader.read_from(&mut src).unwrap();
        assert_eq!(frames.len(), 1);
    }

    struct TimeoutThenData {
        timed_out: bool,
        bytes: Vec<u8>,
    }

    impl Read for TimeoutThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.timed_out {
                self.timed_out = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            let n = self.bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[..n]);
            self.bytes.drain(..n);
            Ok(n)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
