use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_line, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes complete delimited lines to any `Write` stream.
pub struct LineWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> LineWriter<T> {
    /// Create a new line writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new line writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write `line` followed by the delimiter (blocking), then flush.
    pub fn send(&mut self, line: &[u8]) -> Result<()> {
        if line.len() > self.config.max_line_len {
            return Err(FrameError::LineTooLong {
                size: line.len(),
                max: self.config.max_line_len,
            });
        }

        self.buf.clear();
        encode_line(line, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current line writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::reader::FrameReader;

    #[test]
    fn writes_delimited_line() {
        let mut writer = LineWriter::new(Vec::new());
        writer.send(b"INFO&setpoint:26,P:28.00,I:1.00,D:18.00").unwrap();
        assert_eq!(
            writer.get_ref().as_slice(),
            b"INFO&setpoint:26,P:28.00,I:1.00,D:18.00\n"
        );
    }

    #[test]
    fn writer_output_reads_back_as_frames() {
        let mut writer = LineWriter::new(Vec::new());
        writer.send(b"CONN").unwrap();
        writer.send(b"BEAT").unwrap();

        let mut reader = FrameReader::new();
        let mut src = Cursor::new(writer.into_inner());
        let frames = reader.read_from(&mut src).unwrap();
        let lines: Vec<_> = frames.iter().filter_map(|f| f.as_str()).collect();
        assert_eq!(lines, vec!["CONN", "BEAT"]);
    }

    #[test]
    fn rejects_oversized_line() {
        let cfg = FrameConfig {
            max_line_len: 4,
            ..FrameConfig::default()
        };
        let mut writer = LineWriter::with_config(Vec::new(), cfg);
        let err = writer.send(b"too long").unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { size: 8, max: 4 }));
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn partial_writes_are_completed() {
        let mut writer = LineWriter::new(TrickleWriter::default());
        writer.send(b"CONN").unwrap();
        assert_eq!(writer.get_ref().written, b"CONN\n");
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        let mut writer = LineWriter::new(ClosedWriter);
        let err = writer.send(b"CONN").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn broken_pipe_surfaces_as_io() {
        let mut writer = LineWriter::new(BrokenWriter);
        let err = writer.send(b"CONN").unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[derive(Default)]
    struct TrickleWriter {
        written: Vec<u8>,
        interrupted: bool,
    }

    impl Write for TrickleWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.written.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ClosedWriter;

    impl Write for ClosedWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
