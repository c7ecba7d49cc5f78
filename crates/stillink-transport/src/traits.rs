use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

/// Smallest read timeout applied to a socket.
///
/// `TcpStream::set_read_timeout(Some(Duration::ZERO))` is rejected by the OS
/// layer, so zero is rounded up to this value.
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// A bidirectional byte stream the session layer can drive with bounded reads.
///
/// Implemented by [`LinkStream`] for TCP. Tests implement it over scripted
/// buffers to simulate partial reads, timeouts and resets.
pub trait LinkIo: Read + Write + Send {
    /// Bound the next blocking reads. `None` blocks indefinitely.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Bound the next blocking writes. `None` blocks indefinitely.
    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Close both directions of the stream.
    fn shutdown(&mut self) -> io::Result<()>;

    /// Human-readable peer description for logs and snapshots.
    fn peer_label(&self) -> String {
        "unknown".to_string()
    }
}

/// Returns true if the error is a read/write timeout rather than a failure.
///
/// Depending on platform a socket timeout surfaces as either `WouldBlock` or
/// `TimedOut`.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// A connected TCP link to the rig.
pub struct LinkStream {
    inner: TcpStream,
    peer: Option<SocketAddr>,
}

impl LinkStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            inner: stream,
            peer,
        }
    }

    /// Remote address, if the socket still knows it.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            inner: self.inner.try_clone()?,
            peer: self.peer,
        })
    }

    /// Disable Nagle so short command lines leave immediately.
    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.inner.set_nodelay(nodelay)
    }
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl LinkIo for LinkStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.inner.set_read_timeout(timeout.map(|t| t.max(MIN_TIMEOUT)))
    }

    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.inner.set_write_timeout(timeout.map(|t| t.max(MIN_TIMEOUT)))
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already torn down by the peer.
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn peer_label(&self) -> String {
        self.peer
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("type", &"tcp")
            .field("peer", &self.peer)
            .finish()
    }
}
