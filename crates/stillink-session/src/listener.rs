use std::mem;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stillink_frame::{FrameConfig, FrameError, FrameReader, LineWriter, RawFrame};
use stillink_message::{
    parse_command, CommandMessage, TelemetrySample, ACK_TOKEN, HEARTBEAT_TOKEN,
};
use stillink_transport::{is_timeout, LinkIo, LinkStream, TcpLinkListener};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::handshake::{handshake_server, HandshakeConfig};

/// Rig side of the TCP link: accepts console connections.
///
/// Used by the simulator and by tests that need a real peer.
pub struct RigListener {
    listener: TcpLinkListener,
    handshake_config: HandshakeConfig,
    frame_config: FrameConfig,
    next_link_id: AtomicU64,
}

impl RigListener {
    /// Bind to `addr`, e.g. `0.0.0.0:8001` or `127.0.0.1:0`.
    pub fn bind(addr: &str) -> Result<Self> {
        Ok(Self {
            listener: TcpLinkListener::bind(addr)?,
            handshake_config: HandshakeConfig::default(),
            frame_config: FrameConfig::default(),
            next_link_id: AtomicU64::new(1),
        })
    }

    /// Override handshake config. `await_ack` makes the rig reply `ACK`.
    pub fn with_handshake_config(mut self, config: HandshakeConfig) -> Self {
        self.handshake_config = config;
        self
    }

    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// Accept the next console and complete the connect exchange.
    pub fn accept(&self) -> Result<RigLink> {
        let id = self.next_link_id.fetch_add(1, Ordering::Relaxed);
        let stream = self.listener.accept()?;
        let peer = stream.peer_label();

        let mut writer = LineWriter::with_config(stream, self.frame_config.clone());
        let mut reader = FrameReader::with_config(self.frame_config.clone());
        let handshake = handshake_server(&mut writer, &mut reader, &self.handshake_config)?;

        Ok(RigLink {
            id: format!("console-{id}"),
            peer,
            writer,
            reader,
            backlog: handshake.early_frames,
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }
}

/// One accepted console connection, seen from the rig.
pub struct RigLink {
    id: String,
    peer: String,
    writer: LineWriter<LinkStream>,
    reader: FrameReader,
    backlog: Vec<RawFrame>,
}

impl RigLink {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Stream one telemetry line.
    pub fn send_sample(&mut self, sample: &TelemetrySample) -> Result<()> {
        self.send_line(&sample.to_line())
    }

    pub fn send_heartbeat(&mut self) -> Result<()> {
        self.send_line(HEARTBEAT_TOKEN)
    }

    pub fn send_ack(&mut self) -> Result<()> {
        self.send_line(ACK_TOKEN)
    }

    /// Write an arbitrary line. The delimiter is appended.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        match self.writer.send(line.as_bytes()) {
            Ok(()) => Ok(()),
            Err(err @ (FrameError::LineTooLong { .. } | FrameError::EmbeddedDelimiter)) => {
                Err(err.into())
            }
            Err(err) => Err(SessionError::ConnectionLost(err.to_string())),
        }
    }

    /// Wait up to `timeout` for console commands.
    ///
    /// Timeouts yield an empty batch; lines that do not decode are logged and
    /// skipped.
    pub fn recv_commands(&mut self, timeout: Duration) -> Result<Vec<CommandMessage>> {
        let frames = if self.backlog.is_empty() {
            let stream = self.writer.get_mut();
            stream
                .set_read_timeout(Some(timeout))
                .map_err(FrameError::Io)?;
            match self.reader.read_from(stream) {
                Ok(frames) => frames,
                Err(FrameError::Io(err)) if is_timeout(&err) => return Ok(Vec::new()),
                Err(FrameError::ConnectionClosed) => {
                    return Err(SessionError::ConnectionLost(
                        "console closed the connection".to_string(),
                    ))
                }
                Err(err) => return Err(SessionError::ConnectionLost(err.to_string())),
            }
        } else {
            mem::take(&mut self.backlog)
        };

        let mut commands = Vec::with_capacity(frames.len());
        for frame in frames.into_iter().filter(|f| !f.is_empty()) {
            match parse_command(frame) {
                Ok(command) => {
                    debug!(link = %self.id, kind = command.kind(), "command received");
                    commands.push(command);
                }
                Err(err) => warn!(link = %self.id, error = %err, "skipping malformed command"),
            }
        }
        Ok(commands)
    }

    /// Close both directions of the link.
    pub fn close(&mut self) {
        if let Err(err) = self.writer.get_mut().shutdown() {
            debug!(error = %err, "shutdown failed");
        }
    }
}

impl std::fmt::Debug for RigLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigLink")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::thread;

    use stillink_message::PidGains;

    use super::*;

    fn raw_client(addr: SocketAddr) -> TcpStream {
        let stream = TcpStream::connect(addr).expect("client should connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    #[test]
    fn accept_requires_connect_line() {
        let listener = RigListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr();

        let client = thread::spawn(move || {
            let mut stream = raw_client(addr);
            stream.write_all(b"CONN\nBEAT\n").unwrap();
            stream
        });

        let mut link = listener.accept().expect("listener should accept");
        assert_eq!(link.id(), "console-1");
        assert_eq!(
            link.recv_commands(Duration::from_secs(1)).unwrap(),
            vec![CommandMessage::Heartbeat]
        );
        drop(client.join().unwrap());
    }

    #[test]
    fn ack_is_sent_when_configured() {
        let listener = RigListener::bind("127.0.0.1:0")
            .unwrap()
            .with_handshake_config(HandshakeConfig {
                await_ack: true,
                ..HandshakeConfig::default()
            });
        let addr = listener.local_addr();

        let client = thread::spawn(move || {
            let mut stream = raw_client(addr);
            stream.write_all(b"CONN\n").unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            buf
        });

        let _link = listener.accept().unwrap();
        assert_eq!(&client.join().unwrap(), b"ACK\n");
    }

    #[test]
    fn handshake_times_out_without_connect() {
        let listener = RigListener::bind("127.0.0.1:0")
            .unwrap()
            .with_handshake_config(HandshakeConfig {
                timeout: Duration::from_millis(100),
                await_ack: false,
            });
        let addr = listener.local_addr();

        let client = thread::spawn(move || {
            let mut stream = raw_client(addr);
            stream.write_all(b"hello\n").unwrap();
            thread::sleep(Duration::from_millis(300));
        });

        let err = listener.accept().unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
        client.join().unwrap();
    }

    #[test]
    fn streams_samples_and_decodes_tune_requests() {
        let listener = RigListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();

        let client = thread::spawn(move || {
            let mut stream = raw_client(addr);
            stream
                .write_all(b"CONN\nINFO&setpoint:26,P:28.00,I:1.00,D:18.00\n")
                .unwrap();
            let mut buf = vec![0u8; 64];
            let mut received = Vec::new();
            while !received.ends_with(b"BEAT\n") {
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0, "rig closed early");
                received.extend_from_slice(&buf[..n]);
            }
            received
        });

        let mut link = listener.accept().unwrap();
        let commands = link.recv_commands(Duration::from_secs(1)).unwrap();
        assert_eq!(
            commands,
            vec![CommandMessage::tune(26.0, PidGains::new(28.0, 1.0, 18.0)).unwrap()]
        );

        let sample =
            TelemetrySample::new(24.5, 26.0, 1.0, "HEATING", PidGains::new(28.0, 1.0, 18.0))
                .unwrap();
        link.send_sample(&sample).unwrap();
        link.send_heartbeat().unwrap();

        assert_eq!(
            client.join().unwrap(),
            b"24.5,26,1,HEATING,28.00,1.00,18.00\nBEAT\n".to_vec()
        );
    }

    #[test]
    fn recv_reports_closed_console() {
        let listener = RigListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();

        let client = thread::spawn(move || {
            let mut stream = raw_client(addr);
            stream.write_all(b"CONN\n").unwrap();
        });

        let mut link = listener.accept().unwrap();
        client.join().unwrap();
        let err = link.recv_commands(Duration::from_secs(1)).unwrap_err();
        assert!(err.is_connection_lost());
    }
}
