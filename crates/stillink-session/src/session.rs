use std::mem;
use std::time::Duration;

use stillink_frame::{FrameConfig, FrameError, FrameReader, LineWriter, RawFrame};
use stillink_message::{encode, parse, CommandMessage, Message, TelemetrySample};
use stillink_transport::{is_timeout, LinkIo, LinkStream, TcpTransport};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::handshake::{handshake_client, HandshakeConfig};
use crate::state::{ConnectionState, SessionSnapshot, SessionStats};

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on opening the TCP connection.
    pub connect_timeout: Duration,
    /// Default bound for [`ConnectionSession::poll_default`].
    pub read_timeout: Duration,
    /// Bound on each command write.
    pub write_timeout: Duration,
    /// Consecutive timed-out polls before the state reads `Degraded`.
    /// Zero disables the degraded state.
    pub degraded_after: u32,
    pub frame: FrameConfig,
    pub handshake: HandshakeConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_millis(1500),
            write_timeout: Duration::from_secs(2),
            degraded_after: 3,
            frame: FrameConfig::default(),
            handshake: HandshakeConfig::default(),
        }
    }
}

/// The console's view of one link to the rig.
///
/// Owns the stream and the reassembly buffer. Every read is bounded by the
/// timeout passed to [`poll`](Self::poll); nothing here blocks without one.
/// A dead link moves the session to `Disconnected` once and every later call
/// reports [`SessionError::NotConnected`] until the caller connects again.
pub struct ConnectionSession<S = LinkStream> {
    config: SessionConfig,
    state: ConnectionState,
    link: Option<LineWriter<S>>,
    reader: FrameReader,
    backlog: Vec<RawFrame>,
    stats: SessionStats,
    consecutive_timeouts: u32,
    peer: Option<String>,
}

impl ConnectionSession<LinkStream> {
    /// Open a TCP link to `addr` and send the connect line.
    ///
    /// `addr` is `host[:port]`; the port defaults to
    /// [`TcpTransport::DEFAULT_PORT`].
    pub fn connect(&mut self, addr: &str) -> Result<()> {
        if self.state.is_connected() {
            return Err(SessionError::AlreadyConnected);
        }
        self.state = ConnectionState::Connecting;
        debug!(addr, "connecting");

        let stream = match TcpTransport::connect(addr, self.config.connect_timeout) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(addr, error = %err, "connect failed");
                self.state = ConnectionState::Disconnected;
                return Err(err.into());
            }
        };
        self.attach(stream)
    }
}

impl<S: LinkIo> ConnectionSession<S> {
    pub fn new(config: SessionConfig) -> Self {
        let reader = FrameReader::with_config(config.frame.clone());
        Self {
            config,
            state: ConnectionState::Disconnected,
            link: None,
            reader,
            backlog: Vec::new(),
            stats: SessionStats::default(),
            consecutive_timeouts: 0,
            peer: None,
        }
    }

    /// Run the connect exchange over an already-open stream.
    ///
    /// On failure the stream is dropped and the session stays
    /// `Disconnected`.
    pub fn attach(&mut self, stream: S) -> Result<()> {
        if self.state.is_connected() {
            return Err(SessionError::AlreadyConnected);
        }
        self.state = ConnectionState::Connecting;

        match self.establish(stream) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, "handshake failed");
                self.teardown();
                Err(err)
            }
        }
    }

    fn establish(&mut self, stream: S) -> Result<()> {
        let peer = stream.peer_label();
        let mut writer = LineWriter::with_config(stream, self.config.frame.clone());
        self.reader.clear();

        let handshake = handshake_client(&mut writer, &mut self.reader, &self.config.handshake)?;
        writer
            .get_mut()
            .set_write_timeout(Some(self.config.write_timeout))
            .map_err(FrameError::Io)?;

        info!(
            peer = %peer,
            acknowledged = handshake.acknowledged,
            "session connected"
        );
        self.stats = SessionStats::default();
        self.consecutive_timeouts = 0;
        self.backlog = handshake.early_frames;
        self.link = Some(writer);
        self.peer = Some(peer);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Perform exactly one read bounded by `timeout` and return the samples
    /// it completed, in arrival order.
    ///
    /// A timeout is not an error and yields an empty batch. Heartbeats and
    /// malformed lines are consumed without reaching the caller. End of
    /// stream, any other I/O failure or an oversized line drops the link and
    /// returns [`SessionError::ConnectionLost`].
    pub fn poll(&mut self, timeout: Duration) -> Result<Vec<TelemetrySample>> {
        if self.link.is_none() {
            return Err(SessionError::NotConnected);
        }
        if !self.backlog.is_empty() {
            let frames = mem::take(&mut self.backlog);
            return Ok(self.absorb(frames));
        }

        let outcome = match self.link.as_mut() {
            Some(link) => {
                let stream = link.get_mut();
                match stream.set_read_timeout(Some(timeout)) {
                    Ok(()) => self.reader.read_from(stream),
                    Err(err) => Err(FrameError::Io(err)),
                }
            }
            None => return Err(SessionError::NotConnected),
        };

        match outcome {
            Ok(frames) => Ok(self.absorb(frames)),
            Err(FrameError::Io(err)) if is_timeout(&err) => {
                self.note_timeout();
                Ok(Vec::new())
            }
            Err(FrameError::ConnectionClosed) => {
                Err(self.lose("peer closed the connection".to_string()))
            }
            Err(err) => Err(self.lose(err.to_string())),
        }
    }

    /// [`poll`](Self::poll) with [`SessionConfig::read_timeout`].
    pub fn poll_default(&mut self) -> Result<Vec<TelemetrySample>> {
        self.poll(self.config.read_timeout)
    }

    /// Encode `command`, append the delimiter and write it synchronously.
    pub fn send(&mut self, command: &CommandMessage) -> Result<()> {
        let Some(link) = self.link.as_mut() else {
            return Err(SessionError::NotConnected);
        };

        let line = encode(command);
        match link.send(line.as_bytes()) {
            Ok(()) => {
                self.stats.commands_sent += 1;
                debug!(kind = command.kind(), line = %line, "sent command");
                Ok(())
            }
            Err(err) => Err(self.lose(format!("send failed: {err}"))),
        }
    }

    /// Shut the link down and reset framing state. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.link.is_some() {
            info!(peer = ?self.peer, "closing session");
        }
        self.teardown();
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Copy of the current state for display.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            peer: self.peer.clone(),
            stats: self.stats,
        }
    }

    fn absorb(&mut self, frames: Vec<RawFrame>) -> Vec<TelemetrySample> {
        self.consecutive_timeouts = 0;
        if let ConnectionState::Degraded(n) = self.state {
            info!(timeouts = n, "link recovered");
            self.state = ConnectionState::Connected;
        }

        let mut samples = Vec::new();
        for frame in frames {
            if frame.is_empty() {
                continue;
            }
            self.stats.frames += 1;
            match parse(frame) {
                Ok(Message::Telemetry(sample)) => {
                    self.stats.samples += 1;
                    samples.push(sample);
                }
                Ok(Message::Heartbeat) => {
                    self.stats.heartbeats += 1;
                    debug!("heartbeat");
                }
                Err(err) => {
                    self.stats.malformed += 1;
                    warn!(error = %err, "skipping malformed frame");
                }
            }
        }
        samples
    }

    fn note_timeout(&mut self) {
        self.stats.timeouts += 1;
        self.consecutive_timeouts += 1;

        let threshold = self.config.degraded_after;
        if threshold > 0 && self.consecutive_timeouts >= threshold {
            if self.state == ConnectionState::Connected {
                warn!(
                    timeouts = self.consecutive_timeouts,
                    "no data from rig; link degraded"
                );
            }
            self.state = ConnectionState::Degraded(self.consecutive_timeouts);
        }
    }

    fn lose(&mut self, reason: String) -> SessionError {
        warn!(peer = ?self.peer, reason = %reason, "connection lost");
        self.teardown();
        SessionError::ConnectionLost(reason)
    }

    fn teardown(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Err(err) = link.get_mut().shutdown() {
                debug!(error = %err, "shutdown failed");
            }
        }
        self.reader.clear();
        self.backlog.clear();
        self.consecutive_timeouts = 0;
        self.state = ConnectionState::Disconnected;
    }
}

impl<S: LinkIo> Default for ConnectionSession<S> {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl<S> std::fmt::Debug for ConnectionSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("state", &self.state)
            .field("peer", &self.peer)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{self, ErrorKind, Read, Write};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use stillink_message::PidGains;

    use super::*;

    const LINE: &[u8] = b"24.5,25.0,120.0,HEATING,28.00,1.00,18.00\n";

    enum Step {
        Data(Vec<u8>),
        Timeout,
        Reset,
        Eof,
    }

    /// Handles the test keeps after the stream moves into the session.
    #[derive(Clone, Default)]
    struct Probe {
        written: Arc<Mutex<Vec<u8>>>,
        broken: Arc<AtomicBool>,
        shutdowns: Arc<AtomicUsize>,
    }

    impl Probe {
        fn written(&self) -> Vec<u8> {
            self.written.lock().unwrap().clone()
        }
    }

    struct ScriptedLink {
        steps: VecDeque<Step>,
        probe: Probe,
    }

    fn link(steps: Vec<Step>) -> (ScriptedLink, Probe) {
        let probe = Probe::default();
        (
            ScriptedLink {
                steps: steps.into(),
                probe: probe.clone(),
            },
            probe,
        )
    }

    impl Read for ScriptedLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Step::Data(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Step::Timeout) | None => Err(ErrorKind::WouldBlock.into()),
                Some(Step::Reset) => Err(ErrorKind::ConnectionReset.into()),
                Some(Step::Eof) => Ok(0),
            }
        }
    }

    impl Write for ScriptedLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.probe.broken.load(Ordering::SeqCst) {
                return Err(ErrorKind::BrokenPipe.into());
            }
            self.probe.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LinkIo for ScriptedLink {
        fn set_read_timeout(&mut self, _: Option<Duration>) -> io::Result<()> {
            Ok(())
        }

        fn set_write_timeout(&mut self, _: Option<Duration>) -> io::Result<()> {
            Ok(())
        }

        fn shutdown(&mut self) -> io::Result<()> {
            self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn peer_label(&self) -> String {
            "scripted".to_string()
        }
    }

    fn data(bytes: &[u8]) -> Step {
        Step::Data(bytes.to_vec())
    }

    fn session(steps: Vec<Step>) -> (ConnectionSession<ScriptedLink>, Probe) {
        let (stream, probe) = link(steps);
        let mut session = ConnectionSession::new(SessionConfig::default());
        session.attach(stream).unwrap();
        (session, probe)
    }

    fn tick(session: &mut ConnectionSession<ScriptedLink>) -> Result<Vec<TelemetrySample>> {
        session.poll(Duration::from_millis(10))
    }

    #[test]
    fn attach_sends_connect_and_is_connected() {
        let (session, probe) = session(vec![]);
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(probe.written(), b"CONN\n");
        assert_eq!(session.snapshot().peer.as_deref(), Some("scripted"));
    }

    #[test]
    fn poll_returns_parsed_samples_in_order() {
        let mut chunk = LINE.to_vec();
        chunk.extend_from_slice(b"25.0,25.0,121.0,IDLE,28.00,1.00,18.00\n");
        let (mut session, _) = session(vec![Step::Data(chunk)]);

        let samples = tick(&mut session).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].temperature(), 24.5);
        assert_eq!(samples[1].element_status(), "IDLE");
        assert_eq!(samples[0].gains(), PidGains::new(28.0, 1.0, 18.0));
    }

    #[test]
    fn heartbeats_never_reach_caller() {
        let (mut session, _) = session(vec![data(b"BEAT\nBEAT\n"), data(LINE), data(b"BEAT\n")]);

        assert!(tick(&mut session).unwrap().is_empty());
        assert_eq!(tick(&mut session).unwrap().len(), 1);
        assert!(tick(&mut session).unwrap().is_empty());

        let stats = session.stats();
        assert_eq!(stats.heartbeats, 3);
        assert_eq!(stats.samples, 1);
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[test]
    fn line_split_across_reads_is_reassembled() {
        let (mut session, _) = session(vec![
            data(b"24.5,25.0,12"),
            data(b"0.0,HEATING,28.00,1.00,18.00\nBE"),
            data(b"AT\n"),
        ]);

        assert!(tick(&mut session).unwrap().is_empty());
        let samples = tick(&mut session).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].runtime(), 120.0);
        assert!(tick(&mut session).unwrap().is_empty());
        assert_eq!(session.stats().heartbeats, 1);
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let mut chunk = b"12,34,56\n".to_vec();
        chunk.extend_from_slice(LINE);
        chunk.extend_from_slice(b"\n");
        let (mut session, _) = session(vec![Step::Data(chunk)]);

        let samples = tick(&mut session).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(session.stats().malformed, 1);
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[test]
    fn timeout_is_empty_and_keeps_state() {
        let (mut session, _) = session(vec![Step::Timeout]);
        assert!(tick(&mut session).unwrap().is_empty());
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.stats().timeouts, 1);
    }

    #[test]
    fn alternating_timeouts_and_data_stay_connected() {
        let mut steps = Vec::new();
        for _ in 0..10 {
            steps.push(Step::Timeout);
            steps.push(Step::Timeout);
            steps.push(data(LINE));
        }
        let (mut session, _) = session(steps);

        let mut received = 0;
        for _ in 0..30 {
            received += tick(&mut session).unwrap().len();
            assert_eq!(session.state(), ConnectionState::Connected);
        }
        assert_eq!(received, 10);
    }

    #[test]
    fn consecutive_timeouts_degrade_then_recover() {
        let (mut session, _) = session(vec![
            Step::Timeout,
            Step::Timeout,
            Step::Timeout,
            Step::Timeout,
            data(b"BEAT\n"),
        ]);

        for _ in 0..2 {
            tick(&mut session).unwrap();
        }
        assert_eq!(session.state(), ConnectionState::Connected);
        tick(&mut session).unwrap();
        assert_eq!(session.state(), ConnectionState::Degraded(3));
        tick(&mut session).unwrap();
        assert_eq!(session.state(), ConnectionState::Degraded(4));
        assert!(session.is_connected());

        tick(&mut session).unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[test]
    fn reset_disconnects_exactly_once() {
        let (mut session, probe) = session(vec![data(LINE), Step::Reset]);

        assert_eq!(tick(&mut session).unwrap().len(), 1);
        let err = tick(&mut session).unwrap_err();
        assert!(err.is_connection_lost());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 1);

        for _ in 0..3 {
            assert!(matches!(
                tick(&mut session),
                Err(SessionError::NotConnected)
            ));
        }
        assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn eof_is_connection_lost() {
        let (mut session, _) = session(vec![Step::Eof]);
        assert!(matches!(
            tick(&mut session),
            Err(SessionError::ConnectionLost(_))
        ));
        assert!(!session.is_connected());
    }

    #[test]
    fn oversized_line_is_connection_lost() {
        let (mut session, _) = session(vec![
            Step::Data(vec![b'7'; 4000]),
            Step::Data(vec![b'7'; 97]),
        ]);
        assert!(tick(&mut session).unwrap().is_empty());
        assert!(tick(&mut session).unwrap_err().is_connection_lost());
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn sample_ahead_of_oversized_tail_is_delivered_before_loss() {
        let mut chunk = LINE.to_vec();
        chunk.extend_from_slice(&[b'7'; 100]);
        let (stream, _) = link(vec![Step::Data(chunk)]);
        let mut session = ConnectionSession::new(SessionConfig {
            frame: FrameConfig {
                max_line_len: 64,
                ..FrameConfig::default()
            },
            ..SessionConfig::default()
        });
        session.attach(stream).unwrap();

        let samples = tick(&mut session).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].temperature(), 24.5);
        assert!(tick(&mut session).unwrap_err().is_connection_lost());
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn send_writes_exact_tune_line() {
        let (mut session, probe) = session(vec![]);
        let cmd = CommandMessage::tune(26.0, PidGains::new(28.0, 1.0, 18.0)).unwrap();
        session.send(&cmd).unwrap();

        assert_eq!(
            probe.written(),
            b"CONN\nINFO&setpoint:26,P:28.00,I:1.00,D:18.00\n"
        );
        assert_eq!(session.stats().commands_sent, 1);
    }

    #[test]
    fn failed_send_disconnects() {
        let (mut session, probe) = session(vec![]);
        probe.broken.store(true, Ordering::SeqCst);

        let err = session.send(&CommandMessage::Heartbeat).unwrap_err();
        assert!(err.is_connection_lost());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(matches!(
            session.send(&CommandMessage::Heartbeat),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let (mut session, probe) = session(vec![Step::Timeout]);
        tick(&mut session).unwrap();

        session.close();
        session.close();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 1);
        assert!(matches!(
            tick(&mut session),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn close_discards_partial_line() {
        let (mut session, _) = session(vec![data(b"24.5,25.0,1")]);
        tick(&mut session).unwrap();
        session.close();

        let (stream, _) = link(vec![data(b"0.0,HEATING,28.00,1.00,18.00\n")]);
        session.attach(stream).unwrap();
        assert!(tick(&mut session).unwrap().is_empty());
        assert_eq!(session.stats().malformed, 1);
    }

    #[test]
    fn attach_twice_is_rejected() {
        let (mut session, _) = session(vec![]);
        let (second, _) = link(vec![]);
        assert!(matches!(
            session.attach(second),
            Err(SessionError::AlreadyConnected)
        ));
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[test]
    fn failed_handshake_leaves_disconnected() {
        let (stream, _) = link(vec![Step::Eof]);
        let mut config = SessionConfig::default();
        config.handshake.await_ack = true;
        let mut session = ConnectionSession::new(config);

        let err = session.attach(stream).unwrap_err();
        assert!(matches!(err, SessionError::HandshakeFailed(_)));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn telemetry_during_ack_wait_is_delivered_first() {
        let mut chunk = LINE.to_vec();
        chunk.extend_from_slice(b"ACK\n");
        let (stream, _) = link(vec![Step::Data(chunk), data(LINE)]);
        let mut config = SessionConfig::default();
        config.handshake.await_ack = true;
        let mut session = ConnectionSession::new(config);
        session.attach(stream).unwrap();

        assert_eq!(tick(&mut session).unwrap().len(), 1);
        assert_eq!(tick(&mut session).unwrap().len(), 1);
        assert_eq!(session.stats().samples, 2);
    }

    #[test]
    fn poll_before_connect_is_not_connected() {
        let mut session: ConnectionSession<ScriptedLink> = ConnectionSession::default();
        assert!(matches!(
            tick(&mut session),
            Err(SessionError::NotConnected)
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }
}
