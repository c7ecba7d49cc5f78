use std::time::{Duration, Instant};

use stillink_frame::{FrameError, FrameReader, LineWriter, RawFrame};
use stillink_message::{encode, CommandMessage, ACK_TOKEN, CONNECT_TOKEN};
use stillink_transport::{is_timeout, LinkIo};
use tracing::{debug, info};

use crate::error::{Result, SessionError};

/// Configuration for the connect exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Bound on each blocking handshake operation.
    pub timeout: Duration,
    /// Client: wait for `ACK` after sending `CONN`. Rig: reply with `ACK`.
    ///
    /// Off by default; the rig firmware starts streaming without replying.
    pub await_ack: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            await_ack: false,
        }
    }
}

/// Outcome of a successful handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeResult {
    /// True if the peer's `ACK` (client) was seen or sent (rig).
    pub acknowledged: bool,
    /// Frames read during the handshake that belong to the session proper.
    pub early_frames: Vec<RawFrame>,
}

/// Console side: send `CONN`, optionally wait for `ACK`.
///
/// Everything other than the ack that arrives while waiting is returned in
/// [`HandshakeResult::early_frames`] in arrival order.
pub fn handshake_client<S: LinkIo>(
    writer: &mut LineWriter<S>,
    reader: &mut FrameReader,
    config: &HandshakeConfig,
) -> Result<HandshakeResult> {
    writer
        .get_mut()
        .set_write_timeout(Some(config.timeout))
        .map_err(FrameError::Io)?;
    writer.send(encode(&CommandMessage::Connect).as_bytes())?;
    debug!("sent connect line");

    if !config.await_ack {
        return Ok(HandshakeResult::default());
    }

    let mut result = HandshakeResult::default();
    let deadline = Instant::now() + config.timeout;
    while !result.acknowledged {
        for frame in read_until(writer, reader, deadline, config.timeout)? {
            if !result.acknowledged && is_token(&frame, ACK_TOKEN) {
                result.acknowledged = true;
            } else {
                result.early_frames.push(frame);
            }
        }
    }

    info!(early = result.early_frames.len(), "rig acknowledged connect");
    Ok(result)
}

/// Rig side: wait for `CONN`, optionally answer with `ACK`.
///
/// Lines before `CONN` are discarded; lines after it in the same read are
/// returned as early frames.
pub fn handshake_server<S: LinkIo>(
    writer: &mut LineWriter<S>,
    reader: &mut FrameReader,
    config: &HandshakeConfig,
) -> Result<HandshakeResult> {
    let mut result = HandshakeResult::default();
    let deadline = Instant::now() + config.timeout;
    let mut connected = false;

    while !connected {
        for frame in read_until(writer, reader, deadline, config.timeout)? {
            if connected {
                result.early_frames.push(frame);
            } else if is_token(&frame, CONNECT_TOKEN) {
                connected = true;
            } else {
                debug!(line = %frame.to_string_lossy(), "ignoring line before connect");
            }
        }
    }

    if config.await_ack {
        writer
            .get_mut()
            .set_write_timeout(Some(config.timeout))
            .map_err(FrameError::Io)?;
        writer.send(ACK_TOKEN.as_bytes())?;
        result.acknowledged = true;
    }

    info!(peer = %writer.get_ref().peer_label(), "console connected");
    Ok(result)
}

/// Exact token match, tolerating a CRLF sender.
fn is_token(frame: &RawFrame, token: &str) -> bool {
    let line = frame.as_bytes();
    line.strip_suffix(b"\r").unwrap_or(line) == token.as_bytes()
}

/// One bounded read against `deadline`. Timeouts before the deadline yield an
/// empty batch.
fn read_until<S: LinkIo>(
    writer: &mut LineWriter<S>,
    reader: &mut FrameReader,
    deadline: Instant,
    budget: Duration,
) -> Result<Vec<RawFrame>> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(SessionError::Timeout(budget));
    }

    let stream = writer.get_mut();
    stream
        .set_read_timeout(Some(remaining))
        .map_err(FrameError::Io)?;
    match reader.read_from(stream) {
        Ok(frames) => Ok(frames),
        Err(FrameError::Io(err)) if is_timeout(&err) => Ok(Vec::new()),
        Err(FrameError::ConnectionClosed) => Err(SessionError::HandshakeFailed(
            "peer closed during handshake".to_string(),
        )),
        Err(err) => Err(err.into()),
    }
}
