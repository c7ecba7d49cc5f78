use stillink_frame::RawFrame;

use crate::error::{MalformedKind, MessageError, Result};
use crate::telemetry::{PidGains, HEARTBEAT_TOKEN};

/// Connect handshake line sent by the console.
pub const CONNECT_TOKEN: &str = "CONN";

/// Optional handshake acknowledgement from the rig.
pub const ACK_TOKEN: &str = "ACK";

/// Prefix of a setpoint/gain update.
pub const TUNE_TAG: &str = "INFO&";

/// Setpoint and gains for a tune request. Always finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuneRequest {
    setpoint: f64,
    gains: PidGains,
}

impl TuneRequest {
    /// Validate and build a request. NaN and infinities are rejected here so
    /// that encoding never has to fail.
    pub fn new(setpoint: f64, gains: PidGains) -> Result<Self> {
        for (field, value) in [
            ("setpoint", setpoint),
            ("P", gains.p),
            ("I", gains.i),
            ("D", gains.d),
        ] {
            if !value.is_finite() {
                return Err(MessageError::NonFinite { field, value });
            }
        }
        Ok(Self { setpoint, gains })
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }
}

/// Outbound messages from console to rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandMessage {
    Connect,
    Heartbeat,
    TuneRequest(TuneRequest),
}

impl CommandMessage {
    /// Shorthand for a validated [`CommandMessage::TuneRequest`].
    pub fn tune(setpoint: f64, gains: PidGains) -> Result<Self> {
        TuneRequest::new(setpoint, gains).map(Self::TuneRequest)
    }

    /// Wire form without delimiter; see [`encode`].
    pub fn encode(&self) -> String {
        encode(self)
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Heartbeat => "heartbeat",
            Self::TuneRequest(_) => "tune",
        }
    }
}

/// Encode a command as a single line (without delimiter).
///
/// The setpoint is written as given; gains are written with two decimals:
///
/// ```
/// use stillink_message::{encode, CommandMessage, PidGains};
///
/// let cmd = CommandMessage::tune(26.0, PidGains::new(28.0, 1.0, 18.0)).unwrap();
/// assert_eq!(encode(&cmd), "INFO&setpoint:26,P:28.00,I:1.00,D:18.00");
/// ```
pub fn encode(command: &CommandMessage) -> String {
    match command {
        CommandMessage::Connect => CONNECT_TOKEN.to_string(),
        CommandMessage::Heartbeat => HEARTBEAT_TOKEN.to_string(),
        CommandMessage::TuneRequest(req) => format!(
            "{TUNE_TAG}setpoint:{},P:{:.2},I:{:.2},D:{:.2}",
            req.setpoint, req.gains.p, req.gains.i, req.gains.d
        ),
    }
}

/// Decode a command line on the rig side.
///
/// Accepts `CONN`, `BEAT` and `key:value` lists with or without the `INFO&`
/// tag. Keys may come in any order; unknown keys are ignored, but `setpoint`,
/// `P`, `I` and `D` are all required.
pub fn parse_command(frame: RawFrame) -> Result<CommandMessage> {
    let Some(text) = frame.as_str() else {
        return Err(MessageError::malformed(
            &frame.to_string_lossy(),
            MalformedKind::NotUtf8,
        ));
    };
    let line = text.trim();

    match line {
        CONNECT_TOKEN => return Ok(CommandMessage::Connect),
        HEARTBEAT_TOKEN => return Ok(CommandMessage::Heartbeat),
        _ => {}
    }

    let body = line.strip_prefix(TUNE_TAG).unwrap_or(line);
    if !body.contains(':') {
        return Err(MessageError::malformed(line, MalformedKind::UnknownCommand));
    }

    let mut setpoint = None;
    let mut p = None;
    let mut i = None;
    let mut d = None;

    for pair in body.split(',') {
        let Some((key, value)) = pair.split_once(':') else {
            return Err(MessageError::malformed(line, MalformedKind::UnknownCommand));
        };
        let slot = match key.trim() {
            "setpoint" => (&mut setpoint, "setpoint"),
            "P" => (&mut p, "P"),
            "I" => (&mut i, "I"),
            "D" => (&mut d, "D"),
            _ => continue,
        };
        let parsed: f64 = value.trim().parse().map_err(|_| {
            MessageError::malformed(line, MalformedKind::InvalidNumber { field: slot.1 })
        })?;
        if !parsed.is_finite() {
            return Err(MessageError::malformed(
                line,
                MalformedKind::NotFinite { field: slot.1 },
            ));
        }
        *slot.0 = Some(parsed);
    }

    let require = |value: Option<f64>, key: &'static str| {
        value.ok_or_else(|| MessageError::malformed(line, MalformedKind::MissingKey(key)))
    };
    let setpoint = require(setpoint, "setpoint")?;
    let gains = PidGains::new(require(p, "P")?, require(i, "I")?, require(d, "D")?);

    CommandMessage::tune(setpoint, gains)
}
