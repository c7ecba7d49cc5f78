use serde::{Deserialize, Serialize};
use stillink_frame::RawFrame;
use tracing::trace;

use crate::error::{MalformedKind, MessageError, Result};

/// Reserved keep-alive line sent by the rig.
pub const HEARTBEAT_TOKEN: &str = "BEAT";

/// Number of comma-separated fields in a telemetry line.
pub const TELEMETRY_FIELDS: usize = 7;

/// PID controller gains as reported by, or sent to, the rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl PidGains {
    pub fn new(p: f64, i: f64, d: f64) -> Self {
        Self { p, i, d }
    }
}

/// One telemetry record from the rig.
///
/// Fields are private; a sample never changes after it is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    runtime: f64,
    temperature: f64,
    setpoint: f64,
    element_status: String,
    gains: PidGains,
}

impl TelemetrySample {
    /// Build a sample, applying the same checks as the wire parser.
    pub fn new(
        temperature: f64,
        setpoint: f64,
        runtime: f64,
        element_status: impl Into<String>,
        gains: PidGains,
    ) -> Result<Self> {
        let element_status = element_status.into();
        for (field, value) in [
            ("temperature", temperature),
            ("setpoint", setpoint),
            ("runtime", runtime),
            ("P", gains.p),
            ("I", gains.i),
            ("D", gains.d),
        ] {
            if !value.is_finite() {
                return Err(MessageError::InvalidSample(MalformedKind::NotFinite {
                    field,
                }));
            }
        }
        if runtime < 0.0 {
            return Err(MessageError::InvalidSample(MalformedKind::NegativeRuntime));
        }
        if element_status.trim().is_empty() {
            return Err(MessageError::InvalidSample(MalformedKind::EmptyStatus));
        }

        Ok(Self {
            runtime,
            temperature,
            setpoint,
            element_status,
            gains,
        })
    }

    /// Seconds since the rig started its run.
    pub fn runtime(&self) -> f64 {
        self.runtime
    }

    /// Measured temperature in °C.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Controller setpoint in °C.
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Heating element status token, e.g. `HEATING`.
    pub fn element_status(&self) -> &str {
        &self.element_status
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Render the sample as a telemetry line (without delimiter).
    ///
    /// Gains are written with two decimals, as the rig firmware does.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{:.2},{:.2},{:.2}",
            self.temperature,
            self.setpoint,
            self.runtime,
            self.element_status,
            self.gains.p,
            self.gains.i,
            self.gains.d
        )
    }
}

/// A validated inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Telemetry(TelemetrySample),
    /// Keep-alive; carries nothing and must not reach telemetry history.
    Heartbeat,
}

/// Parse one frame from the rig.
///
/// Consumes the frame. Heartbeats are classified, not rejected.
pub fn parse(frame: RawFrame) -> Result<Message> {
    match frame.as_str() {
        Some(line) => parse_line(line),
        None => Err(MessageError::malformed(
            &frame.to_string_lossy(),
            MalformedKind::NotUtf8,
        )),
    }
}

/// Parse one line of text from the rig.
///
/// A single trailing `\r` is tolerated for CRLF senders. Whitespace around
/// each field is ignored.
pub fn parse_line(line: &str) -> Result<Message> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line == HEARTBEAT_TOKEN {
        trace!("heartbeat");
        return Ok(Message::Heartbeat);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != TELEMETRY_FIELDS {
        return Err(MessageError::malformed(
            line,
            MalformedKind::FieldCount {
                expected: TELEMETRY_FIELDS,
                found: fields.len(),
            },
        ));
    }

    let number = |idx: usize, field: &'static str| -> Result<f64> {
        let value: f64 = fields[idx]
            .parse()
            .map_err(|_| MessageError::malformed(line, MalformedKind::InvalidNumber { field }))?;
        if !value.is_finite() {
            return Err(MessageError::malformed(
                line,
                MalformedKind::NotFinite { field },
            ));
        }
        Ok(value)
    };

    let temperature = number(0, "temperature")?;
    let setpoint = number(1, "setpoint")?;
    let runtime = number(2, "runtime")?;
    let status = fields[3];
    let p = number(4, "P")?;
    let i = number(5, "I")?;
    let d = number(6, "D")?;

    if status.is_empty() {
        return Err(MessageError::malformed(line, MalformedKind::EmptyStatus));
    }
    if runtime < 0.0 {
        return Err(MessageError::malformed(line, MalformedKind::NegativeRuntime));
    }

    Ok(Message::Telemetry(TelemetrySample {
        runtime,
        temperature,
        setpoint,
        element_status: status.to_string(),
        gains: PidGains { p, i, d },
    }))
}
