//! Device variant of the codec: lines read from the local controller's serial
//! port, reduced to what the character display needs.

use serde::Serialize;
use stillink_frame::RawFrame;

use crate::error::{MalformedKind, MessageError, Result};
use crate::telemetry::{TelemetrySample, HEARTBEAT_TOKEN};

/// Fields the display needs: temperature, setpoint, runtime.
const REQUIRED_DEVICE_FIELDS: usize = 3;

/// Display-relevant subset of a device line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReading {
    pub temperature: f64,
    pub setpoint: f64,
    pub runtime: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_status: Option<String>,
}

impl From<&TelemetrySample> for DeviceReading {
    fn from(sample: &TelemetrySample) -> Self {
        Self {
            temperature: sample.temperature(),
            setpoint: sample.setpoint(),
            runtime: sample.runtime(),
            element_status: Some(sample.element_status().to_string()),
        }
    }
}

/// A validated serial line.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    Reading(DeviceReading),
    Heartbeat,
}

/// Parse a line from the serial device.
///
/// Serial lines usually end in `\r\n` and may carry the full 7-field
/// telemetry schema or just its first three fields; surrounding whitespace is
/// ignored and only `temp,setpoint,runtime[,status]` is kept.
pub fn parse_device_line(frame: RawFrame) -> Result<DeviceMessage> {
    let Some(text) = frame.as_str() else {
        return Err(MessageError::malformed(
            &frame.to_string_lossy(),
            MalformedKind::NotUtf8,
        ));
    };
    let line = text.trim();

    if line == HEARTBEAT_TOKEN {
        return Ok(DeviceMessage::Heartbeat);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < REQUIRED_DEVICE_FIELDS {
        return Err(MessageError::malformed(
            line,
            MalformedKind::FieldCount {
                expected: REQUIRED_DEVICE_FIELDS,
                found: fields.len(),
            },
        ));
    }

    let mut values = [0.0f64; REQUIRED_DEVICE_FIELDS];
    for (slot, (raw, field)) in values
        .iter_mut()
        .zip(fields.iter().zip(["temperature", "setpoint", "runtime"]))
    {
        let value: f64 = raw
            .parse()
            .map_err(|_| MessageError::malformed(line, MalformedKind::InvalidNumber { field }))?;
        if !value.is_finite() {
            return Err(MessageError::malformed(
                line,
                MalformedKind::NotFinite { field },
            ));
        }
        *slot = value;
    }

    let element_status = fields
        .get(REQUIRED_DEVICE_FIELDS)
        .filter(|status| !status.is_empty())
        .map(|status| status.to_string());

    Ok(DeviceMessage::Reading(DeviceReading {
        temperature: values[0],
        setpoint: values[1],
        runtime: values[2],
        element_status,
    }))
}

/// Format a runtime in seconds as `HH:MM:SS` for display.
///
/// Negative or non-finite input renders as zero.
pub fn format_runtime(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let (minutes, secs) = (total / 60, total % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    format!("{hours:02}:{minutes:02}:{secs:02}")
}
