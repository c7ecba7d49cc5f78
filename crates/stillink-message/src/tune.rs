use crate::command::CommandMessage;
use crate::error::{MessageError, Result};
use crate::telemetry::{PidGains, TelemetrySample};

/// Operator-supplied changes to setpoint and gains.
///
/// `None` keeps whatever the rig last reported.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TuneOverrides {
    pub setpoint: Option<f64>,
    pub p_gain: Option<f64>,
    pub i_gain: Option<f64>,
    pub d_gain: Option<f64>,
}

impl TuneOverrides {
    /// True when nothing would change.
    pub fn is_empty(&self) -> bool {
        self.setpoint.is_none()
            && self.p_gain.is_none()
            && self.i_gain.is_none()
            && self.d_gain.is_none()
    }

    /// Build a tune request from the latest reported sample.
    pub fn resolve(&self, latest: &TelemetrySample) -> Result<CommandMessage> {
        self.resolve_with(latest.setpoint(), latest.gains())
    }

    /// Build a tune request from explicit current values.
    pub fn resolve_with(&self, setpoint: f64, gains: PidGains) -> Result<CommandMessage> {
        CommandMessage::tune(
            self.setpoint.unwrap_or(setpoint),
            PidGains::new(
                self.p_gain.unwrap_or(gains.p),
                self.i_gain.unwrap_or(gains.i),
                self.d_gain.unwrap_or(gains.d),
            ),
        )
    }
}

/// Parse one operator input box: blank means "keep previous".
pub fn parse_override(input: &str, field: &'static str) -> Result<Option<f64>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let value: f64 = input.parse().map_err(|_| MessageError::InvalidOverride {
        field,
        input: input.to_string(),
    })?;
    if !value.is_finite() {
        return Err(MessageError::NonFinite { field, value });
    }
    Ok(Some(value))
}
