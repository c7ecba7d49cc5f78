//! Telemetry parsing and command encoding for the stillink rig protocol.
//!
//! Rig to console, one line per message:
//!
//! ```text
//! temp,setpoint,runtime,elementStatus,P,I,D      telemetry sample
//! BEAT                                           keep-alive, carries no data
//! ```
//!
//! Console to rig:
//!
//! ```text
//! CONN                                           connect handshake
//! INFO&setpoint:<f>,P:<f>,I:<f>,D:<f>            setpoint/gain update
//! ```
//!
//! Parsing is the validation boundary: a line either becomes a typed
//! [`Message`] or a [`MessageError::MalformedFrame`] that callers log and skip.

pub mod command;
pub mod device;
pub mod error;
pub mod telemetry;
pub mod tune;

pub use command::{
    encode, parse_command, CommandMessage, TuneRequest, ACK_TOKEN, CONNECT_TOKEN, TUNE_TAG,
};
pub use device::{format_runtime, parse_device_line, DeviceMessage, DeviceReading};
pub use error::{MalformedKind, MessageError, Result};
pub use telemetry::{
    parse, parse_line, Message, PidGains, TelemetrySample, HEARTBEAT_TOKEN, TELEMETRY_FIELDS,
};
pub use tune::{parse_override, TuneOverrides};
