//! Telemetry and tuning link between an operator console and a distillation
//! rig.
//!
//! The rig streams comma-separated telemetry lines over TCP and accepts
//! setpoint/gain updates on the same connection; a local controller is
//! reached over a serial line through a worker thread that also feeds a
//! character display.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP links and serial device access
//! - [`frame`]: newline framing over partial reads
//! - [`message`]: typed telemetry, heartbeats and commands
//! - [`session`]: connection state machine, history and serial bridge
//!   (behind the `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use stillink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use stillink_frame::*;
}

/// Re-export message types.
pub mod message {
    pub use stillink_message::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use stillink_session::*;
}
