//! Transports for the stillink rig protocol.
//!
//! Two links reach the distillation rig:
//! - a TCP socket carrying telemetry and tuning commands
//! - a serial line to the local controller that also feeds the display
//!
//! This is the lowest layer of stillink. Framing and sessions build on the
//! [`LinkIo`] and [`SerialIo`] traits rather than on concrete sockets, so tests
//! can substitute scripted streams.

pub mod error;
pub mod serial;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialDevice};
pub use serial::SerialIo;
pub use tcp::{TcpLinkListener, TcpTransport};
pub use traits::{is_timeout, LinkIo, LinkStream};
