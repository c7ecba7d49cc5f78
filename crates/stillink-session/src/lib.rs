//! Connection sessions, telemetry history and serial bridge.
//!
//! This is the layer the console drives. A [`ConnectionSession`] owns one TCP
//! link to the rig and is polled on a fixed tick with a bounded timeout;
//! parsed samples go into a [`TelemetryHistory`]. The [`SerialBridge`] runs on
//! its own thread with its own device handle and talks to the console only
//! through two queues.

pub mod bridge;
pub mod connector;
pub mod error;
pub mod handshake;
pub mod history;
pub mod listener;
pub mod session;
pub mod state;

pub use bridge::{
    spawn_bridge, BridgeConfig, BridgeExit, BridgeHandle, BridgeStats, SerialBridge, SerialResult,
    SerialTask, StepReport, DISPLAY_COLS, DISPLAY_TITLE,
};
pub use connector::{connect, connect_with_config};
pub use error::{BridgeError, HistoryError, Result, SessionError};
pub use handshake::{handshake_client, handshake_server, HandshakeConfig, HandshakeResult};
pub use history::TelemetryHistory;
pub use listener::{RigLink, RigListener};
pub use session::{ConnectionSession, SessionConfig};
pub use state::{ConnectionState, SessionSnapshot, SessionStats};
