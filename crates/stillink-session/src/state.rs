use std::fmt;

use serde::Serialize;

/// Lifecycle of a [`crate::ConnectionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "timeouts", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Still connected, but the last `n` polls all timed out.
    Degraded(u32),
}

impl ConnectionState {
    /// True while the session holds a usable link.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Degraded(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded(_) => "degraded",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Degraded(n) => write!(f, "degraded ({n} timeouts)"),
            other => f.write_str(other.name()),
        }
    }
}

/// Counters kept by a session. Reset on every connect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames: u64,
    pub samples: u64,
    pub heartbeats: u64,
    pub malformed: u64,
    pub timeouts: u64,
    pub commands_sent: u64,
}

/// Point-in-time copy of session state for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub peer: Option<String>,
    pub stats: SessionStats,
}
