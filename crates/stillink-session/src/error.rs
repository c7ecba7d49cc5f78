use std::time::Duration;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error (resolve, connect, socket options).
    #[error("transport error: {0}")]
    Transport(#[from] stillink_transport::TransportError),

    /// Frame-level error outside of an established session.
    #[error("frame error: {0}")]
    Frame(#[from] stillink_frame::FrameError),

    /// Message-level error, e.g. a non-finite value in a command.
    #[error("message error: {0}")]
    Message(#[from] stillink_message::MessageError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The link died. The session is now disconnected; reconnecting is up to
    /// the caller.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The session has no link.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called on a live session.
    #[error("already connected")]
    AlreadyConnected,

    /// A bounded wait ran out.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl SessionError {
    /// True if the session dropped its link because of this error.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Rejected history appends.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HistoryError {
    /// Runtime went backwards within a session.
    #[error("sample runtime {got} is earlier than latest {latest}")]
    OutOfOrder { latest: f64, got: f64 },
}

/// Errors that stop the serial bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The device handle failed. Fatal for the bridge.
    #[error("serial device failure: {0}")]
    Device(#[from] std::io::Error),

    /// Nobody is listening on the results queue any more.
    #[error("result queue closed")]
    ResultsClosed,

    /// The bridge is gone; the task could not be queued.
    #[error("command queue closed")]
    TasksClosed,
}
