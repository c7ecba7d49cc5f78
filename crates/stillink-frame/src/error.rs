/// Errors that can occur while framing lines.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Unterminated data grew past the configured cap.
    #[error("line too long ({size} bytes without delimiter, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// An outbound line contained the delimiter itself.
    #[error("outbound line contains an embedded newline")]
    EmbeddedDelimiter,

    /// An I/O error occurred while reading or writing lines.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached EOF.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
