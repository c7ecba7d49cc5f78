/// Why a line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedKind {
    /// The line is not valid UTF-8.
    #[error("not valid UTF-8")]
    NotUtf8,

    /// Wrong number of comma-separated fields.
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// A numeric field did not parse as a float.
    #[error("field '{field}' is not a number")]
    InvalidNumber { field: &'static str },

    /// A numeric field parsed to NaN or infinity.
    #[error("field '{field}' is not finite")]
    NotFinite { field: &'static str },

    /// Runtime went below zero.
    #[error("runtime is negative")]
    NegativeRuntime,

    /// The element status token is empty.
    #[error("element status is empty")]
    EmptyStatus,

    /// A required key is absent from a command line.
    #[error("missing key '{0}'")]
    MissingKey(&'static str),

    /// The line is not a known command.
    #[error("unknown command")]
    UnknownCommand,
}

/// Errors that can occur while parsing or building messages.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MessageError {
    /// A frame failed validation. Recoverable: log and skip it.
    #[error("malformed frame ({kind}): {line:?}")]
    MalformedFrame { line: String, kind: MalformedKind },

    /// A value supplied for an outbound command is NaN or infinite.
    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    /// Operator input for an override is not a number.
    #[error("invalid {field} value {input:?}")]
    InvalidOverride { field: &'static str, input: String },

    /// A sample was built with an empty status token or negative runtime.
    #[error("invalid telemetry sample: {0}")]
    InvalidSample(MalformedKind),
}

impl MessageError {
    pub(crate) fn malformed(line: &str, kind: MalformedKind) -> Self {
        Self::MalformedFrame {
            line: line.to_string(),
            kind,
        }
    }

    /// True for frame-level errors that must never escalate past the parser.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedFrame { .. })
    }
}

pub type Result<T> = std::result::Result<T, MessageError>;
