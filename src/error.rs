use std::fmt;

/// Error returned when formatting a log event.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    /// A required input or configuration value is unusable. Nothing was
    /// written.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying sink rejected a write. The current line may be
    /// partially written.
    #[error("failed to write to sink")]
    Write(#[from] fmt::Error),

    /// A property value could not be serialized. The current line may be
    /// partially written.
    #[error("failed to serialize property value: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FormatError {
    fn from(err: serde_json::Error) -> Self {
        FormatError::Serialization(err.to_string())
    }
}
