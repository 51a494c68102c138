//! Error types shared by the log and the session plumbing.

use std::time::Duration;

use thiserror::Error;

/// A seek command carried the tag but its arguments could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("seek arguments must be `<index>,<offset>`, got {0:?}")]
    MissingSeparator(String),

    #[error("invalid {field} in seek command: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("seek arguments are not valid UTF-8")]
    NotUtf8,
}

/// A seek pointed outside the content currently retained by the log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("entry index {index} out of range ({count} entries retained)")]
    Index { index: usize, count: usize },

    #[error("byte offset {offset} out of range for entry {index} of {len} bytes")]
    Offset {
        index: usize,
        offset: usize,
        len: usize,
    },
}

/// Failures of a single log operation. None of them affect other sessions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("could not allocate {requested} bytes for log storage")]
    Allocation { requested: usize },

    #[error("timed out after {waited:?} waiting for the log lock")]
    LockTimeout { waited: Duration },
}

impl LogError {
    /// Whether the caller may simply try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LogError::LockTimeout { .. })
    }
}

/// Why one client command produced no reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Log(#[from] LogError),
}

impl CommandError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CommandError::Protocol(_) => false,
            CommandError::Log(err) => err.is_retryable(),
        }
    }
}

impl From<RangeError> for CommandError {
    fn from(err: RangeError) -> Self {
        CommandError::Log(LogError::Range(err))
    }
}
