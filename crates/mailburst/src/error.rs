//! Error types for dispatching.

use thiserror::Error;

/// Errors that can occur while dispatching messages.
#[derive(Debug, Error)]
pub enum Error {
    /// A single send attempt failed.
    #[error(transparent)]
    Smtp(#[from] mailburst_smtp::Error),

    /// Every allowed attempt failed, or a failure was not worth retrying.
    #[error("failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Attempts actually made.
        attempts: u32,
        /// Error of the last attempt.
        #[source]
        source: mailburst_smtp::Error,
    },

    /// The message never reached a worker.
    #[error("message not queued: {0}")]
    NotQueued(#[from] SubmitError),

    /// The operation is only allowed before the pool starts.
    #[error("dispatch pool already started")]
    AlreadyStarted,

    /// The result stream was already handed out by `results()`.
    #[error("result stream already taken")]
    ResultsTaken,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the underlying SMTP error, if any.
    #[must_use]
    pub const fn smtp(&self) -> Option<&mailburst_smtp::Error> {
        match self {
            Self::Smtp(source) | Self::RetriesExhausted { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Why a message was not accepted by [`DispatchPool::submit`](crate::DispatchPool::submit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// `start()` has not been called yet.
    #[error("dispatch pool not started")]
    NotStarted,

    /// `stop()` has been called.
    #[error("dispatch pool is shutting down")]
    ShuttingDown,

    /// The job queue is at capacity.
    #[error("job queue is full")]
    QueueFull,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
