//! Error types for SMTP operations.

use std::io;
use std::time::Duration;

use crate::connection::Stage;
use crate::message::ValidationError;
use crate::parser::MalformedReply;
use crate::types::{Reply, ReplyCode};

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
///
/// Every error raised after validation carries the [`Stage`] it occurred at,
/// and the rendered message always names that stage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The message was rejected before any network activity.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// TCP connection could not be established.
    #[error("failed to dial {addr}: {source}")]
    Connect {
        /// `host:port` that was dialed.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// TLS handshake with the server failed.
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] io::Error),

    /// Configured host is not a valid TLS server name.
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// A stage did not complete within its deadline.
    #[error("timeout during {stage} after {after:?}")]
    Timeout {
        /// Stage that timed out.
        stage: Stage,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// I/O error while talking to the server.
    #[error("{stage} failed: {source}")]
    Io {
        /// Stage being driven when the error happened.
        stage: Stage,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Server answered with a different reply code than the stage expects.
    #[error("{stage} failed: expected {expected}, got {reply}")]
    UnexpectedReply {
        /// Stage that rejected the reply.
        stage: Stage,
        /// Code the stage requires.
        expected: ReplyCode,
        /// Reply actually received.
        reply: Reply,
    },

    /// Server sent something that is not an SMTP reply.
    #[error("{stage} failed: {source}")]
    Malformed {
        /// Stage being driven when the reply arrived.
        stage: Stage,
        /// Parser diagnostic.
        #[source]
        source: MalformedReply,
    },
}

impl Error {
    /// Returns the stage this error occurred at, if it happened on the wire.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Validation(_) => None,
            Self::Connect { .. } | Self::Tls(_) | Self::InvalidDnsName(_) => {
                Some(Stage::TlsEstablished)
            }
            Self::Timeout { stage, .. }
            | Self::Io { stage, .. }
            | Self::UnexpectedReply { stage, .. }
            | Self::Malformed { stage, .. } => Some(*stage),
        }
    }

    /// Returns the server reply code, if the error came from a server reply.
    #[must_use]
    pub const fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            Self::UnexpectedReply { reply, .. } => Some(reply.code),
            _ => None,
        }
    }

    /// Returns true if the server rejected a command with a permanent (5xx) code.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::UnexpectedReply { reply, .. } if reply.code.is_permanent())
    }

    /// Returns true if the server rejected a command with a transient (4xx) code.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::UnexpectedReply { reply, .. } if reply.code.is_transient())
    }
}
