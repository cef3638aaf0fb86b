//! Sync error taxonomy.
//!
//! Every failure the gateway surfaces, and every fault a channel
//! connection logs, is one of these variants. Values are `Clone` so a
//! view model can carry the last snapshot error for inline display.

use std::time::Duration;

use thiserror::Error;

/// Normalized error for gateway calls and channel diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The call exceeded its deadline and the transport was aborted.
    #[error("request to {path} timed out after {after:?}")]
    Timeout {
        /// Logical endpoint path.
        path: String,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// Network or socket failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session is no longer valid; the login redirect has been requested.
    #[error("session expired, please log in again")]
    AuthExpired,

    /// Non-success response with a human-readable message.
    #[error("{message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Server-provided `detail`, or a generic status message.
        message: String,
    },

    /// The server refused this channel for the current session.
    #[error("channel {channel} is forbidden for this session")]
    ForbiddenChannel {
        /// Channel name.
        channel: String,
    },

    /// Malformed or unexpected payload.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Short label used for metrics and structured logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Transport(_) => "transport",
            Self::AuthExpired => "auth_expired",
            Self::Http { .. } => "http",
            Self::ForbiddenChannel { .. } => "forbidden",
            Self::Protocol(_) => "protocol",
        }
    }

    /// Whether this error came from the deadline firing.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
