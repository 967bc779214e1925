//! Error taxonomy for ServerQuery sessions.

use std::time::Duration;

use crate::codec::Status;

/// Everything that can go wrong between issuing a command and reading its
/// terminator, plus the session-level failures layered on top.
///
/// A non-zero `error id` on an otherwise well-formed response is *not* an
/// error at the [`CommandChannel`](crate::channel::CommandChannel) level: it
/// comes back as a [`Response`](crate::codec::Response) carrying that status.
/// Only the typed helpers that need a successful payload turn it into
/// [`QueryError::Command`].
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("connection lost")]
    ConnectionLost,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server rejected command: {0}")]
    Command(Status),

    #[error("authentication failed: {0}")]
    AuthFailed(Status),

    #[error("gave up after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl QueryError {
    /// Errors after which the connection can no longer be trusted to pair
    /// commands with responses.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            QueryError::Io(_)
                | QueryError::ConnectTimeout { .. }
                | QueryError::ConnectionLost
                | QueryError::Timeout(_)
                | QueryError::Protocol(_)
        )
    }
}

pub type Result<T, E = QueryError> = std::result::Result<T, E>;
