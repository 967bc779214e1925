//! Request/response façade over the [`Demultiplexer`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::codec::{Command, Response};
use crate::demux::Demultiplexer;
use crate::error::{QueryError, Result};

/// Serialises commands so at most one is in flight per connection.
///
/// Callers queue on a fair (FIFO) async mutex; the holder submits its
/// command and waits for the terminator or its deadline. A timed-out call
/// leaves the server-side outcome unknown, so the channel is flagged
/// degraded and the session should reconnect rather than retry.
///
/// Dropping an `execute` future mid-wait is safe: the turn and the
/// in-flight slot are both released, and the late reply is discarded.
pub struct CommandChannel {
    demux: Arc<Demultiplexer>,
    turn: tokio::sync::Mutex<()>,
    default_timeout: Duration,
    degraded: AtomicBool,
}

impl CommandChannel {
    pub fn new(demux: Arc<Demultiplexer>, default_timeout: Duration) -> Self {
        Self {
            demux,
            turn: tokio::sync::Mutex::new(()),
            default_timeout,
            degraded: AtomicBool::new(false),
        }
    }

    /// Execute with the channel's default timeout.
    pub async fn send(&self, command: &Command) -> Result<Response> {
        self.execute(command, self.default_timeout).await
    }

    /// Execute one command and wait for its complete response.
    ///
    /// A non-zero status is returned as `Ok(response)`.
    pub async fn execute(&self, command: &Command, timeout: Duration) -> Result<Response> {
        let _turn = self.turn.lock().await;
        tracing::debug!(command = %command.redacted(), "->");

        let mut ticket = self.demux.submit(&command.encode()).await?;
        match tokio::time::timeout(timeout, ticket.reply()).await {
            Ok(result) => {
                if let Err(e) = &result
                    && e.is_connection_fault()
                {
                    self.degraded.store(true, Ordering::Relaxed);
                }
                result
            }
            Err(_) => {
                // Dropping the ticket abandons the slot.
                drop(ticket);
                self.degraded.store(true, Ordering::Relaxed);
                tracing::warn!(verb = command.verb(), ?timeout, "Command timed out, connection degraded");
                Err(QueryError::Timeout(timeout))
            }
        }
    }

    /// Set after a timeout or lost connection; a reconnect is advised.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed) || self.demux.is_closed()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn demux(&self) -> &Demultiplexer {
        &self.demux
    }
}
