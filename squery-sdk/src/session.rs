//! Connection lifecycle: connect, authenticate, bind, register events,
//! probe liveness and reconnect within a bounded budget.
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Ready
//!                                                   |  liveness failure
//!                                                   v
//!        Closed <- (budget exhausted) <- Reconnecting -> ... -> Ready
//! ```
//!
//! Only [`Session`] mutates the state; everyone else observes it through
//! [`Session::subscribe`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::channel::CommandChannel;
use crate::codec::Command;
use crate::demux::{Demultiplexer, EventReceiver};
use crate::error::{QueryError, Result};
use crate::event::TEXT_SCOPES;
use crate::transport::Transport;

/// Timeout for the best-effort `logout`/`quit` on the way out.
const GOODBYE_TIMEOUT: Duration = Duration::from_secs(2);

/// Parameters for a session. Immutable once the session is built.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Virtual server to bind with `use`. `None` for server-bound logins.
    pub server_id: Option<u64>,
    /// Display name applied with `clientupdate` once bound.
    pub nickname: Option<String>,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub liveness_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 10011,
            username: "serveradmin".to_string(),
            password: String::new(),
            server_id: Some(1),
            nickname: None,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            liveness_interval: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Reconnecting,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// An authenticated, bound query connection.
pub struct Connection {
    channel: CommandChannel,
    client_id: u64,
    server_id: u64,
}

impl Connection {
    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    /// The query session's own client id on the bound server.
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn server_id(&self) -> u64 {
        self.server_id
    }

    pub fn is_closed(&self) -> bool {
        self.channel.demux().is_closed()
    }

    /// Resolves when the underlying stream ends.
    pub async fn closed(&self) {
        self.channel.demux().closed().await
    }

    /// Best-effort `logout` + `quit`, then close the write half.
    pub async fn close(&self) {
        if !self.is_closed() {
            for verb in ["logout", "quit"] {
                if let Err(e) = self.channel.execute(&Command::new(verb), GOODBYE_TIMEOUT).await {
                    tracing::debug!(verb, error = %e, "Goodbye command failed");
                    break;
                }
            }
        }
        self.channel.demux().shutdown().await;
    }
}

/// Drives one [`Connection`] at a time through its lifecycle.
pub struct Session {
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    connection: Option<Arc<Connection>>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            state,
            connection: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.clone()
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "Session state");
        }
    }

    /// Run the full `Disconnected -> Ready` sequence.
    ///
    /// Any existing connection is closed first. On failure the session is
    /// back in `Disconnected` and the cause is returned.
    pub async fn connect(&mut self) -> Result<(Arc<Connection>, EventReceiver)> {
        if let Some(old) = self.connection.take() {
            old.close().await;
        }
        self.set_state(SessionState::Connecting);
        match self.establish().await {
            Ok((connection, events)) => {
                tracing::info!(
                    client_id = connection.client_id,
                    server_id = connection.server_id,
                    "Query session ready"
                );
                self.connection = Some(connection.clone());
                self.set_state(SessionState::Ready);
                Ok((connection, events))
            }
            Err(e) => {
                tracing::error!(error = %e, "Connection attempt failed");
                self.set_state(SessionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<(Arc<Connection>, EventReceiver)> {
        let config = &self.config;
        tracing::info!(host = %config.host, port = config.port, "Connecting to query port");
        let mut transport = Transport::connect(&config.host, config.port, config.connect_timeout).await?;
        let welcome = transport.read_welcome(config.connect_timeout).await?;
        tracing::debug!(welcome = %welcome, "Greeting received");

        self.set_state(SessionState::Authenticating);
        let (demux, events) = Demultiplexer::spawn(transport);
        let channel = CommandChannel::new(Arc::new(demux), config.command_timeout);

        tracing::info!(username = %config.username, "Authenticating");
        channel.login(&config.username, &config.password).await?;

        if let Some(server_id) = config.server_id {
            channel.use_server(server_id).await?;
            tracing::info!(server_id, "Virtual server selected");
        }

        if let Some(nickname) = &config.nickname {
            match channel.set_nickname(nickname).await {
                Ok(r) if r.is_ok() => {}
                Ok(r) => tracing::warn!(status = %r.status, "Could not set nickname"),
                Err(e) => tracing::warn!(error = %e, "Could not set nickname"),
            }
        }

        let me = channel.whoami().await?;
        register_text_events(&channel).await;

        let connection = Connection {
            channel,
            client_id: me.client_id,
            server_id: me.server_id,
        };
        Ok((Arc::new(connection), events))
    }

    /// `whoami` round trip; any failure, timeout included, means not alive.
    pub async fn is_alive(&self) -> bool {
        let Some(connection) = &self.connection else {
            return false;
        };
        if connection.is_closed() {
            return false;
        }
        match connection.channel().send(&Command::new("whoami")).await {
            Ok(response) if response.is_ok() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status, "Liveness probe rejected");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Liveness probe failed");
                false
            }
        }
    }

    /// Close the current connection: close transport, wait the fixed delay,
    /// connect again. Gives up after `max_reconnect_attempts` failures.
    pub async fn reconnect(&mut self) -> Result<(Arc<Connection>, EventReceiver)> {
        let max = self.config.max_reconnect_attempts;
        for attempt in 1..=max {
            self.set_state(SessionState::Reconnecting);
            tracing::info!(attempt, max, "Reconnecting");
            if let Some(old) = self.connection.take() {
                old.close().await;
            }
            tokio::time::sleep(self.config.reconnect_delay).await;

            match self.connect().await {
                Ok(ready) => return Ok(ready),
                Err(e) => tracing::warn!(attempt, max, error = %e, "Reconnect attempt failed"),
            }
        }
        self.set_state(SessionState::Closed);
        tracing::error!(attempts = max, "Reconnect budget exhausted");
        Err(QueryError::ReconnectExhausted { attempts: max })
    }

    /// Log out and close. The session can be connected again afterwards.
    pub async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
            tracing::info!("Disconnected from server");
        }
        self.set_state(SessionState::Disconnected);
    }

    /// Connect, hand each ready connection to `on_ready` (spawned as its own
    /// task), and keep the session alive until `shutdown` resolves.
    ///
    /// The liveness probe runs every `liveness_interval`; a failed probe or a
    /// closed stream starts a reconnect. Stop requests and stream loss are
    /// seen even while the probe waits for its turn. Returns `Err` only for an initial
    /// connect failure or an exhausted reconnect budget.
    pub async fn run<S, F, Fut>(&mut self, shutdown: S, on_ready: F) -> Result<()>
    where
        S: Future<Output = ()>,
        F: Fn(Arc<Connection>, EventReceiver) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (mut connection, events) = match self.connect().await {
            Ok(ready) => ready,
            Err(e) => {
                self.set_state(SessionState::Closed);
                return Err(e);
            }
        };
        let mut worker = tokio::spawn(on_ready(connection.clone(), events));

        let mut liveness = tokio::time::interval(self.config.liveness_interval);
        liveness.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        liveness.tick().await;
        tokio::pin!(shutdown);

        loop {
            let lost = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Stop requested");
                    break;
                }
                // The probe may wait behind a long command; it is dropped
                // if either of the other arms fires first.
                lost = async {
                    liveness.tick().await;
                    !self.is_alive().await
                } => lost,
                _ = connection.closed() => {
                    tracing::warn!("Query connection dropped");
                    true
                }
            };
            if !lost {
                tracing::debug!("Liveness probe ok");
                continue;
            }

            tracing::warn!("Connection lost, reconnecting");
            worker.abort();
            let (next, events) = self.reconnect().await?;
            connection = next;
            worker = tokio::spawn(on_ready(connection.clone(), events));
            liveness.reset();
        }

        worker.abort();
        self.disconnect().await;
        self.set_state(SessionState::Closed);
        Ok(())
    }
}

/// Subscribe to server, channel and private chat. A scope that fails to
/// register is logged and skipped.
async fn register_text_events(channel: &CommandChannel) {
    for scope in TEXT_SCOPES {
        match channel.register_event(scope).await {
            Ok(response) if response.is_ok() => tracing::debug!(scope, "Event scope registered"),
            Ok(response) => {
                tracing::warn!(scope, status = %response.status, "Event scope not registered")
            }
            Err(e) => tracing::warn!(scope, error = %e, "Event scope not registered"),
        }
    }
}
