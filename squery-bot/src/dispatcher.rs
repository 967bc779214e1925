//! Event loop for one ready connection.

use std::sync::Arc;

use squery_sdk::{Connection, EventReceiver, TextMessage};

use crate::actions;
use crate::router::{Outcome, Router};

/// Entry point handed to `Session::run`: log an overview of the server,
/// then dispatch events until the connection's queue closes.
pub async fn serve(connection: Arc<Connection>, events: EventReceiver, router: Arc<Router>) {
    log_overview(&connection).await;
    run(connection, events, router).await;
}

/// Feed chat messages to the router, one at a time and in arrival order.
/// Other notifications are dropped.
pub async fn run(connection: Arc<Connection>, mut events: EventReceiver, router: Arc<Router>) {
    while let Some(event) = events.recv().await {
        let Some(message) = TextMessage::from_notification(&event) else {
            tracing::trace!(kind = %event.kind, "Ignoring notification");
            continue;
        };
        tracing::debug!(
            invoker = message.invoker_id,
            mode = ?message.mode,
            text = %message.text,
            "Text message"
        );
        match router.handle(&connection, &message).await {
            Outcome::Ignored => {}
            outcome => tracing::debug!(?outcome, "Message handled"),
        }
    }
    tracing::debug!("Event queue closed");
}

async fn log_overview(connection: &Connection) {
    match connection.channel().server_info().await {
        Ok(info) => tracing::info!(
            name = %info.name,
            clients = info.clients_online,
            max_clients = info.max_clients,
            uptime_secs = info.uptime_secs,
            "Server overview"
        ),
        Err(e) => tracing::warn!(error = %e, "Could not fetch server info"),
    }
    if let Err(e) = actions::log_clients(connection).await {
        tracing::warn!(error = %e, "Could not list clients");
    }
}
