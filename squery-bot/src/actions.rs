//! Bulk moderation actions over every connected user.
//!
//! Each action lists clients once, then issues one command per target and
//! keeps going when a single client fails. Nothing is rolled back: running
//! an action again simply affects whoever is still eligible.

use std::future::Future;

use squery_sdk::{Client, Connection, QueryError, Response};

/// Aggregate outcome of one bulk action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionReport {
    pub attempted: usize,
    pub affected: usize,
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("cannot resolve the channel of client {invoker}: {source}")]
    NoDestination {
        invoker: u64,
        #[source]
        source: QueryError,
    },
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// The client who issued a command, as shown in action messages.
#[derive(Debug, Clone)]
pub struct Invoker {
    pub id: u64,
    pub name: String,
}

/// Regular users other than the bot itself, in list order.
pub fn eligible_targets(clients: Vec<Client>, own_id: u64) -> Vec<Client> {
    clients
        .into_iter()
        .filter(|c| c.is_regular() && c.id != own_id)
        .collect()
}

/// One `clientlist` query, filtered to eligible targets.
pub async fn list_clients(connection: &Connection) -> Result<Vec<Client>, QueryError> {
    let clients = connection.channel().client_list().await?;
    Ok(eligible_targets(clients, connection.client_id()))
}

pub fn poke_message(invoker: &str, text: &str) -> String {
    format!("[COLOR=#FF0000]{invoker}[/COLOR] pokes everyone: {text}")
}

pub fn kick_reason(invoker: &str, text: &str) -> String {
    format!("[COLOR=#FF0000]{invoker}[/COLOR] kicked everyone: {text}")
}

pub async fn mass_poke(
    connection: &Connection,
    invoker: &Invoker,
    text: &str,
) -> Result<ActionReport, ActionError> {
    let targets = list_clients(connection).await?;
    let message = poke_message(&invoker.name, text);
    let channel = connection.channel();
    let message = message.as_str();
    let report = for_each_target(&targets, "poke", move |id| channel.poke(id, message)).await;
    tracing::info!(
        invoker = %invoker.name,
        poked = report.affected,
        failed = report.failed,
        "Mass poke done"
    );
    Ok(report)
}

/// Move everyone to the invoker's channel.
///
/// The destination is resolved before anything moves; if it can't be, no
/// client is touched.
pub async fn mass_move(connection: &Connection, invoker: &Invoker) -> Result<ActionReport, ActionError> {
    let channel = connection.channel();
    let destination = channel
        .client_info(invoker.id)
        .await
        .map_err(|source| ActionError::NoDestination {
            invoker: invoker.id,
            source,
        })?
        .channel_id;

    let targets: Vec<Client> = list_clients(connection)
        .await?
        .into_iter()
        .filter(|c| c.id != invoker.id && c.channel_id != destination)
        .collect();
    let report = for_each_target(&targets, "move", move |id| channel.move_client(id, destination)).await;
    tracing::info!(
        invoker = %invoker.name,
        channel = destination,
        moved = report.affected,
        failed = report.failed,
        "Mass move done"
    );
    Ok(report)
}

pub async fn mass_kick(
    connection: &Connection,
    invoker: &Invoker,
    text: &str,
) -> Result<ActionReport, ActionError> {
    let targets = list_clients(connection).await?;
    let reason = kick_reason(&invoker.name, text);
    let channel = connection.channel();
    let reason = reason.as_str();
    let report = for_each_target(&targets, "kick", move |id| channel.kick_from_server(id, reason)).await;
    tracing::info!(
        invoker = %invoker.name,
        kicked = report.affected,
        failed = report.failed,
        "Mass kick done"
    );
    Ok(report)
}

/// Log every eligible client.
pub async fn log_clients(connection: &Connection) -> Result<ActionReport, ActionError> {
    let clients = list_clients(connection).await?;
    tracing::info!(count = clients.len(), "Eligible clients");
    for client in &clients {
        tracing::info!(id = client.id, channel = client.channel_id, nickname = %client.nickname, "Client");
    }
    Ok(ActionReport {
        attempted: clients.len(),
        affected: 0,
        failed: 0,
    })
}

async fn for_each_target<F, Fut>(targets: &[Client], verb: &str, mut act: F) -> ActionReport
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = squery_sdk::Result<Response>>,
{
    let mut report = ActionReport::default();
    for client in targets {
        report.attempted += 1;
        match act(client.id).await {
            Ok(response) if response.is_ok() => {
                report.affected += 1;
                tracing::debug!(verb, id = client.id, nickname = %client.nickname, "Done");
            }
            Ok(response) => {
                report.failed += 1;
                tracing::warn!(verb, id = client.id, nickname = %client.nickname, status = %response.status, "Refused");
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(verb, id = client.id, nickname = %client.nickname, error = %e, "Failed");
            }
        }
    }
    report
}
