//! Turns chat messages into authorized bulk actions.

use std::sync::Arc;

use squery_sdk::{Connection, TextMessage};

use crate::actions::{self, ActionReport, Invoker};
use crate::commands::{Action, CommandRule, Registry};
use crate::config::CommandsConfig;

/// Name used when neither the event nor `clientinfo` gives one.
const UNKNOWN_INVOKER: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercase, without the prefix.
    pub name: String,
    pub args: Vec<String>,
}

impl ParsedCommand {
    /// Arguments joined back with single spaces, `None` when there are none.
    pub fn rest(&self) -> Option<String> {
        (!self.args.is_empty()).then(|| self.args.join(" "))
    }
}

/// Split `!name arg arg` into its parts. `None` for plain chat.
pub fn parse_command(text: &str, prefix: &str) -> Option<ParsedCommand> {
    let body = text.trim_start().strip_prefix(prefix)?;
    // A prefix followed by a space is not a command.
    if body.starts_with(char::is_whitespace) {
        return None;
    }
    let mut tokens = body.split_whitespace();
    let name = tokens.next()?.to_lowercase();
    Some(ParsedCommand {
        name,
        args: tokens.map(str::to_string).collect(),
    })
}

/// What happened to one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not a command, or sent by the bot itself.
    Ignored,
    Unknown(String),
    Denied {
        command: String,
        required_group: u64,
    },
    Executed {
        command: String,
        report: ActionReport,
    },
    Failed {
        command: String,
        error: String,
    },
}

pub struct Router {
    registry: Arc<Registry>,
    config: CommandsConfig,
}

impl Router {
    pub fn new(registry: Registry, config: CommandsConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
        }
    }

    pub async fn handle(&self, connection: &Connection, message: &TextMessage) -> Outcome {
        if message.invoker_id == connection.client_id() {
            return Outcome::Ignored;
        }
        let Some(parsed) = parse_command(&message.text, &self.config.prefix) else {
            return Outcome::Ignored;
        };
        let Some(rule) = self.registry.lookup(&parsed.name) else {
            tracing::info!(command = %parsed.name, invoker = message.invoker_id, "Unknown command");
            return Outcome::Unknown(parsed.name);
        };

        let info = match connection.channel().client_info(message.invoker_id).await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(invoker = message.invoker_id, error = %e, "Could not look up invoker");
                None
            }
        };
        let invoker = Invoker {
            id: message.invoker_id,
            name: message
                .invoker_name
                .clone()
                .or_else(|| info.as_ref().map(|i| i.nickname.clone()))
                .unwrap_or_else(|| UNKNOWN_INVOKER.to_string()),
        };

        if let Some(group) = rule.required_group
            && !info.as_ref().is_some_and(|i| i.in_group(group))
        {
            self.deny(connection, &invoker, rule).await;
            return Outcome::Denied {
                command: rule.name.to_string(),
                required_group: group,
            };
        }

        tracing::info!(command = rule.name, invoker = %invoker.name, "Running command");
        let result = match rule.action {
            Action::MassPoke => {
                let text = parsed.rest().unwrap_or_else(|| self.config.default_poke_text.clone());
                actions::mass_poke(connection, &invoker, &text).await
            }
            Action::MassMove => actions::mass_move(connection, &invoker).await,
            Action::MassKick => {
                let text = parsed.rest().unwrap_or_else(|| self.config.default_kick_text.clone());
                actions::mass_kick(connection, &invoker, &text).await
            }
            Action::ListClients => actions::log_clients(connection).await,
        };
        match result {
            Ok(report) => Outcome::Executed {
                command: rule.name.to_string(),
                report,
            },
            Err(e) => {
                tracing::error!(command = rule.name, error = %e, "Command failed");
                Outcome::Failed {
                    command: rule.name.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn deny(&self, connection: &Connection, invoker: &Invoker, rule: &CommandRule) {
        tracing::info!(command = rule.name, invoker = %invoker.name, "Permission denied");
        let notice = format!(
            "You do not have permission to use {}{}",
            self.config.prefix, rule.name
        );
        match connection.channel().send_private(invoker.id, &notice).await {
            Ok(response) if response.is_ok() => {}
            Ok(response) => tracing::warn!(status = %response.status, "Denial notice refused"),
            Err(e) => tracing::warn!(error = %e, "Denial notice not sent"),
        }
    }
}
