//! Command registry: which chat commands exist and who may run them.
//!
//! Built once from [`CommandsConfig`] at startup and never mutated, so the
//! router can share it freely.

use std::collections::BTreeMap;

use crate::config::CommandsConfig;

/// What a command does once authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    MassPoke,
    MassMove,
    MassKick,
    ListClients,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRule {
    /// Name without the prefix, lowercase.
    pub name: &'static str,
    pub action: Action,
    /// Server group the invoker must belong to. `None` means anyone.
    pub required_group: Option<u64>,
    pub help: &'static str,
}

#[derive(Debug, Clone)]
pub struct Registry {
    rules: BTreeMap<&'static str, CommandRule>,
}

impl Registry {
    pub fn new(config: &CommandsConfig) -> Self {
        let group = |id: u64| (id != 0).then_some(id);
        let rules = [
            CommandRule {
                name: "mp",
                action: Action::MassPoke,
                required_group: group(config.poke_group),
                help: "poke every client [text]",
            },
            CommandRule {
                name: "mm",
                action: Action::MassMove,
                required_group: group(config.move_group),
                help: "move every client to your channel",
            },
            CommandRule {
                name: "mk",
                action: Action::MassKick,
                required_group: group(config.kick_group),
                help: "kick every client from the server [reason]",
            },
            CommandRule {
                name: "test",
                action: Action::ListClients,
                required_group: None,
                help: "list connected clients in the bot log",
            },
        ];
        Self {
            rules: rules.into_iter().map(|rule| (rule.name, rule)).collect(),
        }
    }

    /// Case-insensitive lookup by name without the prefix.
    pub fn lookup(&self, name: &str) -> Option<&CommandRule> {
        self.rules.get(name.to_ascii_lowercase().as_str())
    }

    /// All rules, sorted by name.
    pub fn rules(&self) -> impl Iterator<Item = &CommandRule> {
        self.rules.values()
    }
}
