//! Typed views over response records. Rebuilt on every query, never cached.

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::codec::Record;
use crate::error::{QueryError, Result};

fn field<'a>(record: &'a Record, name: &str) -> Result<&'a str> {
    record
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| QueryError::Protocol(format!("missing field {name}")))
}

fn parsed<T: FromStr>(record: &Record, name: &str) -> Result<T> {
    let raw = field(record, name)?;
    raw.parse()
        .map_err(|_| QueryError::Protocol(format!("invalid {name}={raw:?}")))
}

fn optional<T: FromStr>(record: &Record, name: &str) -> Option<T> {
    record.get(name).and_then(|raw| raw.parse().ok())
}

/// Whether a connected client is a person or another query session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    Regular,
    Query,
}

impl ClientType {
    fn from_wire(raw: &str) -> Result<Self> {
        match raw {
            "0" => Ok(ClientType::Regular),
            "1" => Ok(ClientType::Query),
            other => Err(QueryError::Protocol(format!("unknown client_type {other:?}"))),
        }
    }
}

/// One entry of `clientlist`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: u64,
    pub channel_id: u64,
    pub database_id: Option<u64>,
    pub nickname: String,
    pub kind: ClientType,
}

impl Client {
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: parsed(record, "clid")?,
            channel_id: parsed(record, "cid")?,
            database_id: optional(record, "client_database_id"),
            nickname: field(record, "client_nickname")?.to_string(),
            kind: ClientType::from_wire(field(record, "client_type")?)?,
        })
    }

    pub fn is_regular(&self) -> bool {
        self.kind == ClientType::Regular
    }
}

/// Result of `clientinfo clid=<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: u64,
    pub channel_id: u64,
    pub nickname: String,
    pub kind: ClientType,
    pub server_groups: BTreeSet<u64>,
}

impl ClientInfo {
    /// `clientinfo` does not echo the client id, so the caller supplies it.
    pub fn from_record(id: u64, record: &Record) -> Result<Self> {
        let server_groups = record
            .get("client_servergroups")
            .map(|raw| {
                raw.split(',')
                    .filter(|g| !g.is_empty())
                    .filter_map(|g| g.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            id,
            channel_id: parsed(record, "cid")?,
            nickname: field(record, "client_nickname")?.to_string(),
            kind: ClientType::from_wire(record.get("client_type").map_or("0", String::as_str))?,
            server_groups,
        })
    }

    pub fn in_group(&self, group: u64) -> bool {
        self.server_groups.contains(&group)
    }
}

/// Result of `whoami`: who the query session itself is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoAmI {
    pub client_id: u64,
    pub server_id: u64,
    pub channel_id: u64,
    pub nickname: Option<String>,
}

impl WhoAmI {
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            client_id: parsed(record, "client_id")?,
            server_id: optional(record, "virtualserver_id").unwrap_or(0),
            channel_id: optional(record, "client_channel_id").unwrap_or(0),
            nickname: record.get("client_nickname").cloned(),
        })
    }
}

/// Subset of `serverinfo` logged when a session becomes ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub clients_online: u32,
    pub max_clients: u32,
    pub uptime_secs: u64,
    pub port: Option<u16>,
}

impl ServerInfo {
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            name: field(record, "virtualserver_name")?.to_string(),
            clients_online: optional(record, "virtualserver_clientsonline").unwrap_or(0),
            max_clients: optional(record, "virtualserver_maxclients").unwrap_or(0),
            uptime_secs: optional(record, "virtualserver_uptime").unwrap_or(0),
            port: optional(record, "virtualserver_port"),
        })
    }
}
