//! The SDK's scripted server, populated with a small fixed world:
//!
//! | clid | cid | nickname    | type  | server groups            |
//! |------|-----|-------------|-------|--------------------------|
//! | 5    | 1   | bot (us)    | user  | -                        |
//! | 7    | 3   | Ann         | user  | 6, 25770, 25771, 25787   |
//! | 8    | 2   | Bob         | user  | 8                        |
//! | 9    | 3   | Cat         | user  | 8                        |
//! | 10   | 1   | serveradmin | query | -                        |
//!
//! The bot's own entry is listed as a regular client so the self-exclusion
//! is what keeps it out of every target set.

#![allow(dead_code)]

use std::sync::Arc;

use squery_sdk::{Connection, EventReceiver, Session, SessionConfig};

#[path = "../../../squery-sdk/tests/common/mod.rs"]
mod server;
pub use server::*;

pub const CLIENTS: &str = "clid=5 cid=1 client_database_id=1 client_nickname=bot client_type=0\
    |clid=7 cid=3 client_database_id=2 client_nickname=Ann client_type=0\
    |clid=8 cid=2 client_database_id=3 client_nickname=Bob client_type=0\
    |clid=9 cid=3 client_database_id=4 client_nickname=Cat client_type=0\
    |clid=10 cid=1 client_database_id=1 client_nickname=serveradmin client_type=1";

pub fn invalid_client() -> Step {
    line("error id=512 msg=invalid\\sclientID")
}

/// The fixed world above on top of the SDK handshake script; `extra` gets
/// first say on every command.
pub fn world(extra: impl Fn(&str) -> Option<Vec<Step>> + Send + Sync + 'static) -> Script {
    standard(move |command: &str| {
        if let Some(steps) = extra(command) {
            return Some(steps);
        }
        let verb = command.split(' ').next().unwrap_or("");
        match (verb, command) {
            (_, "clientinfo clid=7") => Some(vec![
                line("cid=3 client_nickname=Ann client_type=0 client_servergroups=6,25770,25771,25787"),
                ok(),
            ]),
            (_, "clientinfo clid=8") => Some(vec![
                line("cid=2 client_nickname=Bob client_type=0 client_servergroups=8"),
                ok(),
            ]),
            ("clientinfo", _) => Some(vec![invalid_client()]),
            ("clientlist", _) => Some(vec![line(CLIENTS), ok()]),
            ("serverinfo", _) => Some(vec![
                line("virtualserver_name=Test\\sServer virtualserver_clientsonline=5 virtualserver_maxclients=32 virtualserver_uptime=3600"),
                ok(),
            ]),
            ("clientpoke" | "clientmove" | "clientkick" | "sendtextmessage", _) => Some(vec![ok()]),
            _ => None,
        }
    })
}

pub struct Bot {
    pub session: Session,
    pub connection: Arc<Connection>,
    pub events: EventReceiver,
}

pub async fn connect(server: &FakeServer) -> Bot {
    let mut session = Session::new(SessionConfig {
        host: "127.0.0.1".to_string(),
        port: server.addr.port(),
        username: "bot".to_string(),
        password: "secret".to_string(),
        connect_timeout: TIMEOUT,
        command_timeout: TIMEOUT,
        ..Default::default()
    });
    let (connection, events) = session.connect().await.unwrap();
    Bot {
        session,
        connection,
        events,
    }
}
