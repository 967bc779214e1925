//! Notifications pushed by the server on the query connection.

use crate::codec::{self, Record};

/// Notification type token for chat messages.
pub const TEXT_MESSAGE: &str = "notifytextmessage";

/// An unsolicited notification: its type token and decoded fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: String,
    pub fields: Record,
}

impl Notification {
    pub fn parse(line: &str) -> Option<Self> {
        let (kind, fields) = codec::decode_event(line)?;
        Some(Self { kind, fields })
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Where a chat message was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    Private = 1,
    Channel = 2,
    Server = 3,
}

impl TargetMode {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "1" => Some(TargetMode::Private),
            "2" => Some(TargetMode::Channel),
            "3" => Some(TargetMode::Server),
            _ => None,
        }
    }

    pub fn as_wire(self) -> u8 {
        self as u8
    }
}

/// Event-registration scope names for each chat mode.
pub const TEXT_SCOPES: [&str; 3] = ["textserver", "textchannel", "textprivate"];

/// A decoded `notifytextmessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub mode: TargetMode,
    pub invoker_id: u64,
    pub invoker_name: Option<String>,
    pub invoker_uid: Option<String>,
    /// Recipient client id for private messages; absent for channel/server chat.
    pub target: Option<u64>,
    pub text: String,
}

impl TextMessage {
    /// `None` for other notification types or when required fields are missing.
    pub fn from_notification(event: &Notification) -> Option<Self> {
        if event.kind != TEXT_MESSAGE {
            return None;
        }
        let mode = TargetMode::from_wire(event.get("targetmode")?)?;
        let invoker_id = event.get("invokerid")?.parse().ok()?;
        let text = event.get("msg")?.to_string();
        Some(Self {
            mode,
            invoker_id,
            invoker_name: event
                .get("invokername")
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            invoker_uid: event.get("invokeruid").map(str::to_string),
            target: event.get("target").and_then(|t| t.parse().ok()),
            text,
        })
    }
}
