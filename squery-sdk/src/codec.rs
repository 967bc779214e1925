//! ServerQuery wire format.
//!
//! Every command is one line: a verb followed by space-separated
//! `key=value` arguments (or `-flag` options). Values are escaped so they
//! never contain a raw space, pipe or newline. Responses are zero or more
//! data lines, each holding one or more `|`-separated records, followed by
//! exactly one status line:
//!
//! ```text
//! clid=1 cid=1 client_nickname=serveradmin\sfrom\s127.0.0.1 client_type=1|clid=7 cid=2 ...
//! error id=0 msg=ok
//! ```
//!
//! Notifications use the same record syntax but start with a `notify*`
//! token and never carry a status line.

use std::collections::HashMap;
use std::fmt;

/// One decoded record: field name to unescaped value. Bare flags map to "".
pub type Record = HashMap<String, String>;

/// Prefix of the line that terminates every command response.
pub const STATUS_PREFIX: &str = "error id=";

/// Prefix shared by every notification type token.
pub const NOTIFY_PREFIX: &str = "notify";

const ESCAPES: &[(char, &str)] = &[
    ('\\', "\\\\"),
    ('/', "\\/"),
    (' ', "\\s"),
    ('|', "\\p"),
    ('\x07', "\\a"),
    ('\x08', "\\b"),
    ('\x0c', "\\f"),
    ('\n', "\\n"),
    ('\r', "\\r"),
    ('\t', "\\t"),
    ('\x0b', "\\v"),
];

/// Escape a value for insertion into a command line.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match ESCAPES.iter().find(|(raw, _)| *raw == c) {
            Some((_, escaped)) => out.push_str(escaped),
            None => out.push(c),
        }
    }
    out
}

/// Reverse of [`escape`]. Unknown sequences are kept verbatim.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('s') => out.push(' '),
            Some('p') => out.push('|'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\x0b'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// An outbound command: verb plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Pair(String, String),
    Flag(String),
}

impl Command {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            args: Vec::new(),
        }
    }

    /// Append `key=value`; the value is escaped on [`encode`](Self::encode).
    pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args.push(Arg::Pair(key.into(), value.to_string()));
        self
    }

    /// Append a `-name` option.
    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.args.push(Arg::Flag(name.into()));
        self
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Wire form without the line terminator.
    pub fn encode(&self) -> String {
        let mut line = self.verb.clone();
        for arg in &self.args {
            line.push(' ');
            match arg {
                Arg::Pair(key, value) => {
                    line.push_str(key);
                    line.push('=');
                    line.push_str(&escape(value));
                }
                Arg::Flag(name) => {
                    line.push('-');
                    line.push_str(name);
                }
            }
        }
        line
    }

    /// Encoded line with secret values blanked, for logs.
    pub fn redacted(&self) -> String {
        match self.verb.as_str() {
            "login" => format!("{} <redacted>", self.verb),
            _ => self.encode(),
        }
    }
}

/// Terminal status of a command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub id: u32,
    pub msg: String,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            id: 0,
            msg: "ok".to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.id == 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (error id {})", self.msg, self.id)
    }
}

/// A complete command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub records: Vec<Record>,
    pub status: Status,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    /// Turn a non-zero status into [`QueryError::Command`](crate::QueryError::Command).
    pub fn into_result(self) -> crate::Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(crate::QueryError::Command(self.status))
        }
    }
}

/// Split one data line into its records.
pub fn decode_records(line: &str) -> Vec<Record> {
    let line = line.trim_matches(['\r', '\n']);
    if line.is_empty() {
        return Vec::new();
    }
    line.split('|').map(decode_fields).collect()
}

fn decode_fields(segment: &str) -> Record {
    segment
        .split(' ')
        .filter(|field| !field.is_empty())
        .map(|field| match field.split_once('=') {
            Some((key, value)) => (key.to_string(), unescape(value)),
            None => (field.to_string(), String::new()),
        })
        .collect()
}

/// Whether a line is a response terminator.
pub fn is_status_line(line: &str) -> bool {
    line.trim_start_matches(['\r', '\n']).starts_with(STATUS_PREFIX)
}

/// Whether a line is an unsolicited notification.
pub fn is_event_line(line: &str) -> bool {
    line.trim_start_matches(['\r', '\n']).starts_with(NOTIFY_PREFIX)
}

/// Parse `error id=<int> msg=<escaped>`; `None` if the line is not a status line.
pub fn decode_status(line: &str) -> Option<Status> {
    let line = line.trim_matches(['\r', '\n']);
    let rest = line.strip_prefix("error ")?;
    let fields = decode_fields(rest);
    let id = fields.get("id")?.parse().ok()?;
    let msg = fields.get("msg").cloned().unwrap_or_default();
    Some(Status { id, msg })
}

/// Split a notification into its type token and its fields.
///
/// Multi-record notifications (rare, e.g. batched client moves) are
/// flattened into the first record.
pub fn decode_event(line: &str) -> Option<(String, Record)> {
    let line = line.trim_matches(['\r', '\n']);
    if !line.starts_with(NOTIFY_PREFIX) {
        return None;
    }
    let (kind, rest) = line.split_once(' ').unwrap_or((line, ""));
    let fields = rest
        .split('|')
        .next()
        .map(decode_fields)
        .unwrap_or_default();
    Some((kind.to_string(), fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_reserved_characters() {
        assert_eq!(escape("a b|c/d\\e"), "a\\sb\\pc\\/d\\\\e");
        assert_eq!(escape("line\nbreak\ttab"), "line\\nbreak\\ttab");
    }

    #[test]
    fn unescape_reverses_escape() {
        for value in [
            "plain",
            "with space",
            "pipe|pipe",
            "slash/slash",
            "back\\slash",
            "\\s literal",
            "mix | of / all \\ four",
            "",
            "trailing\\",
        ] {
            assert_eq!(unescape(&escape(value)), value, "value: {value:?}");
        }
    }

    #[test]
    fn unescape_keeps_unknown_sequences() {
        assert_eq!(unescape("a\\qb"), "a\\qb");
        assert_eq!(unescape("end\\"), "end\\");
    }

    #[test]
    fn encode_escapes_values_only() {
        let cmd = Command::new("clientpoke")
            .arg("clid", 7)
            .arg("msg", "hello there | all");
        assert_eq!(cmd.encode(), "clientpoke clid=7 msg=hello\\sthere\\s\\p\\sall");
    }

    #[test]
    fn encode_flags() {
        let cmd = Command::new("clientlist").flag("groups").flag("uid");
        assert_eq!(cmd.encode(), "clientlist -groups -uid");
    }

    #[test]
    fn redacted_hides_login_credentials() {
        let cmd = Command::new("login")
            .arg("client_login_name", "bot")
            .arg("client_login_password", "secret");
        assert!(!cmd.redacted().contains("secret"));
    }

    #[test]
    fn decode_multi_record_line() {
        let line = "clid=5 cid=1 client_nickname=bot client_type=0|clid=7 cid=2 client_nickname=Ann client_type=0|clid=9 cid=1 client_nickname=serveradmin\\sfrom\\s127.0.0.1 client_type=1";
        let records = decode_records(line);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1]["client_nickname"], "Ann");
        assert_eq!(records[2]["client_nickname"], "serveradmin from 127.0.0.1");
    }

    #[test]
    fn decode_bare_flag_field() {
        let records = decode_records("cid=3 channel_flag_default");
        assert_eq!(records[0]["channel_flag_default"], "");
    }

    #[test]
    fn decode_empty_line_has_no_records() {
        assert!(decode_records("").is_empty());
        assert!(decode_records("\r").is_empty());
    }

    #[test]
    fn decode_status_line() {
        let status = decode_status("error id=512 msg=invalid\\sclientID").unwrap();
        assert_eq!(status.id, 512);
        assert_eq!(status.msg, "invalid clientID");
        assert!(!status.is_ok());

        let ok = decode_status("\rerror id=0 msg=ok\r").unwrap();
        assert!(ok.is_ok());
    }

    #[test]
    fn decode_status_rejects_data_lines() {
        assert!(decode_status("clid=1 cid=1").is_none());
        assert!(decode_status("error_count=3").is_none());
        assert!(!is_status_line("error_count=3"));
    }

    #[test]
    fn decode_text_message_event() {
        let line = "notifytextmessage targetmode=1 msg=!mk\\sclean\\sup target=5 invokerid=7 invokername=Ann invokeruid=abc=";
        let (kind, fields) = decode_event(line).unwrap();
        assert_eq!(kind, "notifytextmessage");
        assert_eq!(fields["msg"], "!mk clean up");
        assert_eq!(fields["invokerid"], "7");
        assert_eq!(fields["invokeruid"], "abc=");
        assert!(is_event_line(line));
    }

    #[test]
    fn decode_event_rejects_responses() {
        assert!(decode_event("clid=1").is_none());
        assert!(decode_event("error id=0 msg=ok").is_none());
    }

    #[test]
    fn response_into_result() {
        let rejected = Response {
            records: Vec::new(),
            status: Status {
                id: 768,
                msg: "invalid channelID".to_string(),
            },
        };
        assert!(matches!(
            rejected.into_result(),
            Err(crate::QueryError::Command(Status { id: 768, .. }))
        ));
    }
}
