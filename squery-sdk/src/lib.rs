//! squery-sdk: client for line-oriented ServerQuery administration sessions.
//!
//! One TCP connection carries both command responses and unsolicited
//! notifications. The [`demux::Demultiplexer`] separates the two, the
//! [`channel::CommandChannel`] pairs each command with exactly one
//! response, and the [`session::Session`] keeps a connection authenticated
//! and alive.

pub mod channel;
pub mod codec;
pub mod demux;
pub mod error;
pub mod event;
pub mod model;
pub mod queries;
pub mod session;
pub mod transport;

pub use channel::CommandChannel;
pub use codec::{Command, Record, Response, Status};
pub use demux::{Demultiplexer, EventReceiver};
pub use error::{QueryError, Result};
pub use event::{Notification, TargetMode, TextMessage};
pub use model::{Client, ClientInfo, ClientType, ServerInfo, WhoAmI};
pub use session::{Connection, Session, SessionConfig, SessionState};
pub use transport::Transport;
