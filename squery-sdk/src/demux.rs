//! Splits the single inbound line stream into command responses and events.
//!
//! A dedicated reader task owns the read half of the [`Transport`] for the
//! lifetime of the connection. Each line is classified:
//!
//! - `notify*` lines are events and go straight to the event queue, even
//!   while a command is in flight;
//! - `error id=...` lines terminate the in-flight command and deliver its
//!   accumulated [`Response`];
//! - anything else is a data line of the in-flight command.
//!
//! The "in-flight slot" holds at most one pending command. When a caller
//! gives up on a command (timeout, or its future is dropped), the slot is
//! abandoned and a stale counter remembers that one more terminator is owed
//! by the server: the data and terminator of that late response are
//! discarded instead of being matched to the next command. The server
//! answers strictly in order, so counting is enough.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::codec::{self, Record, Response};
use crate::error::{QueryError, Result};
use crate::event::Notification;
use crate::transport::{self, BoxedReader, BoxedWriter, Transport};

/// Receiving end of the event queue. Closes when the connection does.
pub type EventReceiver = mpsc::UnboundedReceiver<Notification>;

/// Handle on a submitted command's eventual response.
///
/// Dropping a ticket before [`Ticket::reply`] has returned abandons the
/// in-flight slot, so a cancelled caller never blocks the next command.
pub(crate) struct Ticket {
    id: u64,
    rx: oneshot::Receiver<Result<Response>>,
    shared: Arc<Shared>,
    settled: bool,
}

impl Ticket {
    /// Wait for the terminator. A dropped reply sender means the reader died.
    pub(crate) async fn reply(&mut self) -> Result<Response> {
        let result = match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::ConnectionLost),
        };
        self.settled = true;
        result
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.abandon(self.id);
        }
    }
}

struct Pending {
    ticket: u64,
    records: Vec<Record>,
    reply: oneshot::Sender<Result<Response>>,
}

#[derive(Default)]
struct Slot {
    pending: Option<Pending>,
    /// Abandoned commands whose terminators have not arrived yet.
    stale: usize,
    next_ticket: u64,
    broken: bool,
}

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
}

impl Shared {
    fn route(&self, line: &str, events: &mpsc::UnboundedSender<Notification>) {
        if codec::is_event_line(line) {
            match Notification::parse(line) {
                Some(event) => {
                    if events.send(event).is_err() {
                        tracing::trace!("Event queue closed, dropping notification");
                    }
                }
                None => tracing::warn!(line, "Unparseable notification"),
            }
            return;
        }

        let mut slot = self.slot.lock();
        if let Some(status) = codec::decode_status(line) {
            if slot.stale > 0 {
                slot.stale -= 1;
                tracing::debug!(status = %status, "Discarding late response of abandoned command");
                return;
            }
            match slot.pending.take() {
                Some(pending) => {
                    let response = Response {
                        records: pending.records,
                        status,
                    };
                    // The caller may have stopped waiting; nothing to do then.
                    let _ = pending.reply.send(Ok(response));
                }
                None => tracing::warn!(status = %status, "Terminator with no command in flight"),
            }
            return;
        }

        if codec::is_status_line(line) {
            let error = QueryError::Protocol(format!("malformed status line {line:?}"));
            tracing::warn!(line, "Malformed status line");
            if slot.stale > 0 {
                slot.stale -= 1;
            } else if let Some(pending) = slot.pending.take() {
                let _ = pending.reply.send(Err(error));
            }
            return;
        }

        if slot.stale > 0 {
            return;
        }
        match slot.pending.as_mut() {
            Some(pending) => pending.records.extend(codec::decode_records(line)),
            None => tracing::debug!(line, "Unsolicited data line"),
        }
    }

    /// Release the slot held by `ticket`, if it still holds it. Its late
    /// response, if any, is discarded rather than matched to a later command.
    fn abandon(&self, ticket: u64) {
        let mut slot = self.slot.lock();
        if slot.broken {
            return;
        }
        if slot.pending.as_ref().is_some_and(|p| p.ticket == ticket) {
            slot.pending = None;
            slot.stale += 1;
            tracing::debug!(ticket, stale = slot.stale, "Abandoned in-flight command");
        }
    }

    /// Fail the in-flight waiter and refuse further submissions.
    fn fail(&self) {
        let mut slot = self.slot.lock();
        slot.broken = true;
        slot.stale = 0;
        if let Some(pending) = slot.pending.take() {
            let _ = pending.reply.send(Err(QueryError::ConnectionLost));
        }
    }
}

/// Owner of the transport once a session is past the greeting.
pub struct Demultiplexer {
    writer: tokio::sync::Mutex<BoxedWriter>,
    shared: Arc<Shared>,
    closed: watch::Receiver<bool>,
    reader: JoinHandle<()>,
}

impl Demultiplexer {
    /// Start the reader task. Returns the demultiplexer and the event queue.
    pub fn spawn(transport: Transport) -> (Self, EventReceiver) {
        let peer = transport.peer().to_string();
        let (reader, writer) = transport.into_parts();
        let shared = Arc::new(Shared::default());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        let reader = tokio::spawn(read_loop(reader, shared.clone(), event_tx, closed_tx, peer));

        let demux = Self {
            writer: tokio::sync::Mutex::new(writer),
            shared,
            closed: closed_rx,
            reader,
        };
        (demux, event_rx)
    }

    /// Occupy the in-flight slot and write the command line.
    pub(crate) async fn submit(&self, line: &str) -> Result<Ticket> {
        let (reply, rx) = oneshot::channel();
        let id = {
            let mut slot = self.shared.slot.lock();
            if slot.broken {
                return Err(QueryError::ConnectionLost);
            }
            if slot.pending.is_some() {
                return Err(QueryError::Protocol("a command is already in flight".to_string()));
            }
            slot.next_ticket += 1;
            let id = slot.next_ticket;
            slot.pending = Some(Pending {
                ticket: id,
                records: Vec::new(),
                reply,
            });
            id
        };
        // Built before the write so a caller dropped mid-write frees the slot.
        let ticket = Ticket {
            id,
            rx,
            shared: self.shared.clone(),
            settled: false,
        };

        let mut writer = self.writer.lock().await;
        if let Err(e) = transport::write_line(&mut *writer, line).await {
            tracing::warn!(error = %e, "Write failed, marking connection broken");
            self.shared.fail();
            return Err(e);
        }
        Ok(ticket)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the reader has hit end-of-stream or a read error.
    pub async fn closed(&self) {
        let mut rx = self.closed.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Close the write half. The reader task ends when the peer hangs up.
    pub async fn shutdown(&self) {
        use tokio::io::AsyncWriteExt;
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl Drop for Demultiplexer {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut reader: BoxedReader,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<Notification>,
    closed: watch::Sender<bool>,
    peer: String,
) {
    let mut buf = Vec::with_capacity(4096);
    let reason = loop {
        match transport::read_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                tracing::trace!(line = %line, "<-");
                shared.route(&line, &events);
            }
            Ok(None) => break "end of stream".to_string(),
            Err(e) => break e.to_string(),
        }
    };
    tracing::info!(peer = %peer, reason = %reason, "Query connection closed");
    shared.fail();
    closed.send_replace(true);
}
