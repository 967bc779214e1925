//! Scripted ServerQuery server for integration tests.
//!
//! Each accepted connection gets the standard greeting, then every command
//! line is recorded and answered by the test's script.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// One step of a scripted reply.
pub enum Step {
    Line(String),
    Sleep(Duration),
    Hangup,
}

pub fn line(text: &str) -> Step {
    Step::Line(text.to_string())
}

pub fn ok() -> Step {
    line("error id=0 msg=ok")
}

pub type Script = Arc<dyn Fn(&str) -> Vec<Step> + Send + Sync>;

pub struct FakeServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    accepted: Arc<AtomicUsize>,
    push: Arc<Mutex<Vec<tokio::sync::mpsc::UnboundedSender<String>>>>,
}

impl FakeServer {
    pub async fn start(script: Script) -> Self {
        Self::start_with_greeting("TS3", script).await
    }

    pub async fn start_with_greeting(ident: &'static str, script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let push = Arc::new(Mutex::new(Vec::new()));

        let (r, a, p) = (received.clone(), accepted.clone(), push.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                a.fetch_add(1, Ordering::SeqCst);
                let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                p.lock().push(tx);
                tokio::spawn(serve(stream, ident, script.clone(), r.clone(), rx));
            }
        });

        Self {
            addr,
            received,
            accepted,
            push,
        }
    }

    /// Server that accepts connections and hangs up before the greeting.
    pub async fn start_refusing() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let a = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                a.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });
        Self {
            addr,
            received: Arc::new(Mutex::new(Vec::new())),
            accepted,
            push: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    pub fn received_matching(&self, verb: &str) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|l| l.split(' ').next() == Some(verb))
            .collect()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Write a raw line to the most recent connection outside any reply.
    pub fn push(&self, text: &str) {
        if let Some(tx) = self.push.lock().last() {
            let _ = tx.send(text.to_string());
        }
    }

    /// Poll until at least `count` commands with `verb` arrived.
    pub async fn wait_for(&self, verb: &str, count: usize) -> Vec<String> {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                let seen = self.received_matching(verb);
                if seen.len() >= count {
                    return seen;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap()
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    ident: &'static str,
    script: Script,
    received: Arc<Mutex<Vec<String>>>,
    mut push: tokio::sync::mpsc::UnboundedReceiver<String>,
) {
    let (reader, writer) = stream.into_split();
    let writer = Arc::new(tokio::sync::Mutex::new(writer));
    let mut reader = BufReader::new(reader);
    let greeting = format!("{ident}\n\rWelcome to the TeamSpeak 3 ServerQuery interface.\n\r");
    if writer.lock().await.write_all(greeting.as_bytes()).await.is_err() {
        return;
    }

    let pusher = writer.clone();
    let push_task = tokio::spawn(async move {
        while let Some(text) = push.recv().await {
            let mut w = pusher.lock().await;
            if w.write_all(format!("{text}\n\r").as_bytes()).await.is_err() {
                return;
            }
        }
    });

    let mut buf = String::new();
    'conn: loop {
        buf.clear();
        match reader.read_line(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let command = buf.trim().to_string();
        if command.is_empty() {
            continue;
        }
        received.lock().push(command.clone());
        for step in script(&command) {
            match step {
                Step::Line(text) => {
                    let mut w = writer.lock().await;
                    if w.write_all(format!("{text}\n\r").as_bytes()).await.is_err() {
                        break 'conn;
                    }
                }
                Step::Sleep(d) => tokio::time::sleep(d).await,
                Step::Hangup => break 'conn,
            }
        }
    }
    push_task.abort();
}

/// Answers the session handshake; everything else goes to `extra`.
pub fn standard(extra: impl Fn(&str) -> Option<Vec<Step>> + Send + Sync + 'static) -> Script {
    Arc::new(move |command: &str| {
        if let Some(steps) = extra(command) {
            return steps;
        }
        let verb = command.split(' ').next().unwrap_or("");
        match verb {
            "login" | "use" | "clientupdate" | "servernotifyregister" | "logout" => vec![ok()],
            "whoami" => vec![
                line("virtualserver_status=online virtualserver_id=1 client_channel_id=1 client_nickname=bot client_id=5"),
                ok(),
            ],
            "quit" => vec![ok(), Step::Hangup],
            _ => vec![line("error id=256 msg=command\\snot\\sfound")],
        }
    })
}
