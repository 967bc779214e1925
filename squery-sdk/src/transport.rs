//! Raw byte stream to the query port.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::{QueryError, Result};

/// Identifier the server sends as the first line of every session.
pub const PROTOCOL_IDENTIFIER: &str = "TS3";

pub(crate) type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established stream that has not yet been handed to a
/// [`Demultiplexer`](crate::demux::Demultiplexer).
pub struct Transport {
    reader: BoxedReader,
    writer: BoxedWriter,
    peer: String,
    line_buf: Vec<u8>,
}

impl Transport {
    /// Open a TCP connection, bounded by `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = format!("{host}:{port}");
        tracing::debug!("Connecting to {addr}...");
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| QueryError::ConnectTimeout {
                addr: addr.clone(),
                timeout,
            })??;
        tcp.set_nodelay(true)?;
        tracing::debug!("TCP connected to {addr}");
        Ok(Self::from_stream(tcp, addr))
    }

    /// Wrap any duplex stream (TCP, in-memory pipe, tunnel).
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            reader: BufReader::new(reader),
            writer: Box::new(writer),
            peer: peer.into(),
            line_buf: Vec::with_capacity(1024),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Read one line, failing with [`QueryError::Timeout`] if none arrives.
    pub async fn read_line(&mut self, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, read_line(&mut self.reader, &mut self.line_buf)).await {
            Err(_) => Err(QueryError::Timeout(timeout)),
            Ok(Ok(Some(line))) => Ok(line),
            Ok(Ok(None)) => Err(QueryError::ConnectionLost),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Consume the two-line greeting. Returns the human-readable second line.
    pub async fn read_welcome(&mut self, timeout: Duration) -> Result<String> {
        let ident = self.read_line(timeout).await?;
        if ident.trim() != PROTOCOL_IDENTIFIER {
            return Err(QueryError::Protocol(format!(
                "unexpected greeting {ident:?} from {}",
                self.peer
            )));
        }
        self.read_line(timeout).await
    }

    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        write_line(&mut self.writer, line).await
    }

    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }

    pub(crate) fn into_parts(self) -> (BoxedReader, BoxedWriter) {
        (self.reader, self.writer)
    }
}

/// Read bytes up to `\n`, decode lossily and strip the `\r`/`\n` framing on
/// both sides (the server ends lines with `\n\r`). Blank lines are skipped.
/// `Ok(None)` means end of stream.
pub(crate) async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', buf).await?;
        if n == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(buf);
        let line = line.trim_matches(['\r', '\n']);
        if !line.is_empty() {
            return Ok(Some(line.to_string()));
        }
    }
}

pub(crate) async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
