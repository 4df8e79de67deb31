//! Stream transport to the object store.
//!
//! Owns the single connection, turns a [`Frame`] into bytes on the wire and
//! back, and makes every logical send or receive complete in full even when
//! the socket moves fewer bytes per call.
//!
//! # Example
//!
//! ```ignore
//! use crudfs_client::protocol::Frame;
//! use crudfs_client::transport::Transport;
//!
//! let mut transport = Transport::connect("127.0.0.1:19876").await?;
//! let response = transport.exchange(&Frame::init()).await?;
//! assert!(response.is_success());
//! transport.close().await?;
//! ```

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{CrudError, Result};
use crate::protocol::{Frame, Word, WORD_SIZE};

/// One connection to the object store.
///
/// Strictly request/response: one exchange at a time, no pipelining.
#[derive(Debug)]
pub struct Transport<S> {
    /// `None` once closed.
    stream: Option<S>,
}

impl Transport<TcpStream> {
    /// Connect to the object store at `addr` (`host:port`).
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| CrudError::Connection {
                addr: addr.to_string(),
                source,
            })?;

        // Words are tiny; do not let Nagle hold them back.
        stream
            .set_nodelay(true)
            .map_err(|source| CrudError::Connection {
                addr: addr.to_string(),
                source,
            })?;

        tracing::debug!("Connected to object store at {}", addr);
        Ok(Self::new(stream))
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Check if the connection is still open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn stream_mut(&mut self) -> Result<&mut S> {
        self.stream.as_mut().ok_or_else(|| {
            CrudError::Transport(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport is closed",
            ))
        })
    }

    /// Send one request word and, for CREATE/UPDATE, its payload.
    ///
    /// # Errors
    ///
    /// `Protocol` if the word is out of range or the payload does not match
    /// the declared length (nothing is written in that case); `Transport` if
    /// the stream fails or stops making progress.
    pub async fn send_request(&mut self, frame: &Frame) -> Result<()> {
        let word = frame.word;
        word.validate()?;

        let with_payload = word.opcode.carries_request_payload();
        if with_payload && frame.payload.len() != word.length as usize {
            return Err(CrudError::Protocol(format!(
                "{} declares {} bytes but payload has {}",
                word.opcode,
                word.length,
                frame.payload.len()
            )));
        }
        if !with_payload && !frame.payload.is_empty() {
            return Err(CrudError::Protocol(format!(
                "{} does not carry a request payload",
                word.opcode
            )));
        }

        let stream = self.stream_mut()?;
        write_fully(stream, &word.encode()).await?;
        if with_payload {
            write_fully(stream, &frame.payload).await?;
        }
        stream.flush().await?;

        tracing::trace!("Sent {}", word);
        Ok(())
    }

    /// Receive one response word and, for READ, exactly `length` payload bytes.
    pub async fn receive_response(&mut self) -> Result<Frame> {
        let stream = self.stream_mut()?;

        let mut raw = [0u8; WORD_SIZE];
        read_fully(stream, &mut raw).await?;
        let word = Word::unpack(u64::from_be_bytes(raw))?;

        if !word.opcode.carries_response_payload() || word.length == 0 {
            tracing::trace!("Received {}", word);
            return Ok(Frame::bare(word));
        }

        let mut payload = alloc_zeroed(word.length as usize)?;
        read_fully(stream, &mut payload).await?;

        tracing::trace!("Received {} with payload", word);
        Ok(Frame::new(word, Bytes::from(payload)))
    }

    /// Send `request` and wait for its response.
    ///
    /// The response must echo the request opcode.
    pub async fn exchange(&mut self, request: &Frame) -> Result<Frame> {
        self.send_request(request).await?;
        let response = self.receive_response().await?;

        if response.opcode() != request.opcode() {
            return Err(CrudError::Protocol(format!(
                "Expected {} response, got {}",
                request.opcode(),
                response.opcode()
            )));
        }

        Ok(response)
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            match stream.shutdown().await {
                Ok(()) => {}
                // Peer already hung up after CLOSE.
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(CrudError::Transport(e)),
            }
            tracing::debug!("Transport closed");
        }
        Ok(())
    }
}

/// Reserve a zeroed buffer without aborting on allocation failure.
pub(crate) fn alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        CrudError::Allocation(format!("Cannot reserve {} byte buffer: {}", len, e))
    })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Write all of `buf`, retrying short writes.
///
/// A write that makes no progress is an error, never a reason to spin.
async fn write_fully<W>(writer: &mut W, buf: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;

    while written < buf.len() {
        match writer.write(&buf[written..]).await {
            Ok(0) => {
                return Err(CrudError::Transport(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("write stalled after {} of {} bytes", written, buf.len()),
                )))
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CrudError::Transport(e)),
        }
    }

    Ok(())
}

/// Fill all of `buf`, retrying short reads.
async fn read_fully<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => {
                return Err(CrudError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {} of {} bytes", filled, buf.len()),
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CrudError::Transport(e)),
        }
    }

    Ok(())
}
