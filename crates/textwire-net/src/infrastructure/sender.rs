//! Outbound side: a lazily connected, lock-guarded framed sender.
//!
//! A [`FramedSender`] owns at most one TCP connection to its target.  The
//! connection is opened on the first [`send`](FramedSender::send), reused for
//! later sends, and discarded the moment a write fails so that the next send
//! starts over with a fresh connection.
//!
//! # Connection slot
//!
//! ```text
//!        send() ──connect ok──> Some(stream)
//! None <─────────────────────── │  write failed / peer gone
//!                               └─ send() reuses stream
//! ```
//!
//! The whole "connect-or-reuse, then write header, then write body" sequence
//! runs under one `tokio::sync::Mutex`, so frames from concurrent callers are
//! never interleaved and racing first sends never open two sockets.

use std::io;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use textwire_core::encode_header;

use crate::domain::{SenderConfig, TransportError};

/// Sends text messages as length-prefixed frames over one TCP connection.
///
/// `FramedSender` is `Send + Sync`; share it with an `Arc` to send from many
/// tasks.  Dropping it closes the connection.
#[derive(Debug)]
pub struct FramedSender {
    config: SenderConfig,
    connection: Mutex<Option<TcpStream>>,
}

impl FramedSender {
    /// Creates a sender.  No connection is made until the first send.
    pub fn new(config: SenderConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    /// The configuration this sender was built with.
    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Returns `true` if a connection is currently held (it may still turn
    /// out to be dead on the next send).
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Sends `text` as one frame.
    ///
    /// Connects first if no connection is held or the held one has been
    /// closed by the peer.  The header and body are written as two
    /// sequential writes while the connection lock is held.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidArgument`] if `text` is empty.
    /// - [`TransportError::InvalidState`] if the host or port is not set.
    /// - [`TransportError::Frame`] if the body does not fit the length field.
    /// - [`TransportError::ConnectionFailure`] if connecting or writing fails.
    ///   The connection is discarded first; there is no retry within this
    ///   call.
    pub async fn send(&self, text: &str) -> Result<(), TransportError> {
        if text.is_empty() {
            return Err(TransportError::InvalidArgument("message text is empty"));
        }
        let (host, port) = self.config.target()?;
        let body = text.as_bytes();
        let header = encode_header(body.len())?;

        let mut connection = self.connection.lock().await;
        let stream = self.ensure_connected(&mut connection, host, port).await?;

        match write_frame(stream, &header, body, self.config.write_timeout).await {
            Ok(()) => {
                debug!("sent {} byte frame to {host}:{port}", body.len());
                Ok(())
            }
            Err(source) => {
                warn!("write to {host}:{port} failed, dropping connection: {source}");
                *connection = None;
                Err(TransportError::ConnectionFailure {
                    addr: format!("{host}:{port}"),
                    source,
                })
            }
        }
    }

    /// Closes the connection if one is open.  Safe to call at any time; a
    /// later send reconnects.
    pub async fn close(&self) {
        let mut connection = self.connection.lock().await;
        if let Some(mut stream) = connection.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("shutdown of outbound connection failed: {e}");
            }
            info!("outbound connection closed");
        }
    }

    /// Reuses the held connection if it is still usable, otherwise opens a
    /// new one and stores it in `connection`.
    async fn ensure_connected<'a>(
        &self,
        connection: &'a mut Option<TcpStream>,
        host: &str,
        port: u16,
    ) -> Result<&'a mut TcpStream, TransportError> {
        if let Some(stream) = connection.as_ref() {
            if !is_alive(stream).await {
                debug!("connection to {host}:{port} reports not-connected; reconnecting");
                *connection = None;
            }
        }

        let stream = match connection.take() {
            Some(stream) => stream,
            None => self.connect(host, port).await?,
        };
        Ok(connection.insert(stream))
    }

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, TransportError> {
        let attempt = TcpStream::connect((host, port));
        let result = match self.config.connect_timeout {
            Some(limit) => timeout(limit, attempt)
                .await
                .unwrap_or_else(|_| Err(timed_out("connect"))),
            None => attempt.await,
        };

        let stream = result.map_err(|source| TransportError::ConnectionFailure {
            addr: format!("{host}:{port}"),
            source,
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle on outbound connection: {e}");
        }

        info!("connected to {host}:{port}");
        Ok(stream)
    }
}

/// Zero-wait liveness probe: a pending peek means the socket is open and
/// idle, an immediate EOF or error means the peer is gone.
async fn is_alive(stream: &TcpStream) -> bool {
    if stream.peer_addr().is_err() {
        return false;
    }
    let mut probe = [0u8; 1];
    match timeout(Duration::ZERO, stream.peek(&mut probe)).await {
        Err(_) => true,
        Ok(Ok(0)) => false,
        Ok(Ok(_)) => true,
        Ok(Err(_)) => false,
    }
}

async fn write_frame(
    stream: &mut TcpStream,
    header: &[u8],
    body: &[u8],
    limit: Option<Duration>,
) -> io::Result<()> {
    let write = async {
        stream.write_all(header).await?;
        stream.write_all(body).await?;
        stream.flush().await
    };
    match limit {
        Some(limit) => timeout(limit, write)
            .await
            .unwrap_or_else(|_| Err(timed_out("write"))),
        None => write.await,
    }
}

fn timed_out(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{what} timed out"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
