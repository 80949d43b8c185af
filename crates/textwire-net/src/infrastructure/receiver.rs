//! Inbound side: TCP listener, accept loop and per-connection reassembly.
//!
//! # Listener state machine
//!
//! ```text
//! start() ──> Listening ──accept──> spawn reassembly task ──┐
//!                ^                                           │
//!                └───────────────────────────────────────────┘
//!             stop()     ──> Stopped       listening socket closed,
//!                                          accepted peers keep draining
//!             shutdown() ──> ShuttingDown  in-flight connections aborted
//! ```
//!
//! The accept loop never waits on a connection: it hands each accepted
//! stream to a new task in a [`JoinSet`] and goes straight back to
//! `accept()`, so one stalled peer never blocks new ones.  The `JoinSet` is
//! owned by the accept loop's task, which keeps supervising the connection
//! tasks after the listening socket has been closed.
//!
//! # Per-connection reassembly
//!
//! Each connection task reads up to `read_chunk_size` bytes at a time into a
//! [`ReassemblyBuffer`] and, after every read, extracts as many complete
//! frames as the buffer holds.  A zero-length read is the normal end of a
//! connection, not an error.

use std::future::poll_fn;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use textwire_core::{FrameError, ReassemblyBuffer};

use crate::domain::{ConnectionInfo, MessageEvent, ReceiverConfig, TransportError};
use crate::infrastructure::handler::{deliver, ChannelHandler, MessageHandler};

/// Pause after a failed `accept()` before trying again, so a persistent
/// failure (e.g. out of file descriptors) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Commands observed by the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerState {
    Listening,
    Stopped,
    ShuttingDown,
}

/// Why a connection's reassembly loop ended.
#[derive(Debug)]
pub enum ConnectionOutcome {
    /// The peer closed the stream (zero-length read).
    PeerClosed,
    /// Reading from the stream failed.
    ReadFailed(io::Error),
    /// Nothing arrived within the configured idle timeout.
    IdleTimeout,
    /// A header was rejected, e.g. it announced a body over the size cap.
    Rejected(FrameError),
}

/// Listening socket shared by the accept loop and [`FramedReceiver::stop`].
///
/// The loop only borrows the socket for the duration of one `poll_accept`, so
/// `stop()` can take it out and close it without waiting for the loop to be
/// scheduled.
#[derive(Debug, Clone)]
struct ListenerSlot(Arc<Mutex<Option<TcpListener>>>);

impl ListenerSlot {
    fn new(listener: TcpListener) -> Self {
        Self(Arc::new(Mutex::new(Some(listener))))
    }

    fn lock(&self) -> MutexGuard<'_, Option<TcpListener>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        self.lock().take();
    }

    /// Polls for the next connection; `None` once the socket is closed.
    fn poll_accept(
        &self,
        cx: &mut Context<'_>,
    ) -> Poll<Option<io::Result<(TcpStream, SocketAddr)>>> {
        match self.lock().as_ref() {
            Some(listener) => listener.poll_accept(cx).map(Some),
            None => Poll::Ready(None),
        }
    }
}

/// One running (or draining) accept loop.
#[derive(Debug)]
struct ListenerHandle {
    local_addr: SocketAddr,
    listener: ListenerSlot,
    control: watch::Sender<ListenerState>,
    supervisor: JoinHandle<()>,
}

/// Accepts framed text connections and delivers every message to a handler.
///
/// # Example
///
/// ```no_run
/// use textwire_net::domain::{MessageEvent, ReceiverConfig};
/// use textwire_net::infrastructure::FramedReceiver;
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut receiver = FramedReceiver::new(
///     ReceiverConfig::bound_to("127.0.0.1", 1100),
///     |event: &MessageEvent| -> anyhow::Result<()> {
///         println!("< {}", event.text);
///         Ok(())
///     },
/// );
/// receiver.start().await?;
/// // ...
/// receiver.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct FramedReceiver {
    config: Arc<ReceiverConfig>,
    handler: Arc<dyn MessageHandler>,
    active: Arc<AtomicUsize>,
    listening: Option<ListenerHandle>,
    draining: Vec<ListenerHandle>,
}

impl FramedReceiver {
    /// Creates a receiver that passes every message to `handler`.
    pub fn new(config: ReceiverConfig, handler: impl MessageHandler + 'static) -> Self {
        Self {
            config: Arc::new(config),
            handler: Arc::new(handler),
            active: Arc::new(AtomicUsize::new(0)),
            listening: None,
            draining: Vec::new(),
        }
    }

    /// Creates a receiver whose messages are delivered on a channel.
    pub fn with_channel(config: ReceiverConfig) -> (Self, mpsc::UnboundedReceiver<MessageEvent>) {
        let (handler, rx) = ChannelHandler::new();
        (Self::new(config, handler), rx)
    }

    /// The configuration this receiver was built with.
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Address the listener is bound to, while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.as_ref().map(|l| l.local_addr)
    }

    /// Returns `true` between a successful `start` and the next `stop`.
    pub fn is_listening(&self) -> bool {
        self.listening.is_some()
    }

    /// Number of inbound connections whose reassembly task is still running.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidState`] if the address or port is unset,
    ///   or the receiver is already listening.
    /// - [`TransportError::BindFailure`] if the address is not a literal IP
    ///   or the port cannot be bound.  Nothing is left running in that case.
    pub async fn start(&mut self) -> Result<SocketAddr, TransportError> {
        self.prune_drained();
        if self.listening.is_some() {
            return Err(TransportError::InvalidState("listener already started".into()));
        }
        let (address, port) = self.config.bind_target()?;
        let display = format!("{address}:{port}");

        let ip: IpAddr = address.parse().map_err(|e| TransportError::BindFailure {
            addr: display.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?;
        let listener = TcpListener::bind(SocketAddr::new(ip, port))
            .await
            .map_err(|source| TransportError::BindFailure {
                addr: display.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::BindFailure {
                addr: display,
                source,
            })?;

        let listener = ListenerSlot::new(listener);
        let (control, control_rx) = watch::channel(ListenerState::Listening);
        let supervisor = tokio::spawn(accept_loop(
            listener.clone(),
            Arc::clone(&self.handler),
            Arc::clone(&self.config),
            Arc::clone(&self.active),
            control_rx,
        ));

        info!("listening on {local_addr}");
        self.listening = Some(ListenerHandle {
            local_addr,
            listener,
            control,
            supervisor,
        });
        Ok(local_addr)
    }

    /// Stops accepting new connections.  Idempotent.
    ///
    /// The listening socket is closed before this returns, so the port can be
    /// bound again right away.  Connections accepted earlier are left running
    /// until their peers disconnect.
    pub fn stop(&mut self) {
        self.prune_drained();
        if let Some(handle) = self.listening.take() {
            handle.listener.close();
            // The accept loop owns the receiving side; it only goes away once
            // the loop has finished, in which case there is nothing to stop.
            let _ = handle.control.send(ListenerState::Stopped);
            info!("listener on {} stopped", handle.local_addr);
            self.draining.push(handle);
        }
    }

    /// Forgets stopped listeners whose connections have all finished.
    fn prune_drained(&mut self) {
        self.draining.retain(|handle| !handle.supervisor.is_finished());
    }

    /// Stops accepting, aborts every in-flight connection and waits for the
    /// accept loops to finish.  Idempotent.
    pub async fn shutdown(&mut self) {
        self.stop();
        for handle in self.draining.drain(..) {
            let _ = handle.control.send(ListenerState::ShuttingDown);
            if let Err(e) = handle.supervisor.await {
                if e.is_panic() {
                    error!("accept loop for {} panicked", handle.local_addr);
                }
            }
        }
    }
}

impl Drop for FramedReceiver {
    fn drop(&mut self) {
        // Aborting the accept loop drops its JoinSet, which aborts every
        // connection task it supervises.
        for handle in self.listening.iter().chain(self.draining.iter()) {
            handle.listener.close();
            handle.supervisor.abort();
        }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: ListenerSlot,
    handler: Arc<dyn MessageHandler>,
    config: Arc<ReceiverConfig>,
    active: Arc<AtomicUsize>,
    mut control: watch::Receiver<ListenerState>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            changed = control.changed() => {
                if changed.is_err() || *control.borrow() != ListenerState::Listening {
                    break;
                }
            }
            accepted = poll_fn(|cx| listener.poll_accept(cx)) => match accepted {
                Some(Ok((stream, peer_addr))) => {
                    let connection = ConnectionInfo::new(peer_addr);
                    info!(%connection, "accepted connection");
                    connections.spawn(serve_connection(
                        stream,
                        connection,
                        Arc::clone(&handler),
                        Arc::clone(&config),
                        ActiveGuard::enter(&active),
                    ));
                }
                Some(Err(e)) => {
                    error!("accept failed: {e}");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
                None => break,
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_join(joined);
            }
        }
    }

    listener.close();
    debug!(
        "accept loop exited; supervising {} remaining connection(s)",
        connections.len()
    );

    let mut aborting = false;
    loop {
        if !aborting && *control.borrow() == ListenerState::ShuttingDown {
            connections.abort_all();
            aborting = true;
        }
        tokio::select! {
            joined = connections.join_next() => match joined {
                Some(joined) => log_join(joined),
                None => break,
            },
            changed = control.changed(), if !aborting => {
                if changed.is_err() {
                    connections.abort_all();
                    aborting = true;
                }
            }
        }
    }
}

fn log_join(joined: Result<(), JoinError>) {
    match joined {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!("connection task panicked: {e}"),
        Err(_) => debug!("connection task aborted"),
    }
}

/// Counts a connection as active for as long as it is alive, including when
/// its task is aborted.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(active))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn serve_connection(
    stream: TcpStream,
    connection: ConnectionInfo,
    handler: Arc<dyn MessageHandler>,
    config: Arc<ReceiverConfig>,
    _active: ActiveGuard,
) {
    match read_messages(stream, connection, handler.as_ref(), &config).await {
        ConnectionOutcome::PeerClosed => info!(%connection, "peer disconnected"),
        ConnectionOutcome::IdleTimeout => info!(%connection, "closing idle connection"),
        ConnectionOutcome::ReadFailed(e) => match e.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                debug!(%connection, "connection reset by peer: {e}")
            }
            _ => warn!(%connection, "read failed: {e}"),
        },
        ConnectionOutcome::Rejected(e) => warn!(%connection, "dropping connection: {e}"),
    }
}

// ── Reassembly loop ───────────────────────────────────────────────────────────

/// Runs the reassembly loop for one inbound stream until it ends.
///
/// Every complete frame is decoded and passed to `handler` as a
/// [`MessageEvent`] tagged with `connection`.  Handler failures are logged and
/// never end the loop.
pub async fn read_messages<R>(
    mut reader: R,
    connection: ConnectionInfo,
    handler: &dyn MessageHandler,
    config: &ReceiverConfig,
) -> ConnectionOutcome
where
    R: AsyncRead + Unpin,
{
    let mut buffer = ReassemblyBuffer::new(config.max_body_len);
    let mut chunk = vec![0u8; config.read_chunk_size.max(1)];

    loop {
        let read = reader.read(&mut chunk);
        let result = match config.idle_timeout {
            Some(limit) => match timeout(limit, read).await {
                Ok(result) => result,
                Err(_) => return ConnectionOutcome::IdleTimeout,
            },
            None => read.await,
        };

        let n = match result {
            Ok(0) => return ConnectionOutcome::PeerClosed,
            Ok(n) => n,
            Err(e) => return ConnectionOutcome::ReadFailed(e),
        };
        buffer.extend(&chunk[..n]);

        loop {
            match buffer.next_frame() {
                Ok(Some(text)) => {
                    debug!(%connection, "received {} byte message", text.len());
                    let event = MessageEvent { connection, text };
                    deliver(handler, &event);
                }
                Ok(None) => break,
                Err(e) => return ConnectionOutcome::Rejected(e),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
