//! Network infrastructure for the terminal.
//!
//! [`Session`] owns one byte-stream connection to the platform.  Received bytes
//! are fed into a [`StreamDecoder`] owned by a single reader task, and every
//! decoded [`Packet`] is handed to the registered handler in arrival order.
//!
//! Architecture:
//! - The read half lives in a dedicated tokio task together with the decoder.
//!   Handlers run synchronously inside that task, so they should be quick
//!   (push onto a channel, update a counter) and must not call back into
//!   `register_handler`.
//! - The write half sits behind an async mutex; [`Session::send`] may be
//!   called concurrently from any task and writes each frame with one
//!   `write_all`.
//! - A zero-length read or an I/O error ends the session.  The state moves to
//!   [`SessionState::Disconnected`], the disconnect hook fires once, and no
//!   reconnect is attempted.
//! - Every transition (attach, teardown, local close) happens while holding
//!   the writer lock.  Each reader carries the generation of the connection it
//!   was spawned for and tears nothing down once a newer connection exists.
//!
//! # Why is `attach` separate from `connect`? (for beginners)
//!
//! `connect` opens a real TCP socket.  `attach` accepts *any* type that
//! implements `AsyncRead + AsyncWrite`, such as an in-memory
//! `tokio::io::duplex` pipe or a scripted `tokio_test::io::Mock`.  Tests use it
//! to drive the whole receive path without opening a socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use gbt32960_core::{DecoderConfig, Packet, ProtocolError, StreamDecoder};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::respond::PacketSender;

/// Errors that can occur in the terminal network layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// TCP connection to the platform failed.
    #[error("failed to connect to platform at {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A packet could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The operation needs a live connection and there is none.
    #[error("session is not connected")]
    NotConnected,
    /// `connect` or `attach` was called on a live session.
    #[error("session is already connected")]
    AlreadyConnected,
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never connected.
    Idle,
    /// A stream is attached and the reader task is running.
    Connected,
    /// The stream closed, failed, or was closed locally.
    Disconnected,
}

/// Configuration for a terminal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Platform host name or IP address.
    pub host: String,
    /// Platform TCP port.
    pub port: u16,
    /// Size of the scratch buffer for each `read()` call.
    pub read_buffer_size: usize,
    /// Settings for the session's stream decoder.
    pub decoder: DecoderConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 32960,
            read_buffer_size: 4096,
            decoder: DecoderConfig::default(),
        }
    }
}

impl SessionConfig {
    /// `host:port` in the form accepted by `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Callback invoked once per decoded packet.
pub type PacketHandler = Box<dyn FnMut(Packet) + Send>;

/// Callback invoked when a connected session goes down.
pub type DisconnectHandler = Box<dyn FnMut() + Send>;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// State shared between the session handle and its reader task.
struct Shared {
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    handler: Mutex<Option<PacketHandler>>,
    on_disconnect: Mutex<Option<DisconnectHandler>>,
    state: Mutex<SessionState>,
    /// Bumped on every attach; identifies the connection a reader belongs to.
    generation: AtomicU64,
}

impl Shared {
    fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn dispatch(&self, packet: Packet) {
        match lock(&self.handler).as_mut() {
            Some(handler) => handler(packet),
            None => debug!("no handler registered; dropping packet cmd={:02x}", packet.command_flag),
        }
    }

    /// Moves a live session to `Disconnected` and fires the hook.  Any other
    /// state is left as it is.
    fn mark_disconnected(&self) {
        let was_connected = {
            let mut state = lock(&self.state);
            let connected = *state == SessionState::Connected;
            if connected {
                *state = SessionState::Disconnected;
            }
            connected
        };
        if was_connected {
            if let Some(hook) = lock(&self.on_disconnect).as_mut() {
                hook();
            }
        }
    }
}

/// Locks a std mutex, recovering the data if a handler panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A terminal-side connection to a GB/T 32960.3 platform.
pub struct Session {
    config: SessionConfig,
    shared: Arc<Shared>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Creates a new (not yet connected) session.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                writer: tokio::sync::Mutex::new(None),
                handler: Mutex::new(None),
                on_disconnect: Mutex::new(None),
                state: Mutex::new(SessionState::Idle),
                generation: AtomicU64::new(0),
            }),
            reader_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers the per-packet callback, replacing any previous one.
    pub fn register_handler<F>(&self, handler: F)
    where
        F: FnMut(Packet) + Send + 'static,
    {
        *lock(&self.shared.handler) = Some(Box::new(handler));
    }

    /// Registers the disconnect callback, replacing any previous one.
    pub fn register_disconnect_handler<F>(&self, handler: F)
    where
        F: FnMut() + Send + 'static,
    {
        *lock(&self.shared.on_disconnect) = Some(Box::new(handler));
    }

    /// Opens a TCP connection to the configured platform and starts reading.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyConnected`] on a live session and
    /// [`SessionError::ConnectFailed`] if the TCP handshake fails.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            return Err(SessionError::AlreadyConnected);
        }
        let addr = self.config.address();
        let stream = TcpStream::connect(addr.as_str())
            .await
            .map_err(|source| SessionError::ConnectFailed {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        info!("connected to platform at {addr}");
        self.attach(stream).await
    }

    /// Takes ownership of an already-open byte stream and starts reading.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyConnected`] on a live session.
    pub async fn attach<S>(&self, stream: S) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut guard = self.shared.writer.lock().await;
        if self.is_connected() {
            return Err(SessionError::AlreadyConnected);
        }
        let (reader, writer) = tokio::io::split(stream);
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *guard = Some(Box::new(writer));
        *lock(&self.shared.state) = SessionState::Connected;

        let decoder = StreamDecoder::with_config(self.config.decoder);
        let task = tokio::spawn(read_loop(
            reader,
            decoder,
            self.config.read_buffer_size.max(1),
            Arc::clone(&self.shared),
            generation,
        ));
        if let Some(previous) = lock(&self.reader_task).replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Serializes `packet` and writes it to the stream in one `write_all`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Protocol`] if the packet cannot be encoded.
    /// - [`SessionError::NotConnected`] if no stream is attached.
    /// - [`SessionError::Io`] if the write fails; the session is then closed.
    pub async fn send(&self, packet: &Packet) -> Result<(), SessionError> {
        let bytes = packet.to_protocol_bytes()?;
        let mut guard = self.shared.writer.lock().await;
        let writer = guard.as_mut().ok_or(SessionError::NotConnected)?;

        let written = match writer.write_all(&bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            error!("failed to send packet cmd={:02x}: {e}", packet.command_flag);
            guard.take();
            self.stop_reader();
            self.shared.mark_disconnected();
            return Err(SessionError::Io(e));
        }
        debug!("sent {} bytes cmd={:02x}", bytes.len(), packet.command_flag);
        Ok(())
    }

    /// Closes the connection.  A no-op on a session that is not connected.
    ///
    /// Returns once the reader task has stopped, so a following
    /// [`attach`](Self::attach) never races the old reader.
    pub async fn disconnect(&self) {
        let mut guard = self.shared.writer.lock().await;
        let reader = lock(&self.reader_task).take();
        if let Some(task) = &reader {
            task.abort();
        }
        if let Some(mut writer) = guard.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("shutdown of write half failed: {e}");
            }
        }
        if self.is_connected() {
            info!("disconnected from platform");
        }
        self.shared.mark_disconnected();
        drop(guard);

        if let Some(task) = reader {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("reader task ended abnormally: {e}");
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    fn stop_reader(&self) {
        if let Some(task) = lock(&self.reader_task).take() {
            task.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

#[async_trait]
impl PacketSender for Session {
    async fn send_packet(&self, packet: &Packet) -> Result<(), String> {
        self.send(packet).await.map_err(|e| e.to_string())
    }
}

// ── Reader task ───────────────────────────────────────────────────────────────

/// Reads from the stream until EOF or error, dispatching every decoded packet.
async fn read_loop<R>(
    mut reader: R,
    mut decoder: StreamDecoder,
    buffer_size: usize,
    shared: Arc<Shared>,
    generation: u64,
) where
    R: AsyncRead + Unpin,
{
    let mut read_tmp = vec![0u8; buffer_size];

    loop {
        let n = match reader.read(&mut read_tmp).await {
            Ok(0) => {
                info!("platform closed the connection");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("read from platform failed: {e}");
                break;
            }
        };

        for packet in decoder.decode_stream(&read_tmp[..n]) {
            if !shared.is_current(generation) || shared.state() != SessionState::Connected {
                return;
            }
            debug!("received {packet}");
            shared.dispatch(packet);
        }
    }

    let stats = decoder.stats();
    debug!(
        "reader exiting: {} packets, {} checksum failures, {} bytes discarded",
        stats.packets_decoded, stats.checksum_failures, stats.bytes_discarded
    );
    let mut guard = shared.writer.lock().await;
    if !shared.is_current(generation) {
        debug!("reader for a replaced connection exiting without teardown");
        return;
    }
    guard.take();
    shared.mark_disconnected();
}

// ── Tests ─────────────────────────────────────────────────────────────────────
