//! SWANK protocol session over TCP.
//!
//! This module provides [`Session`], an async client for a running SWANK
//! server. Requests are correlated with replies by id, so several may be in
//! flight at once and replies may arrive in any order. A background reader
//! task owns the read half of the socket: it reassembles frames, classifies
//! each message, resolves pending requests, answers pings, and broadcasts
//! everything else as [`SessionEvent`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::ipc::codec::{encode_message, encode_request, CodecError, ThreadSelector};
use crate::ipc::events::{ProtocolEvent, ReturnStatus, SessionEvent};
use crate::ipc::framing::{write_frame, FrameError, FrameReader};
use crate::models::{ConnectionInfo, Value};
use crate::syntax::{self, DEFAULT_PACKAGE};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Buffered session events per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 256;

const READ_CHUNK: usize = 8 * 1024;

/// Session-level error types.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Failed to reach the SWANK server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] std::io::Error),

    /// No reply within the request timeout. The request stays pending.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// The remote answered with a non-`:ok` status.
    #[error("Request aborted: {0}")]
    Aborted(String),

    /// The remote could not read the request.
    #[error("Invalid RPC: {0}")]
    InvalidRpc(String),

    /// Framing or message-shape error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The connection closed before a reply arrived.
    #[error("Connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    #[error(transparent)]
    Encode(#[from] CodecError),
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                SessionError::ConnectionFailed(err)
            }
            _ => SessionError::Io(err),
        }
    }
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        SessionError::Protocol(err.to_string())
    }
}

type Reply = Result<Value, SessionError>;

// =============================================================================
// Shared State
// =============================================================================

/// State shared between the session handle and its reader task.
struct Shared {
    writer: AsyncMutex<Option<OwnedWriteHalf>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    events: broadcast::Sender<SessionEvent>,
    closed: AtomicBool,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.len() >= EVENT_CAPACITY {
            warn!(?event, "Event buffer full, slowest subscriber loses the oldest event");
        }
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    async fn write(&self, framed: &str) -> Result<(), SessionError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SessionError::Closed)?;
        write_frame(writer, framed).await?;
        Ok(())
    }

    fn resolve(&self, id: u64, reply: Reply) {
        let sender = self.pending().remove(&id);
        match sender {
            Some(tx) => {
                if tx.send(reply).is_err() {
                    debug!(id, "Reply arrived after the caller gave up");
                }
            }
            None => warn!(id, "Reply for unknown request"),
        }
    }

    /// Answer a ping from its own task so the reader never waits on the
    /// writer lock.
    fn pong(self: &Arc<Self>, thread: Value, tag: Value) {
        let pong = Value::List(vec![Value::keyword("emacs-pong"), thread, tag]);
        let framed = match encode_message(&pong) {
            Ok(framed) => framed,
            Err(e) => {
                warn!(error = %e, "Failed to encode pong");
                return;
            }
        };
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = shared.write(&framed).await {
                warn!(error = %e, "Failed to answer ping");
            }
        });
    }

    fn handle_message(self: &Arc<Self>, payload: &str) {
        let forms = syntax::parse(payload);
        let Some(form) = forms.first() else {
            debug!("Dropping empty frame");
            return;
        };
        let message = Value::from_expr(form);
        let Some(event) = ProtocolEvent::classify(&message) else {
            debug!(payload, "Dropping unclassified message");
            return;
        };

        match event {
            ProtocolEvent::Return {
                id,
                status,
                payload,
            } => {
                debug!(id, ?status, "Reply received");
                let reply = match &status {
                    ReturnStatus::Ok => Ok(payload),
                    ReturnStatus::Abort(reason) => Err(SessionError::Aborted(reason.clone())),
                };
                self.resolve(id, reply);
                self.emit(SessionEvent::Return { id, status });
            }
            ProtocolEvent::InvalidRpc { id, message } => {
                warn!(id, %message, "Server rejected request");
                self.resolve(id, Err(SessionError::InvalidRpc(message)));
            }
            ProtocolEvent::Ping { thread, tag } => self.pong(thread, tag),
            ProtocolEvent::DebugEntered(info) => {
                info!(thread = info.thread, level = info.level, "Debugger entered");
                self.emit(SessionEvent::DebugEntered(info));
            }
            ProtocolEvent::DebugActivated { thread, level } => {
                self.emit(SessionEvent::DebugActivated { thread, level });
            }
            ProtocolEvent::DebugReturned { thread, level } => {
                debug!(thread, level, "Debugger returned");
                self.emit(SessionEvent::DebugReturned { thread, level });
            }
            ProtocolEvent::Output(text) => {
                self.emit(SessionEvent::Output { text });
            }
            ProtocolEvent::PackageChanged { name, prompt } => {
                self.emit(SessionEvent::PackageChanged { name, prompt });
            }
        }
    }

    /// Reject every pending request and announce the close. Runs once.
    fn teardown(&self, failure: Option<String>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let drained: Vec<_> = self.pending().drain().collect();
        if !drained.is_empty() {
            warn!(count = drained.len(), "Rejecting pending requests on close");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(SessionError::Closed));
        }

        if let Some(message) = failure {
            self.emit(SessionEvent::Error { message });
        }
        self.emit(SessionEvent::Closed);
    }
}

async fn read_loop(mut reader: OwnedReadHalf, shared: Arc<Shared>) {
    let mut frames = FrameReader::new();
    let mut buf = vec![0u8; READ_CHUNK];

    let failure = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                info!("Connection closed by server");
                break None;
            }
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "Read failed");
                break Some(e.to_string());
            }
        };

        if let Err(e) = frames.feed(&buf[..n]) {
            error!(error = %e, "Framing error, dropping connection");
            break Some(e.to_string());
        }

        let drained = loop {
            match frames.take_frame() {
                Ok(Some(payload)) => shared.handle_message(&payload),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        if let Err(e) = drained {
            error!(error = %e, "Framing error, dropping connection");
            break Some(e.to_string());
        }
    };

    shared.writer.lock().await.take();
    shared.teardown(failure);
}

// =============================================================================
// Session
// =============================================================================

/// A request in flight.
///
/// Dropping the handle abandons interest in the reply but does not cancel
/// the request on the server.
#[derive(Debug)]
pub struct ReplyHandle {
    id: u64,
    rx: oneshot::Receiver<Reply>,
    timeout: Duration,
}

impl ReplyHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the reply, up to the session timeout captured at dispatch.
    pub async fn wait(self) -> Result<Value, SessionError> {
        match timeout(self.timeout, self.rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => Err(SessionError::Timeout(self.timeout.as_secs())),
        }
    }
}

/// Connection to a SWANK server.
///
/// # Example
///
/// ```ignore
/// use lisp_editor_core::ipc::Session;
///
/// let session = Session::connect("127.0.0.1", 4005).await?;
/// let result = session.eval("(+ 1 2)").await?;
/// ```
pub struct Session {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    /// Monotonically increasing request ID counter.
    request_id: AtomicU64,
    timeout: Duration,
    package: String,
    info: Option<ConnectionInfo>,
}

impl Session {
    /// Connect and perform the `connection-info` handshake.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ConnectionFailed` if the server is not
    /// listening, or the handshake's error if the server does not answer it.
    pub async fn connect(host: &str, port: u16) -> Result<Self, SessionError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(SessionError::ConnectionFailed)?;
        info!(host, port, "Connected to SWANK server");

        let mut session = Self::attach(stream);
        match session.request_connection_info().await {
            Ok(info) => {
                info!(
                    pid = ?info.pid,
                    implementation = ?info.implementation,
                    version = ?info.version,
                    "Handshake complete"
                );
                session.info = Some(info);
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "Handshake failed");
                session.close().await;
                Err(e)
            }
        }
    }

    /// Connect with automatic retry and exponential backoff.
    ///
    /// Retries with delays of 100ms, 200ms, 400ms, etc. At least one
    /// attempt is always made.
    pub async fn connect_with_retry(
        host: &str,
        port: u16,
        max_attempts: u32,
    ) -> Result<Self, SessionError> {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match Self::connect(host, port).await {
                Ok(session) => return Ok(session),
                Err(e) if attempt < max_attempts => {
                    let delay = Duration::from_millis(100 * (1 << (attempt - 1).min(10)));
                    debug!(attempt, error = %e, ?delay, "Connect failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Connect using host, port, retries, timeout and package from `config`.
    pub async fn connect_with_config(config: &SessionConfig) -> Result<Self, SessionError> {
        let mut session =
            Self::connect_with_retry(&config.host, config.port, config.connect_attempts).await?;
        session.set_timeout(config.timeout());
        session.set_package(&config.default_package);
        Ok(session)
    }

    /// Wrap an already connected stream without a handshake.
    pub fn attach(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            writer: AsyncMutex::new(Some(write_half)),
            pending: Mutex::new(HashMap::new()),
            events,
            closed: AtomicBool::new(false),
        });
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&shared)));

        Self {
            shared,
            reader,
            request_id: AtomicU64::new(1),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            package: DEFAULT_PACKAGE.to_string(),
            info: None,
        }
    }

    /// Set the per-request timeout. Default is 30 seconds.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the package requests are evaluated in.
    pub fn set_package(&mut self, package: &str) {
        self.package = package.to_string();
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Server details from the handshake.
    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.info.as_ref()
    }

    /// Receive session events from now on.
    ///
    /// Each subscriber buffers up to 256 events. A subscriber that falls
    /// further behind gets `RecvError::Lagged` from its next `recv` and has
    /// lost the oldest events, debugger notifications included.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Requests sent but not yet answered.
    pub fn pending_count(&self) -> usize {
        self.shared.pending().len()
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and return a handle to its reply.
    pub async fn dispatch(
        &self,
        form: &Value,
        package: &str,
        thread: ThreadSelector,
    ) -> Result<ReplyHandle, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        let id = self.next_id();
        let framed = encode_request(id, form, package, thread)?;
        let (tx, rx) = oneshot::channel();

        // Registered before writing so a fast reply always finds it
        self.shared.pending().insert(id, tx);
        debug!(id, package, "Sending request");

        if let Err(e) = self.shared.write(&framed).await {
            self.shared.pending().remove(&id);
            return Err(e);
        }

        Ok(ReplyHandle {
            id,
            rx,
            timeout: self.timeout,
        })
    }

    /// Send `form` in the session package and wait for the reply.
    pub async fn send(&self, form: &Value) -> Result<Value, SessionError> {
        self.send_in(form, &self.package, ThreadSelector::Any).await
    }

    pub async fn send_in(
        &self,
        form: &Value,
        package: &str,
        thread: ThreadSelector,
    ) -> Result<Value, SessionError> {
        self.dispatch(form, package, thread).await?.wait().await
    }

    /// Send a message that has no reply, such as `(:emacs-interrupt ...)`.
    pub async fn send_message(&self, message: &Value) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        self.shared.write(&encode_message(message)?).await
    }

    /// Shut the socket and reject every pending request.
    pub async fn close(&self) {
        let writer = self.shared.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "Socket shutdown failed");
            }
        }
        self.reader.abort();
        self.shared.teardown(None);
        info!("Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
