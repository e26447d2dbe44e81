use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::Version;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

/// Bound on how long a synchronous send waits for the consumer's reply
/// before giving up with [`SendError::Timeout`].
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(5000);

/// Liveness query for a chunk consumer.
///
/// The channel always detects a locally dropped [`ChunkReceiver`] by itself.
/// Deployments where the consumer may live on another node plug their
/// process registry's view in via [`ChunkHandle::with_liveness`]; single-node
/// deployments need none.
pub trait Liveness: Send + Sync + 'static {
    fn is_alive(&self) -> bool;
}

/// One message on the chunk channel.
///
/// A reply handle is present only for synchronous sends; fire-and-forget
/// sends carry `None`.
#[derive(Debug)]
pub enum ChunkMessage {
    /// One body fragment.
    Data(Bytes, Option<ReplyHandle>),
    /// End of body. The consumer finalizes the stream terminator on receipt.
    Close(Option<ReplyHandle>),
}

/// Consumer-side end of a synchronous delivery.
///
/// Dropping it without answering reads as [`SendError::Closed`] on the
/// producer side.
#[derive(Debug)]
pub struct ReplyHandle(oneshot::Sender<Result<(), String>>);

impl ReplyHandle {
    /// Acknowledge the delivery.
    pub fn ok(self) {
        let _ = self.0.send(Ok(()));
    }

    /// Report a delivery failure. The reason reaches the producer verbatim
    /// as [`SendError::Error`].
    pub fn error(self, reason: impl Into<String>) {
        let _ = self.0.send(Err(reason.into()));
    }
}

/// A synchronous send or close did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The consumer already terminated. Permanent; the stream is gone and
    /// this channel never retries it.
    Closed,
    /// No reply arrived within the bound. The caller decides whether to
    /// re-issue or abandon; nothing is retried automatically.
    Timeout,
    /// The consumer reported a delivery failure. The reason is opaque to
    /// this channel and passed through unchanged.
    Error(String),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed => f.write_str("chunk consumer closed"),
            SendError::Timeout => f.write_str("timed out waiting for chunk consumer reply"),
            SendError::Error(reason) => write!(f, "chunk consumer error: {reason}"),
        }
    }
}

impl Error for SendError {}

/// Streaming is not available on this connection's protocol version.
///
/// Fatal to streaming for that connection only; callers fall back to a
/// non-streamed response path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotSupported {
    version: Version,
}

impl NotSupported {
    pub fn version(&self) -> Version {
        self.version
    }
}

impl fmt::Display for NotSupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunked streaming not supported on {:?}", self.version)
    }
}

impl Error for NotSupported {}

/// Create a chunk channel for a connection, if its protocol version can
/// frame a streamed body.
///
/// HTTP/0.9 and HTTP/1.0 have no chunked transfer encoding and yield
/// [`NotSupported`]; HTTP/1.1 and later succeed. The connection actor keeps
/// the [`ChunkReceiver`] and hands the [`ChunkHandle`] to request handling.
pub fn chunk_channel(version: Version) -> Result<(ChunkHandle, ChunkReceiver), NotSupported> {
    if version < Version::HTTP_11 {
        return Err(NotSupported { version });
    }

    let (tx, rx) = mpsc::unbounded_channel();

    let handle = ChunkHandle {
        tx,
        closed: Arc::new(AtomicBool::new(false)),
        liveness: None,
    };

    Ok((handle, ChunkReceiver { rx }))
}

/// Producer handle addressing one chunk consumer.
///
/// Cheap to clone and share across producer call sites; all clones address
/// the same consumer and share the same closed state. Equality is consumer
/// identity: two handles are equal iff they address the same consumer.
#[derive(Clone)]
pub struct ChunkHandle {
    tx: mpsc::UnboundedSender<ChunkMessage>,
    closed: Arc<AtomicBool>,
    liveness: Option<Arc<dyn Liveness>>,
}

impl ChunkHandle {
    /// Attach a pluggable liveness provider, consulted on every synchronous
    /// send in addition to the built-in local check.
    pub fn with_liveness(mut self, liveness: Arc<dyn Liveness>) -> Self {
        self.liveness = Some(liveness);
        self
    }

    /// Whether the addressed consumer can still receive messages.
    pub fn is_alive(&self) -> bool {
        if self.closed.load(Ordering::Acquire) || self.tx.is_closed() {
            return false;
        }
        self.liveness.as_ref().map_or(true, |liveness| liveness.is_alive())
    }

    /// Fire-and-forget enqueue of one body fragment.
    ///
    /// Never blocks. The only guarantee is mailbox order relative to other
    /// sends from this producer to this handle. Sends against a closed
    /// handle are dropped silently.
    pub fn send_async(&self, data: Bytes) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let _ = self.tx.send(ChunkMessage::Data(data, None));
    }

    /// Send one body fragment and wait for the consumer's acknowledgement,
    /// up to [`DEFAULT_SEND_TIMEOUT`].
    pub async fn send_sync(&self, data: Bytes) -> Result<(), SendError> {
        self.send_sync_timeout(data, DEFAULT_SEND_TIMEOUT).await
    }

    /// [`send_sync`](Self::send_sync) with an explicit wall-clock bound.
    ///
    /// A dead consumer is detected up front and returns
    /// [`SendError::Closed`] immediately, never waiting out the timeout. On
    /// [`SendError::Timeout`] nothing is retried; the caller decides.
    pub async fn send_sync_timeout(&self, data: Bytes, timeout: Duration) -> Result<(), SendError> {
        self.deliver(|reply| ChunkMessage::Data(data, Some(reply)), timeout).await
    }

    /// Signal end-of-body and wait for the consumer's acknowledgement.
    ///
    /// On success the handle (and every clone of it) is closed for good;
    /// further sends return [`SendError::Closed`].
    pub async fn close(&self) -> Result<(), SendError> {
        self.close_timeout(DEFAULT_SEND_TIMEOUT).await
    }

    /// [`close`](Self::close) with an explicit wall-clock bound.
    pub async fn close_timeout(&self, timeout: Duration) -> Result<(), SendError> {
        let result = self.deliver(|reply| ChunkMessage::Close(Some(reply)), timeout).await;
        if result.is_ok() {
            self.closed.store(true, Ordering::Release);
        }
        result
    }

    async fn deliver(
        &self,
        message: impl FnOnce(ReplyHandle) -> ChunkMessage,
        timeout: Duration,
    ) -> Result<(), SendError> {
        // fast path: an already-dead consumer must fail immediately, not
        // after the timeout
        if !self.is_alive() {
            tracing::trace!("chunk consumer gone, failing send fast");
            return Err(SendError::Closed);
        }

        let (reply_tx, reply_rx) = oneshot::channel();

        if self.tx.send(message(ReplyHandle(reply_tx))).is_err() {
            return Err(SendError::Closed);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(SendError::Error(reason)),
            // consumer dropped the reply handle without answering
            Ok(Err(_)) => Err(SendError::Closed),
            Err(_) => {
                tracing::trace!(?timeout, "chunk consumer reply timed out");
                Err(SendError::Timeout)
            }
        }
    }
}

impl PartialEq for ChunkHandle {
    fn eq(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

impl Eq for ChunkHandle {}

impl fmt::Debug for ChunkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkHandle")
            .field("closed", &self.closed.load(Ordering::Acquire))
            .field("has_liveness", &self.liveness.is_some())
            .finish()
    }
}

/// Consumer endpoint of a chunk channel, owned by the connection actor.
///
/// Messages arrive in mailbox order: FIFO per producer handle, with no
/// ordering across distinct producers sending concurrently.
#[derive(Debug)]
pub struct ChunkReceiver {
    rx: mpsc::UnboundedReceiver<ChunkMessage>,
}

impl ChunkReceiver {
    /// Receive the next message, or `None` once every producer handle has
    /// been dropped.
    pub async fn recv(&mut self) -> Option<ChunkMessage> {
        self.rx.recv().await
    }

    /// Stop accepting messages.
    ///
    /// Producer handles observe the closed channel on their liveness fast
    /// path, so synchronous sends fail as [`SendError::Closed`] immediately
    /// instead of waiting out their timeout. Messages already in the
    /// mailbox can still be drained with [`recv`](Self::recv).
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub(crate) fn poll_recv(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<ChunkMessage>> {
        self.rx.poll_recv(cx)
    }
}
