//! Per-connection session state and pump loops.
//!
//! Each accepted connection gets one [`Session`] and two pump tasks. The
//! outbound pump drains the session's bounded queue into the write half and
//! emits keepalive pings. The inbound pump reads frames under a liveness
//! deadline and drives the receive-side callbacks. All user-facing send
//! operations are non-blocking enqueues; a full queue drops the message and
//! reports it instead of slowing the producer down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use axum::body::Bytes;
use axum::extract::ws::{CloseCode, CloseFrame, Message, Utf8Bytes};
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval, timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::envelope::Envelope;
use crate::error::{CourierError, Result};
use crate::gateway::Handlers;

/// One live WebSocket connection.
///
/// Sessions are handed to callbacks as `Arc<Session>` and stay valid after
/// close; operations on a closed session fail with
/// [`CourierError::SessionClosed`]. The attribute map carries
/// connection-scoped state (user id, room, roles) and is the input to
/// broadcast filters and session lookups.
pub struct Session {
    id: Uuid,
    attributes: RwLock<HashMap<String, serde_json::Value>>,
    queue: Mutex<Option<mpsc::Sender<Envelope>>>,
    open: AtomicBool,
    halt: CancellationToken,
    config: Arc<Config>,
    handlers: Arc<Handlers>,
    this: Weak<Session>,
}

impl Session {
    pub(crate) fn new(
        attributes: HashMap<String, serde_json::Value>,
        queue: mpsc::Sender<Envelope>,
        config: Arc<Config>,
        handlers: Arc<Handlers>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: Uuid::new_v4(),
            attributes: RwLock::new(attributes),
            queue: Mutex::new(Some(queue)),
            open: AtomicBool::new(true),
            halt: CancellationToken::new(),
            config,
            handlers,
            this: this.clone(),
        })
    }

    /// Identifier for logging and registry keys. Unrelated to any
    /// application-level identity; use attributes for that.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        !self.open.load(Ordering::Acquire)
    }

    /// Returns a clone of the attribute value, if present.
    pub fn attribute(&self, key: &str) -> Option<serde_json::Value> {
        self.attributes.read().get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.attributes.write().insert(key.into(), value.into());
    }

    /// Queues a text frame for delivery.
    ///
    /// Returns once the frame is queued; delivery is asynchronous. If the
    /// queue is full the frame is dropped and reported to the error
    /// callback, and this still returns `Ok`.
    ///
    /// # Errors
    /// [`CourierError::SessionClosed`] if the session has already closed.
    pub fn send(&self, payload: impl Into<Utf8Bytes>) -> Result<()> {
        if self.is_closed() {
            return Err(CourierError::SessionClosed);
        }
        self.dispatch(Envelope::text(payload));
        Ok(())
    }

    /// Queues a binary frame for delivery. Same contract as [`send`](Self::send).
    pub fn send_binary(&self, payload: impl Into<Bytes>) -> Result<()> {
        if self.is_closed() {
            return Err(CourierError::SessionClosed);
        }
        self.dispatch(Envelope::binary(payload));
        Ok(())
    }

    /// Queues a bare close frame. The connection tears down once the frame
    /// is written and the peer completes the handshake.
    ///
    /// # Errors
    /// [`CourierError::SessionClosed`] if the session has already closed.
    pub fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Err(CourierError::SessionClosed);
        }
        self.dispatch(Envelope::close(None));
        Ok(())
    }

    /// Queues a close frame carrying a status code and reason.
    pub fn close_with(&self, code: CloseCode, reason: impl Into<Utf8Bytes>) -> Result<()> {
        if self.is_closed() {
            return Err(CourierError::SessionClosed);
        }
        self.dispatch(Envelope::close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })));
        Ok(())
    }

    /// Best-effort enqueue; failures go to the error callback.
    fn dispatch(&self, envelope: Envelope) {
        if let Err(err) = self.enqueue(envelope) {
            self.report(err);
        }
    }

    /// Non-blocking enqueue onto the outbound queue.
    pub(crate) fn enqueue(&self, envelope: Envelope) -> Result<()> {
        let Some(queue) = self.queue.lock().clone() else {
            return Err(CourierError::SessionClosed);
        };
        match queue.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(CourierError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(CourierError::SessionClosed),
        }
    }

    /// Routes a session-scoped failure to the error callback.
    pub(crate) fn report(&self, err: CourierError) {
        if let Some(this) = self.this.upgrade() {
            (self.handlers.error)(this, err);
        }
    }

    /// Marks the session closed, closes the queue, and stops the pumps.
    /// Idempotent; later calls are no-ops.
    pub(crate) fn teardown(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.queue.lock().take();
            self.halt.cancel();
            tracing::debug!(session_id = %self.id, "session closed");
        }
    }

    /// Outbound pump. Owns the write half for the life of the connection and
    /// is the only writer. Terminates when the queue closes, a close frame is
    /// written, a write fails, or the session is torn down.
    pub(crate) async fn run_outbound<W>(
        self: Arc<Self>,
        mut queue: mpsc::Receiver<Envelope>,
        mut writer: W,
    ) where
        W: Sink<Message, Error = axum::Error> + Unpin,
    {
        let mut keepalive = interval(self.config.ping_interval());
        keepalive.tick().await; // Skip the immediate first tick

        loop {
            tokio::select! {
                next = queue.recv() => {
                    let Some(envelope) = next else {
                        break;
                    };
                    let message = envelope.into_message();
                    let written = match &message {
                        Message::Text(text) => Some(Message::Text(text.clone())),
                        Message::Binary(payload) => Some(Message::Binary(payload.clone())),
                        _ => None,
                    };
                    let closing = matches!(message, Message::Close(_));
                    if let Err(err) = self.write_frame(&mut writer, message).await {
                        self.report(err);
                        break;
                    }
                    if closing {
                        break;
                    }
                    match written {
                        Some(Message::Text(text)) => (self.handlers.sent)(self.clone(), text),
                        Some(Message::Binary(payload)) => {
                            (self.handlers.sent_binary)(self.clone(), payload);
                        }
                        _ => {}
                    }
                }
                _ = keepalive.tick() => {
                    // A dead peer is detected by the read deadline, not here.
                    if let Err(err) = self.write_frame(&mut writer, Message::Ping(Bytes::new())).await {
                        tracing::debug!(session_id = %self.id, error = %err, "keepalive ping failed");
                    }
                }
                _ = self.halt.cancelled() => break,
            }
        }
    }

    async fn write_frame<W>(&self, writer: &mut W, message: Message) -> Result<()>
    where
        W: Sink<Message, Error = axum::Error> + Unpin,
    {
        match timeout(self.config.write_timeout(), writer.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(CourierError::Transport(source)),
            Err(_) => Err(CourierError::WriteTimeout(self.config.write_timeout())),
        }
    }

    /// Inbound pump. Reads frames under the liveness deadline and drives the
    /// receive-side callbacks. Only pong frames renew the deadline, so a peer
    /// that stops answering keepalive pings is detected even if it keeps the
    /// TCP connection open.
    pub(crate) async fn run_inbound<R>(self: Arc<Self>, mut reader: R)
    where
        R: Stream<Item = std::result::Result<Message, axum::Error>> + Unpin,
    {
        let mut deadline = Instant::now() + self.config.pong_timeout();

        loop {
            let message = match timeout_at(deadline, reader.next()).await {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(source))) => {
                    self.report(CourierError::Transport(source));
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    self.report(CourierError::ReadTimeout(self.config.pong_timeout()));
                    break;
                }
            };

            match message {
                Message::Text(text) => (self.handlers.message)(self.clone(), text),
                Message::Binary(payload) => (self.handlers.message_binary)(self.clone(), payload),
                Message::Pong(_) => {
                    deadline = Instant::now() + self.config.pong_timeout();
                    (self.handlers.pong)(self.clone());
                }
                Message::Ping(_) => {
                    // axum answers pings at the protocol layer
                }
                Message::Close(frame) => {
                    if let Some(on_close) = &self.handlers.close {
                        on_close(self.clone(), frame.clone());
                    }
                    if let Some(frame) = frame {
                        if self.config.is_abnormal_close(frame.code) {
                            self.report(CourierError::AbnormalClose {
                                code: frame.code,
                                reason: frame.reason.as_str().to_owned(),
                            });
                        }
                    }
                    break;
                }
            }
        }
    }
}
