//! Gateway: the crate's public entry point.
//!
//! A [`Gateway`] owns the configuration, the callback set, and the hub of
//! live sessions. Configure callbacks while the gateway is still exclusively
//! owned, then share it behind an `Arc` and hand upgrade requests to
//! [`Gateway::handle_upgrade`] from an axum route.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseCode, CloseFrame, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::envelope::Envelope;
use crate::error::{CourierError, Result};
use crate::hub::Hub;
use crate::session::Session;

type SessionHandler = Arc<dyn Fn(Arc<Session>) + Send + Sync>;
type TextHandler = Arc<dyn Fn(Arc<Session>, Utf8Bytes) + Send + Sync>;
type BinaryHandler = Arc<dyn Fn(Arc<Session>, Bytes) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(Arc<Session>, CourierError) + Send + Sync>;
type CloseHandler = Arc<dyn Fn(Arc<Session>, Option<CloseFrame>) + Send + Sync>;

/// Callback set shared with every session the gateway accepts.
///
/// All callbacks default to no-ops except `close`, which is unset so the
/// transport's own close handling applies when the application does not
/// care about close frames.
#[derive(Clone)]
pub(crate) struct Handlers {
    pub(crate) connect: SessionHandler,
    pub(crate) disconnect: SessionHandler,
    pub(crate) message: TextHandler,
    pub(crate) message_binary: BinaryHandler,
    pub(crate) sent: TextHandler,
    pub(crate) sent_binary: BinaryHandler,
    pub(crate) error: ErrorHandler,
    pub(crate) pong: SessionHandler,
    pub(crate) close: Option<CloseHandler>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            connect: Arc::new(|_| {}),
            disconnect: Arc::new(|_| {}),
            message: Arc::new(|_, _| {}),
            message_binary: Arc::new(|_, _| {}),
            sent: Arc::new(|_, _| {}),
            sent_binary: Arc::new(|_, _| {}),
            error: Arc::new(|_, _| {}),
            pong: Arc::new(|_| {}),
            close: None,
        }
    }
}

/// WebSocket session manager.
///
/// Callbacks are registered through `&mut self` before the gateway is
/// shared, so a connection only ever observes one coherent callback set.
/// Everything else takes `&self` and is safe to call from any task,
/// including from inside callbacks.
pub struct Gateway {
    config: Arc<Config>,
    handlers: Handlers,
    hub: Hub,
}

impl Gateway {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            handlers: Handlers::default(),
            hub: Hub::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Called after a session is registered, before its first frame.
    pub fn on_connect(&mut self, handler: impl Fn(Arc<Session>) + Send + Sync + 'static) {
        self.handlers.connect = Arc::new(handler);
    }

    /// Called once per connection, after both pumps have stopped and the
    /// session left the registry.
    pub fn on_disconnect(&mut self, handler: impl Fn(Arc<Session>) + Send + Sync + 'static) {
        self.handlers.disconnect = Arc::new(handler);
    }

    /// Called for every text frame received from the peer.
    pub fn on_message(
        &mut self,
        handler: impl Fn(Arc<Session>, Utf8Bytes) + Send + Sync + 'static,
    ) {
        self.handlers.message = Arc::new(handler);
    }

    /// Called for every binary frame received from the peer.
    pub fn on_message_binary(
        &mut self,
        handler: impl Fn(Arc<Session>, Bytes) + Send + Sync + 'static,
    ) {
        self.handlers.message_binary = Arc::new(handler);
    }

    /// Called after a text frame is written to the peer.
    pub fn on_sent(&mut self, handler: impl Fn(Arc<Session>, Utf8Bytes) + Send + Sync + 'static) {
        self.handlers.sent = Arc::new(handler);
    }

    /// Called after a binary frame is written to the peer.
    pub fn on_sent_binary(
        &mut self,
        handler: impl Fn(Arc<Session>, Bytes) + Send + Sync + 'static,
    ) {
        self.handlers.sent_binary = Arc::new(handler);
    }

    /// Called for every session-scoped failure: dropped frames, timeouts,
    /// transport errors, and abnormal close codes.
    pub fn on_error(
        &mut self,
        handler: impl Fn(Arc<Session>, CourierError) + Send + Sync + 'static,
    ) {
        self.handlers.error = Arc::new(handler);
    }

    /// Called for every pong received from the peer.
    pub fn on_pong(&mut self, handler: impl Fn(Arc<Session>) + Send + Sync + 'static) {
        self.handlers.pong = Arc::new(handler);
    }

    /// Called when the peer sends a close frame, before the session tears
    /// down. The frame is `None` when the peer closed without a status code.
    pub fn on_close(
        &mut self,
        handler: impl Fn(Arc<Session>, Option<CloseFrame>) + Send + Sync + 'static,
    ) {
        self.handlers.close = Some(Arc::new(handler));
    }

    /// Turns an upgrade request into a managed connection.
    ///
    /// The returned response completes the handshake; the session lifecycle
    /// then runs on the connection task via [`accept`](Self::accept).
    ///
    /// # Errors
    /// [`CourierError::Closed`] if the gateway has shut down. Nothing is
    /// registered in that case and the caller decides how to answer the
    /// request.
    pub fn handle_upgrade(self: Arc<Self>, upgrade: WebSocketUpgrade) -> Result<Response> {
        self.handle_upgrade_with_attributes(upgrade, HashMap::new())
    }

    /// Same as [`handle_upgrade`](Self::handle_upgrade), seeding the new
    /// session's attribute map. Useful for carrying request state (user id,
    /// path parameters) into broadcast filters.
    pub fn handle_upgrade_with_attributes(
        self: Arc<Self>,
        upgrade: WebSocketUpgrade,
        attributes: HashMap<String, serde_json::Value>,
    ) -> Result<Response> {
        if self.hub.is_closed() {
            return Err(CourierError::Closed);
        }
        let response = upgrade
            .max_message_size(self.config.max_message_size)
            .max_frame_size(self.config.max_message_size)
            .on_failed_upgrade(|err| {
                tracing::debug!(error = %err, "websocket upgrade failed");
            })
            .on_upgrade(move |socket| async move {
                if let Err(err) = self.accept_with_attributes(socket, attributes).await {
                    tracing::debug!(error = %err, "connection not accepted");
                }
            });
        Ok(response)
    }

    /// Runs one connection's full lifecycle and returns after teardown.
    ///
    /// Most callers go through [`handle_upgrade`](Self::handle_upgrade);
    /// this is the entry point for driving an already-upgraded socket.
    ///
    /// # Errors
    /// [`CourierError::Closed`] if the gateway shut down before the session
    /// could be registered.
    pub async fn accept(self: Arc<Self>, socket: WebSocket) -> Result<()> {
        self.accept_with_attributes(socket, HashMap::new()).await
    }

    pub async fn accept_with_attributes(
        self: Arc<Self>,
        socket: WebSocket,
        attributes: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let (queue, queue_rx) = mpsc::channel(self.config.session_queue_capacity);
        let session = Session::new(
            attributes,
            queue,
            self.config.clone(),
            Arc::new(self.handlers.clone()),
        );
        self.hub.register(session.clone())?;
        (self.handlers.connect)(session.clone());

        let (writer, reader) = socket.split();
        let outbound = tokio::spawn(session.clone().run_outbound(queue_rx, writer));
        session.clone().run_inbound(reader).await;

        if !self.hub.is_closed() {
            // A concurrent shutdown may have emptied the registry already.
            let _ = self.hub.unregister(&session);
        }
        session.teardown();
        let _ = outbound.await;
        (self.handlers.disconnect)(session);

        Ok(())
    }

    /// Sends a text frame to every live session.
    ///
    /// Returns once every delivery is queued. Sessions that cannot take the
    /// frame are reported through the error callback and skipped.
    ///
    /// # Errors
    /// [`CourierError::Closed`] if the gateway has shut down.
    pub fn broadcast(&self, payload: impl Into<Utf8Bytes>) -> Result<()> {
        self.hub.broadcast(Envelope::text(payload))
    }

    /// Sends a text frame to every live session the filter accepts.
    pub fn broadcast_filter(
        &self,
        payload: impl Into<Utf8Bytes>,
        filter: impl Fn(&Session) -> bool + Send + Sync + 'static,
    ) -> Result<()> {
        self.hub.broadcast(Envelope::text(payload).filtered(filter))
    }

    /// Sends a text frame to every live session except `sender`.
    pub fn broadcast_others(
        &self,
        payload: impl Into<Utf8Bytes>,
        sender: &Arc<Session>,
    ) -> Result<()> {
        let sender = sender.clone();
        self.broadcast_filter(payload, move |candidate| {
            !std::ptr::eq(candidate, sender.as_ref())
        })
    }

    /// Sends a binary frame to every live session.
    pub fn broadcast_binary(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.hub.broadcast(Envelope::binary(payload))
    }

    /// Sends a binary frame to every live session the filter accepts.
    pub fn broadcast_binary_filter(
        &self,
        payload: impl Into<Bytes>,
        filter: impl Fn(&Session) -> bool + Send + Sync + 'static,
    ) -> Result<()> {
        self.hub.broadcast(Envelope::binary(payload).filtered(filter))
    }

    /// Sends a binary frame to every live session except `sender`.
    pub fn broadcast_binary_others(
        &self,
        payload: impl Into<Bytes>,
        sender: &Arc<Session>,
    ) -> Result<()> {
        let sender = sender.clone();
        self.broadcast_binary_filter(payload, move |candidate| {
            !std::ptr::eq(candidate, sender.as_ref())
        })
    }

    /// Sends a text frame to each listed session in order.
    ///
    /// # Errors
    /// [`CourierError::Closed`] if the gateway has shut down, or the first
    /// per-session error; later sessions in the list are then skipped.
    pub fn broadcast_multiple(
        &self,
        payload: impl Into<Utf8Bytes>,
        sessions: &[Arc<Session>],
    ) -> Result<()> {
        if self.hub.is_closed() {
            return Err(CourierError::Closed);
        }
        let payload = payload.into();
        for session in sessions {
            session.send(payload.clone())?;
        }
        Ok(())
    }

    /// First live session matching the predicate, in unspecified order.
    ///
    /// The predicate runs under the registry read lock; keep it cheap and do
    /// not call gateway operations from inside it.
    pub fn find_session(&self, accept: impl Fn(&Session) -> bool) -> Option<Arc<Session>> {
        self.hub.find(accept)
    }

    /// Visits live sessions in unspecified order until the visitor returns
    /// false. Same locking caveat as [`find_session`](Self::find_session).
    pub fn for_each_until(&self, visit: impl FnMut(&Arc<Session>) -> bool) {
        self.hub.for_each_until(visit)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.hub.len()
    }

    pub fn is_closed(&self) -> bool {
        self.hub.is_closed()
    }

    /// Shuts the gateway down: queues a bare close frame to every live
    /// session, empties the registry, and rejects all further operations.
    ///
    /// Connections finish asynchronously as their close frames drain.
    ///
    /// # Errors
    /// [`CourierError::Closed`] if the gateway already shut down.
    pub fn close(&self) -> Result<()> {
        self.hub.shutdown(Envelope::close(None))
    }

    /// Shutdown announcing a status code and reason to every session.
    pub fn close_with(&self, code: CloseCode, reason: impl Into<Utf8Bytes>) -> Result<()> {
        self.hub.shutdown(Envelope::close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
