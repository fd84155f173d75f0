//! Outbound message envelopes.

use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes};

use crate::session::Session;

/// Delivery predicate, evaluated once per candidate session at fan-out time.
pub(crate) type SessionFilter = Arc<dyn Fn(&Session) -> bool + Send + Sync>;

/// One unit of outbound work: a frame plus an optional delivery filter.
///
/// Envelopes are cheap to clone; the payload is reference-counted, so a
/// broadcast clones the envelope once per recipient without copying bytes.
#[derive(Clone)]
pub(crate) struct Envelope {
    message: Message,
    filter: Option<SessionFilter>,
}

impl Envelope {
    pub(crate) fn text(payload: impl Into<Utf8Bytes>) -> Self {
        Self {
            message: Message::Text(payload.into()),
            filter: None,
        }
    }

    pub(crate) fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            message: Message::Binary(payload.into()),
            filter: None,
        }
    }

    pub(crate) fn close(frame: Option<CloseFrame>) -> Self {
        Self {
            message: Message::Close(frame),
            filter: None,
        }
    }

    /// Restricts delivery to sessions the predicate accepts.
    pub(crate) fn filtered(mut self, filter: impl Fn(&Session) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// True when the envelope is unfiltered or the filter accepts `session`.
    pub(crate) fn matches(&self, session: &Session) -> bool {
        self.filter.as_ref().map_or(true, |accept| accept(session))
    }

    pub(crate) fn message(&self) -> &Message {
        &self.message
    }

    pub(crate) fn into_message(self) -> Message {
        self.message
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("message", &self.message)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}
