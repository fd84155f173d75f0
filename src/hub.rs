//! Live-session registry and broadcast fan-out.
//!
//! The hub is the single authority over the live-session set. Registry
//! mutations take the write lock and fan-out takes the read lock, so a
//! broadcast can never observe a half-applied membership change. Delivery
//! inside the fan-out is a non-blocking enqueue per session; the lock is
//! never held across an await and a slow consumer cannot stall the hub.
//!
//! The hub starts open and closes exactly once, on [`Hub::shutdown`].
//! Closed is terminal: every mutating operation afterwards fails with
//! [`CourierError::Closed`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::error::{CourierError, Result};
use crate::session::Session;

struct Registry {
    sessions: HashMap<Uuid, Arc<Session>>,
    open: bool,
}

pub(crate) struct Hub {
    registry: RwLock<Registry>,
}

impl Hub {
    pub(crate) fn new() -> Self {
        Self {
            registry: RwLock::new(Registry {
                sessions: HashMap::new(),
                open: true,
            }),
        }
    }

    /// Adds a session to the live set.
    pub(crate) fn register(&self, session: Arc<Session>) -> Result<()> {
        let mut registry = self.registry.write();
        if !registry.open {
            return Err(CourierError::Closed);
        }
        tracing::info!(session_id = %session.id(), "session registered");
        registry.sessions.insert(session.id(), session);
        Ok(())
    }

    /// Removes a session from the live set. Removing a session that is not
    /// registered is a no-op.
    pub(crate) fn unregister(&self, session: &Session) -> Result<()> {
        let mut registry = self.registry.write();
        if !registry.open {
            return Err(CourierError::Closed);
        }
        if registry.sessions.remove(&session.id()).is_some() {
            tracing::info!(session_id = %session.id(), "session unregistered");
        }
        Ok(())
    }

    /// Fans an envelope out to every live session its filter accepts.
    ///
    /// Delivery is best-effort per session: a full queue or a concurrently
    /// closing session is reported through that session's error callback and
    /// never aborts the rest of the fan-out.
    pub(crate) fn broadcast(&self, envelope: Envelope) -> Result<()> {
        let undeliverable = {
            let registry = self.registry.read();
            if !registry.open {
                return Err(CourierError::Closed);
            }
            let mut failed = Vec::new();
            for session in registry.sessions.values() {
                if !envelope.matches(session) {
                    continue;
                }
                if let Err(err) = session.enqueue(envelope.clone()) {
                    failed.push((session.clone(), err));
                }
            }
            failed
        };

        // Callbacks run outside the lock; a handler may call back into the hub.
        for (session, err) in undeliverable {
            session.report(err);
        }
        Ok(())
    }

    /// Queues `goodbye` to every live session, empties the registry, and
    /// transitions to closed. Terminal; a second call fails.
    ///
    /// Sessions are not force-closed here. Their pumps terminate once the
    /// close frame drains, and each connection finishes its own teardown.
    pub(crate) fn shutdown(&self, goodbye: Envelope) -> Result<()> {
        let (parted, undeliverable) = {
            let mut registry = self.registry.write();
            if !registry.open {
                return Err(CourierError::Closed);
            }
            registry.open = false;
            let sessions: Vec<_> = registry.sessions.drain().map(|(_, s)| s).collect();
            let mut failed = Vec::new();
            for session in &sessions {
                if let Err(err) = session.enqueue(goodbye.clone()) {
                    failed.push((session.clone(), err));
                }
            }
            (sessions.len(), failed)
        };

        tracing::info!(sessions = parted, "hub shut down");
        for (session, err) in undeliverable {
            session.report(err);
        }
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.registry.read().sessions.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        !self.registry.read().open
    }

    /// Visits live sessions in unspecified order until the visitor returns
    /// false. The visitor runs under the registry read lock; keep it cheap
    /// and do not call hub mutations from inside it.
    pub(crate) fn for_each_until(&self, mut visit: impl FnMut(&Arc<Session>) -> bool) {
        let registry = self.registry.read();
        for session in registry.sessions.values() {
            if !visit(session) {
                break;
            }
        }
    }

    /// First live session accepted by the predicate, in unspecified order.
    pub(crate) fn find(&self, accept: impl Fn(&Session) -> bool) -> Option<Arc<Session>> {
        let mut found = None;
        self.for_each_until(|session| {
            if accept(session) {
                found = Some(session.clone());
                false
            } else {
                true
            }
        });
        found
    }
}
