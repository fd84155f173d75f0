//! Error types for gateway, hub, and session operations.
//!
//! The taxonomy is closed: operations either fail with a typed
//! [`CourierError`] returned to the caller, or the failure is scoped to one
//! session and reported through the gateway's error callback. There is no
//! fatal class; every failure is recovered locally by terminating the
//! affected session's pumps.

use std::time::Duration;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CourierError>;

/// Failures surfaced by gateway, hub, and session operations.
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// Operation attempted after the gateway shut down. Expected during
    /// shutdown races and safe to ignore in teardown paths.
    #[error("gateway is closed")]
    Closed,

    /// Operation attempted on a session that has already closed.
    #[error("session is closed")]
    SessionClosed,

    /// The session's outbound queue is at capacity. The message was dropped;
    /// the producer was not blocked. Reported to the error callback only.
    #[error("session message queue is full")]
    QueueFull,

    /// A frame write did not complete within the configured deadline.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// No liveness acknowledgement arrived within the configured deadline.
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// The underlying connection failed while reading or writing.
    #[error("transport failure: {0}")]
    Transport(#[from] axum::Error),

    /// The peer closed the connection with a code the gateway is configured
    /// to treat as abnormal.
    #[error("peer closed abnormally with code {code}: {reason}")]
    AbnormalClose { code: u16, reason: String },
}
