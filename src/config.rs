//! Gateway configuration.
//!
//! All tunables carry defaults suitable for development, so
//! [`Config::default()`] is enough to get started. Deployments override
//! individual fields through [`Config::from_env`] or by deserializing the
//! struct from their own configuration source.

use std::time::Duration;

use config::{ConfigError, Environment};
use serde::Deserialize;

/// Connection and queue tunables for a [`Gateway`](crate::Gateway).
///
/// The keepalive fields are coupled: pings are emitted every
/// `ping_interval_secs` and the read side expects a pong (or any renewal)
/// within `pong_timeout_secs`, so the interval must stay below the timeout
/// to keep idle but healthy connections alive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deadline for a single frame write, in seconds (default: 10).
    pub write_timeout_secs: u64,

    /// Read-liveness deadline, renewed by each pong, in seconds (default: 60).
    pub pong_timeout_secs: u64,

    /// Keepalive ping period, in seconds (default: 54).
    pub ping_interval_secs: u64,

    /// Maximum accepted inbound message size, in bytes (default: 512).
    pub max_message_size: usize,

    /// Capacity of each session's outbound queue, in messages (default: 256).
    /// Sends to a full queue are dropped and reported, never blocked on.
    pub session_queue_capacity: usize,

    /// Close codes reported to the error callback as abnormal when received
    /// from a peer (default: 1001, 1006, 1012). Codes outside this list,
    /// including normal closure, end the session silently.
    pub abnormal_close_codes: Vec<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            write_timeout_secs: 10,
            pong_timeout_secs: 60,
            ping_interval_secs: 54,
            max_message_size: 512,
            session_queue_capacity: 256,
            abnormal_close_codes: vec![1001, 1006, 1012],
        }
    }
}

impl Config {
    /// Loads configuration from `COURIER__*` environment variables on top of
    /// the defaults.
    ///
    /// Example: `COURIER__PONG_TIMEOUT_SECS=30`
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when a variable is present but fails to
    /// parse into the field's type.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        config::Config::builder()
            .set_default("write_timeout_secs", 10_i64)?
            .set_default("pong_timeout_secs", 60_i64)?
            .set_default("ping_interval_secs", 54_i64)?
            .set_default("max_message_size", 512_i64)?
            .set_default("session_queue_capacity", 256_i64)?
            .set_default("abnormal_close_codes", vec![1001_i64, 1006, 1012])?
            .add_source(
                Environment::with_prefix("COURIER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            )
            .build()?
            .try_deserialize()
    }

    /// Deadline for a single frame write.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Read-liveness deadline.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    /// Keepalive ping period.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Whether a received close code should be surfaced as an error.
    pub fn is_abnormal_close(&self, code: u16) -> bool {
        self.abnormal_close_codes.contains(&code)
    }
}
