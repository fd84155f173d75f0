//! # courier
//!
//! WebSocket session management and broadcast hub for axum.
//!
//! courier sits between an axum route and application logic: it upgrades
//! requests into managed sessions, keeps the live-session registry, pumps
//! frames in both directions with keepalive and backpressure handling, and
//! fans broadcasts out to every matching session. Application behavior is
//! attached through callbacks on the [`Gateway`].
//!
//! ## Design
//!
//! * Every send is a non-blocking enqueue onto a bounded per-session queue.
//!   A full queue drops the frame and reports it through the error callback
//!   instead of slowing the producer down.
//! * Frames queued for one session are written in queue order by a single
//!   writer task.
//! * Liveness is enforced per connection: a ping is sent on an interval and
//!   the read side expects a pong within a deadline, both configurable.
//! * Shutdown is terminal. [`Gateway::close`] says goodbye to every session
//!   and all further operations fail with [`CourierError::Closed`].
//!
//! ## Module Map
//!
//! ```text
//! src/
//! |-- config.rs      tunables and environment loading
//! |-- envelope.rs    outbound frame plus delivery filter
//! |-- error.rs       error taxonomy
//! |-- gateway.rs     public facade and connection lifecycle
//! |-- hub.rs         live-session registry and fan-out
//! `-- session.rs     per-connection state and pump loops
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use axum::extract::State;
//! use axum::response::IntoResponse;
//! use axum::routing::get;
//! use axum::Router;
//! use courier::{Config, Gateway, WebSocketUpgrade};
//!
//! async fn ws(
//!     State(gateway): State<Arc<Gateway>>,
//!     upgrade: WebSocketUpgrade,
//! ) -> impl IntoResponse {
//!     match gateway.handle_upgrade(upgrade) {
//!         Ok(response) => response.into_response(),
//!         Err(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response(),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut gateway = Gateway::new(Config::default());
//!     gateway.on_connect(|session| {
//!         let _ = session.send("welcome");
//!     });
//!     let gateway = Arc::new(gateway);
//!
//!     let app = Router::new().route("/ws", get(ws)).with_state(gateway);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
//!         .await
//!         .expect("bind");
//!     axum::serve(listener, app).await.expect("serve");
//! }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod session;

mod envelope;
mod hub;

pub use config::Config;
pub use error::{CourierError, Result};
pub use gateway::Gateway;
pub use session::Session;

// Transport types, re-exported so applications do not need their own axum
// ws imports for callback and handler signatures.
pub use axum::body::Bytes;
pub use axum::extract::ws::{
    close_code, CloseCode, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade,
};
