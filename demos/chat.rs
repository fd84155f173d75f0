//! Minimal chat room: every text message is broadcast to every connected
//! client.
//!
//! Run with `cargo run --example chat`, then open http://127.0.0.1:3000 in
//! two browser tabs.

use std::sync::{Arc, Weak};

use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use courier::{Config, Gateway, WebSocketUpgrade};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const INDEX: &str = r#"<!DOCTYPE html>
<html>
  <body>
    <input id="text" placeholder="say something" autofocus>
    <pre id="log"></pre>
    <script>
      const ws = new WebSocket(`ws://${location.host}/ws`);
      ws.onmessage = (event) => {
        document.getElementById("log").textContent += event.data + "\n";
      };
      document.getElementById("text").addEventListener("change", (event) => {
        ws.send(event.target.value);
        event.target.value = "";
      });
    </script>
  </body>
</html>"#;

async fn index() -> Html<&'static str> {
    Html(INDEX)
}

async fn ws(
    State(gateway): State<Arc<Gateway>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    match gateway.handle_upgrade(upgrade) {
        Ok(response) => response.into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "refusing websocket upgrade");
            axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,courier=debug,chat=debug"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let gateway = Arc::new_cyclic(|room: &Weak<Gateway>| {
        let mut gateway = Gateway::new(Config::default());

        gateway.on_connect(|session| {
            tracing::info!(session_id = %session.id(), "joined");
        });
        gateway.on_disconnect(|session| {
            tracing::info!(session_id = %session.id(), "left");
        });
        let room = room.clone();
        gateway.on_message(move |_, text| {
            if let Some(room) = room.upgrade() {
                let _ = room.broadcast(text);
            }
        });
        gateway.on_error(|session, err| {
            tracing::warn!(session_id = %session.id(), error = %err, "session error");
        });

        gateway
    });

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws))
        .with_state(gateway);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .expect("bind 127.0.0.1:3000");
    tracing::info!("chat room on http://127.0.0.1:3000");
    axum::serve(listener, app).await.expect("serve");
}
