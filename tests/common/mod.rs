//! Common Test Utilities
//!
//! Boots a gateway behind a real TCP listener and drives it with
//! tokio-tungstenite clients.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use courier::{Config, Gateway, WebSocketUpgrade};
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Gateway under test plus the URL its listener answers on.
pub struct TestGateway {
    pub gateway: Arc<Gateway>,
    pub url: String,
}

/// Boot a gateway with default configuration.
pub async fn boot(setup: impl FnOnce(&mut Gateway)) -> TestGateway {
    boot_with_config(Config::default(), setup).await
}

/// Boot a configured gateway behind an ephemeral listener.
pub async fn boot_with_config(config: Config, setup: impl FnOnce(&mut Gateway)) -> TestGateway {
    let mut gateway = Gateway::new(config);
    setup(&mut gateway);
    let gateway = Arc::new(gateway);

    let app = Router::new()
        .route("/ws", get(ws_route))
        .with_state(gateway.clone());
    let url = serve(app).await;

    TestGateway { gateway, url }
}

/// Serve a router on an ephemeral port and return its ws URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("ws://{addr}/ws")
}

async fn ws_route(
    State(gateway): State<Arc<Gateway>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    match gateway.handle_upgrade(upgrade) {
        Ok(response) => response.into_response(),
        Err(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

pub async fn connect(url: &str) -> WsClient {
    let (client, _) = connect_async(url).await.expect("client connect");
    client
}

/// Next text frame within the test timeout, skipping control frames.
pub async fn read_text(client: &mut WsClient) -> String {
    loop {
        match next_frame(client).await {
            Message::Text(text) => return text.to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Next binary frame within the test timeout, skipping control frames.
pub async fn read_binary(client: &mut WsClient) -> Vec<u8> {
    loop {
        match next_frame(client).await {
            Message::Binary(payload) => return payload.to_vec(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected binary frame, got {other:?}"),
        }
    }
}

/// Next close frame within the test timeout; `None` means the peer closed
/// without a status code.
pub async fn read_close(client: &mut WsClient) -> Option<(u16, String)> {
    loop {
        match next_frame(client).await {
            Message::Close(frame) => return frame.map(|f| (f.code.into(), f.reason.to_string())),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}

async fn next_frame(client: &mut WsClient) -> Message {
    timeout(TIMEOUT, client.next())
        .await
        .expect("timeout waiting for frame")
        .expect("stream closed")
        .expect("client error")
}

/// Poll until the gateway reports `count` live sessions.
pub async fn wait_for_sessions(gateway: &Gateway, count: usize) {
    timeout(TIMEOUT, async {
        while gateway.session_count() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session count did not settle");
}
