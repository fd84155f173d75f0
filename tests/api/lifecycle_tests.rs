//! Connection lifecycle tests: registration, callbacks, attributes, and
//! session-level operations over real connections.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use courier::{close_code, Gateway, WebSocketUpgrade};
use futures::SinkExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::common::{self, TIMEOUT};

/// Connect and disconnect callbacks bracket a connection's life.
#[tokio::test]
async fn test_connect_and_disconnect_callbacks_fire() {
    let (connect_tx, mut connected) = mpsc::unbounded_channel();
    let (disconnect_tx, mut disconnected) = mpsc::unbounded_channel();
    let handle = common::boot(move |gateway| {
        gateway.on_connect(move |session| {
            let _ = connect_tx.send(session.id());
        });
        gateway.on_disconnect(move |session| {
            let _ = disconnect_tx.send(session.id());
        });
    })
    .await;

    let client = common::connect(&handle.url).await;
    let joined = timeout(TIMEOUT, connected.recv())
        .await
        .expect("connect callback")
        .expect("channel open");
    assert_eq!(handle.gateway.session_count(), 1);

    drop(client);
    let left = timeout(TIMEOUT, disconnected.recv())
        .await
        .expect("disconnect callback")
        .expect("channel open");
    assert_eq!(joined, left);
    common::wait_for_sessions(&handle.gateway, 0).await;
}

/// A send issued from the connect callback reaches the peer.
#[tokio::test]
async fn test_session_send_reaches_the_peer() {
    let handle = common::boot(|gateway| {
        gateway.on_connect(|session| {
            session.send("welcome").expect("send on fresh session");
        });
    })
    .await;

    let mut client = common::connect(&handle.url).await;
    assert_eq!(common::read_text(&mut client).await, "welcome");
}

/// The message callback can reply on the session it was handed.
#[tokio::test]
async fn test_message_callback_can_reply_on_the_session() {
    let handle = common::boot(|gateway| {
        gateway.on_message(|session, text| {
            let reply = format!("echo: {text}");
            session.send(reply).expect("reply");
        });
    })
    .await;

    let mut client = common::connect(&handle.url).await;
    client.send(Message::text("hi")).await.expect("client send");
    assert_eq!(common::read_text(&mut client).await, "echo: hi");
}

/// Binary frames are routed to the binary callback, not the text one.
#[tokio::test]
async fn test_binary_messages_reach_the_binary_callback() {
    let (binary_tx, mut binary) = mpsc::unbounded_channel();
    let (text_tx, mut text) = mpsc::unbounded_channel();
    let handle = common::boot(move |gateway| {
        gateway.on_message_binary(move |_, payload| {
            let _ = binary_tx.send(payload.to_vec());
        });
        gateway.on_message(move |_, payload| {
            let _ = text_tx.send(payload.to_string());
        });
    })
    .await;

    let mut client = common::connect(&handle.url).await;
    client
        .send(Message::binary(vec![1_u8, 2, 3]))
        .await
        .expect("client send");

    let payload = timeout(TIMEOUT, binary.recv())
        .await
        .expect("binary callback")
        .expect("channel open");
    assert_eq!(payload, vec![1, 2, 3]);
    assert!(text.try_recv().is_err());
}

async fn room_route(
    State(gateway): State<Arc<Gateway>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    let attributes = HashMap::from([(String::from("room"), serde_json::json!("lobby"))]);
    match gateway.handle_upgrade_with_attributes(upgrade, attributes) {
        Ok(response) => response.into_response(),
        Err(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// Attributes seeded at upgrade time are visible to callbacks and lookups.
#[tokio::test]
async fn test_upgrade_seeds_attributes_for_lookup() {
    let (seeded_tx, mut seeded) = mpsc::unbounded_channel();
    let mut gateway = Gateway::default();
    gateway.on_connect(move |session| {
        let _ = seeded_tx.send(session.attribute("room"));
    });
    let gateway = Arc::new(gateway);

    let app = Router::new()
        .route("/ws", get(room_route))
        .with_state(gateway.clone());
    let url = common::serve(app).await;

    let _client = common::connect(&url).await;
    let room = timeout(TIMEOUT, seeded.recv())
        .await
        .expect("connect callback")
        .expect("channel open");
    assert_eq!(room, Some(serde_json::json!("lobby")));

    let found = gateway
        .find_session(|s| s.attribute("room") == Some(serde_json::json!("lobby")))
        .expect("session by room");
    assert_eq!(found.attribute("room"), Some(serde_json::json!("lobby")));
    assert!(gateway
        .find_session(|s| s.attribute("room") == Some(serde_json::json!("garden")))
        .is_none());
}

/// close_with delivers its status code and reason to the peer.
#[tokio::test]
async fn test_session_close_with_reaches_the_peer() {
    let handle = common::boot(|gateway| {
        gateway.on_message(|session, _| {
            session
                .close_with(close_code::POLICY, "kicked")
                .expect("close_with");
        });
    })
    .await;

    let mut client = common::connect(&handle.url).await;
    client
        .send(Message::text("anything"))
        .await
        .expect("client send");

    assert_eq!(
        common::read_close(&mut client).await,
        Some((1008, String::from("kicked")))
    );
}

/// A close frame sent by the peer reaches the close callback before teardown.
#[tokio::test]
async fn test_peer_close_frame_reaches_the_close_callback() {
    let (close_tx, mut closed) = mpsc::unbounded_channel();
    let handle = common::boot(move |gateway| {
        gateway.on_close(move |_, frame| {
            let _ = close_tx.send(frame.map(|f| (f.code, f.reason.to_string())));
        });
    })
    .await;

    let mut client = common::connect(&handle.url).await;
    client
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .expect("client close");

    let observed = timeout(TIMEOUT, closed.recv())
        .await
        .expect("close callback")
        .expect("channel open");
    assert_eq!(observed, Some((1000, String::from("bye"))));
    common::wait_for_sessions(&handle.gateway, 0).await;
}

/// Once the gateway is closed the upgrade handshake is refused.
#[tokio::test]
async fn test_new_connections_are_rejected_after_close() {
    let handle = common::boot(|_| {}).await;

    handle.gateway.close().expect("close");

    assert!(connect_async(&handle.url).await.is_err());
}
