//! Gateway shutdown tests: goodbye frames, terminal state, and rejection of
//! later operations.

use courier::{close_code, CourierError};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::common::{self, TIMEOUT};

/// Shutdown says goodbye to every client and is terminal afterwards.
#[tokio::test]
async fn test_close_with_notifies_every_client() {
    let (disconnect_tx, mut disconnected) = mpsc::unbounded_channel();
    let handle = common::boot(move |gateway| {
        gateway.on_disconnect(move |session| {
            let _ = disconnect_tx.send(session.id());
        });
    })
    .await;

    let mut first = common::connect(&handle.url).await;
    let mut second = common::connect(&handle.url).await;
    common::wait_for_sessions(&handle.gateway, 2).await;

    handle
        .gateway
        .close_with(close_code::NORMAL, "bye")
        .expect("close_with");

    assert_eq!(
        common::read_close(&mut first).await,
        Some((1000, String::from("bye")))
    );
    assert_eq!(
        common::read_close(&mut second).await,
        Some((1000, String::from("bye")))
    );

    for _ in 0..2 {
        timeout(TIMEOUT, disconnected.recv())
            .await
            .expect("session torn down")
            .expect("channel open");
    }

    assert!(handle.gateway.is_closed());
    assert_eq!(handle.gateway.session_count(), 0);
    assert!(matches!(
        handle.gateway.broadcast("late"),
        Err(CourierError::Closed)
    ));
    assert!(matches!(handle.gateway.close(), Err(CourierError::Closed)));
}

/// A plain close delivers a bare close frame with no status code.
#[tokio::test]
async fn test_plain_close_sends_a_bare_close_frame() {
    let handle = common::boot(|_| {}).await;
    let mut client = common::connect(&handle.url).await;
    common::wait_for_sessions(&handle.gateway, 1).await;

    handle.gateway.close().expect("close");

    assert_eq!(common::read_close(&mut client).await, None);
    assert!(handle.gateway.is_closed());
}
