use hromada::{ConnectError, ConnectionRegistry, NOTIFICATION_EVENT};
use serde_json::json;
use tokio::sync::mpsc;

#[path = "util.rs"]
mod util;
use util::TokenVerifier;

#[tokio::test]
async fn every_tab_of_a_user_receives_the_push_once() {
    let registry = ConnectionRegistry::new();
    let mut receivers = Vec::new();
    let mut guards = Vec::new();
    for _ in 0..3 {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = registry
            .authenticate(&TokenVerifier, Some("token-u1"), tx)
            .expect("registered");
        assert_eq!(conn.user_id(), "u1");
        receivers.push(rx);
        guards.push(conn);
    }
    assert_eq!(registry.connection_count("u1"), 3);

    let delivered = registry.dispatch("u1", json!({"message": "hello"}));
    assert_eq!(delivered, 3);

    for rx in &mut receivers {
        let message = rx.try_recv().expect("one push per connection");
        assert_eq!(message.event, NOTIFICATION_EVENT);
        assert_eq!(
            message.data.get("message").and_then(|m| m.as_str()),
            Some("hello")
        );
        assert!(rx.try_recv().is_err(), "exactly once per connection");
    }
}

#[tokio::test]
async fn dispatch_without_a_room_is_a_noop() {
    let registry = ConnectionRegistry::new();
    let delivered = registry.dispatch("nobody", json!({"message": "hello"}));
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn disconnect_discards_the_empty_room() {
    let registry = ConnectionRegistry::new();
    let mut guards = Vec::new();
    for _ in 0..2 {
        let (tx, _rx) = mpsc::unbounded_channel();
        guards.push(
            registry
                .authenticate(&TokenVerifier, Some("token-u1"), tx)
                .expect("registered"),
        );
    }
    assert_eq!(registry.room_count(), 1);

    guards.pop();
    assert_eq!(registry.connection_count("u1"), 1);
    guards.pop();
    assert_eq!(registry.room_count(), 0, "empty rooms are not retained");

    let delivered = registry.dispatch("u1", json!({"message": "late"}));
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn rejected_credentials_are_never_registered() {
    let registry = ConnectionRegistry::new();

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = registry
        .authenticate(&TokenVerifier, Some("garbage"), tx)
        .expect_err("bad token");
    assert_eq!(err, ConnectError::InvalidCredential);

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = registry
        .authenticate(&TokenVerifier, None, tx)
        .expect_err("no token");
    assert_eq!(err, ConnectError::MissingCredential);

    assert_eq!(registry.room_count(), 0);
}

#[tokio::test]
async fn users_do_not_hear_each_other() {
    let registry = ConnectionRegistry::new();
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();
    let _c1 = registry
        .authenticate(&TokenVerifier, Some("token-u1"), tx1)
        .expect("u1");
    let _c2 = registry
        .authenticate(&TokenVerifier, Some("token-u2"), tx2)
        .expect("u2");

    let delivered = registry.dispatch("u1", json!({"message": "for u1"}));
    assert_eq!(delivered, 1);
    assert!(rx1.try_recv().is_ok());
    assert!(rx2.try_recv().is_err());
}

#[tokio::test]
async fn concurrent_connects_and_dispatches_settle() {
    let registry = ConnectionRegistry::new();
    let mut handles = Vec::new();
    for i in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let user = format!("u{}", i % 2);
            let token = format!("token-{user}");
            let conn = registry
                .authenticate(&TokenVerifier, Some(token.as_str()), tx)
                .expect("registered");
            registry.dispatch(&user, json!({"n": i}));
            // At least our own dispatch reached this connection.
            assert!(rx.recv().await.is_some());
            drop(conn);
        }));
    }
    for handle in handles {
        handle.await.expect("task finished");
    }
    assert_eq!(registry.room_count(), 0);
}
