use super::{Connection, ConnectionState};
use crate::utils::DeliveryError;
use std::time::Duration;
use tungstenite::protocol::Message as WsMessage;

const TIMEOUT: Duration = Duration::from_millis(50);

#[test]
fn test_connection_new() {
    let (conn, _outbound) = Connection::new("room1", 4);
    assert!(conn.id.starts_with("conn-"));
    assert_eq!(conn.topic, "room1");
    assert_eq!(conn.state(), ConnectionState::Connecting);
    assert!(!conn.is_terminated());
}

#[test]
fn test_connection_ids_are_unique() {
    let (a, _) = Connection::new("room1", 1);
    let (b, _) = Connection::new("room1", 1);
    assert_ne!(a.id, b.id);
}

#[test]
fn test_state_only_moves_forward() {
    let (conn, _outbound) = Connection::new("room1", 1);
    assert!(conn.advance(ConnectionState::Open));
    assert!(!conn.advance(ConnectionState::Open));
    assert!(!conn.advance(ConnectionState::Connecting));
    assert!(conn.advance(ConnectionState::Closing));
    assert!(conn.advance(ConnectionState::Closed));
    assert!(!conn.advance(ConnectionState::Open));
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[test]
fn test_connecting_may_skip_open() {
    let (conn, _outbound) = Connection::new("", 1);
    assert!(conn.advance(ConnectionState::Closing));
    assert_eq!(conn.state(), ConnectionState::Closing);
}

#[tokio::test]
async fn test_send_queues_message() {
    let (conn, mut outbound) = Connection::new("room1", 4);
    conn.advance(ConnectionState::Open);
    conn.send(WsMessage::text("hello"), TIMEOUT).await.unwrap();

    match outbound.recv().await {
        Some(WsMessage::Text(text)) => assert_eq!(text.as_str(), "hello"),
        other => panic!("Expected a text message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_send_after_close_is_reported() {
    let (conn, mut outbound) = Connection::new("room1", 4);
    conn.advance(ConnectionState::Closing);
    conn.advance(ConnectionState::Closed);

    let err = conn.send(WsMessage::text("late"), TIMEOUT).await.unwrap_err();
    assert_eq!(err, DeliveryError::Closed(conn.id.clone()));
    assert!(outbound.try_recv().is_none());
}

#[tokio::test]
async fn test_send_times_out_when_queue_full() {
    let (conn, _outbound) = Connection::new("room1", 1);
    conn.send(WsMessage::text("first"), TIMEOUT).await.unwrap();

    let err = conn.send(WsMessage::text("second"), TIMEOUT).await.unwrap_err();
    assert_eq!(err, DeliveryError::Timeout(conn.id.clone(), TIMEOUT));
}

#[tokio::test]
async fn test_send_to_dropped_outbound_fails() {
    let (conn, outbound) = Connection::new("room1", 1);
    drop(outbound);

    let err = conn.send(WsMessage::text("hello"), TIMEOUT).await.unwrap_err();
    assert_eq!(err, DeliveryError::Closed(conn.id.clone()));
}

#[tokio::test]
async fn test_terminate_wakes_waiter() {
    let (conn, _outbound) = Connection::new("room1", 1);
    conn.terminate();
    conn.terminated().await;
    assert!(conn.is_terminated());
}
