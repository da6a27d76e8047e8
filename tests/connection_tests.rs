mod common;

use common::*;
use mts_rs::connection::{Connection, ConnectionContext};
use mts_rs::connection_pool::ConnectionPool;
use mts_rs::connection_state::ConnectionState;
use mts_rs::framing::split_into_frames;
use mts_rs::message::{InboundEvent, OutboundMessage};
use mts_rs::queue::SharedQueue;
use mts_rs::scheduler::Scheduler;
use mts_rs::MtsError;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

struct Fixture {
    ctx: ConnectionContext,
    connector: FakeConnector,
    token: Arc<StaticToken>,
}

fn fixture(connections: usize) -> Fixture {
    let connector = FakeConnector::new();
    let token = Arc::new(StaticToken::default());
    let ctx = ConnectionContext {
        config: test_config(connections).websocket,
        connector: Arc::new(connector.clone()),
        token_source: token.clone(),
        scheduler: Scheduler::new(),
        outbound: SharedQueue::new(),
        inbound: SharedQueue::new(),
    };
    Fixture {
        ctx,
        connector,
        token,
    }
}

fn envelope_message(correlation_id: &str) -> OutboundMessage {
    let envelope = mts_rs::dto::RequestEnvelope {
        operator_id: OPERATOR_ID,
        operation: "ticket-placement".to_string(),
        content: "{}".to_string(),
        correlation_id: correlation_id.to_string(),
    };
    let bytes = serde_json::to_vec(&envelope).unwrap();
    OutboundMessage::new(correlation_id, split_into_frames(&bytes).unwrap())
}

async fn next_event(inbound: &SharedQueue<InboundEvent>) -> InboundEvent {
    inbound
        .poll(Duration::from_secs(5))
        .await
        .expect("no inbound event")
}

#[tokio::test]
async fn test_connect_opens_socket_with_token() {
    let fixture = fixture(1);
    let connection = Connection::new(0, fixture.ctx.clone());

    assert_ok!(connection.connect().await);

    assert!(connection.is_connected());
    assert_eq!(connection.epoch(), Some(1));
    assert_eq!(fixture.connector.tokens(), vec!["test-token".to_string()]);
    connection.close().await;
}

#[tokio::test]
async fn test_connect_failure_propagates() {
    let fixture = fixture(1);
    fixture.connector.fail_next_connects(1);
    let connection = Connection::new(0, fixture.ctx.clone());

    let result = connection.connect().await;

    assert_eq!(
        result.unwrap_err(),
        MtsError::Connection("connection refused".to_string())
    );
    assert_eq!(connection.state(), ConnectionState::Disconnected);

    // a failed open leaves the connection usable for another attempt
    assert_ok!(connection.connect().await);
    assert!(connection.is_connected());
    connection.close().await;
}

#[tokio::test]
async fn test_only_one_reconnect_per_observed_socket() {
    let fixture = fixture(1);
    let connection = Connection::new(0, fixture.ctx.clone());
    assert_ok!(connection.connect().await);
    let observed = connection.epoch();

    let (first, second) = tokio::join!(
        connection.reconnect(observed, true),
        connection.reconnect(observed, true)
    );

    let winners: Vec<_> = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(winners, vec![2]);
    assert_eq!(fixture.connector.connect_count(), 2);

    // a late caller still holding the old epoch does nothing
    assert_eq!(connection.reconnect(observed, true).await.unwrap(), None);
    assert_eq!(fixture.connector.connect_count(), 2);
    connection.close().await;
}

#[tokio::test]
async fn test_sender_loop_reports_sent() {
    let fixture = fixture(1);
    let connection = Connection::new(0, fixture.ctx.clone());
    assert_ok!(connection.connect().await);

    fixture.ctx.outbound.push(envelope_message("c1"));

    let sent = fixture.connector.next_request().await;
    assert_eq!(sent.envelope.correlation_id, "c1");
    match next_event(&fixture.ctx.inbound).await {
        InboundEvent::Sent { correlation_id } => assert_eq!(correlation_id, "c1"),
        other => panic!("unexpected event: {other:?}"),
    }
    connection.close().await;
}

#[tokio::test]
async fn test_empty_message_is_not_processed() {
    let fixture = fixture(1);
    let connection = Connection::new(0, fixture.ctx.clone());
    assert_ok!(connection.connect().await);

    fixture.ctx.outbound.push(OutboundMessage::new("c1", Vec::new()));

    match next_event(&fixture.ctx.inbound).await {
        InboundEvent::NotProcessed { correlation_id } => assert_eq!(correlation_id, "c1"),
        other => panic!("unexpected event: {other:?}"),
    }
    connection.close().await;
}

#[tokio::test]
async fn test_failed_resend_reports_transport_error() {
    let fixture = fixture(1);
    let connection = Connection::new(0, fixture.ctx.clone());
    assert_ok!(connection.connect().await);
    fixture.connector.fail_next_writes(2);

    fixture.ctx.outbound.push(envelope_message("c1"));

    match next_event(&fixture.ctx.inbound).await {
        InboundEvent::TransportError {
            correlation_id: None,
            ..
        } => {}
        other => panic!("unexpected event: {other:?}"),
    }
    match next_event(&fixture.ctx.inbound).await {
        InboundEvent::TransportError {
            correlation_id: Some(id),
            error,
        } => {
            assert_eq!(id, "c1");
            assert_eq!(error, MtsError::Connection("write failed".to_string()));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(connection.epoch(), Some(2));
    connection.close().await;
}

#[tokio::test]
async fn test_received_text_is_forwarded() {
    let fixture = fixture(1);
    let connection = Connection::new(0, fixture.ctx.clone());
    assert_ok!(connection.connect().await);

    fixture.connector.socket(0).push_text("hello");

    match next_event(&fixture.ctx.inbound).await {
        InboundEvent::ReceivedContent(text) => assert_eq!(text, "hello"),
        other => panic!("unexpected event: {other:?}"),
    }
    connection.close().await;
}

#[tokio::test]
async fn test_close_is_final() {
    let fixture = fixture(1);
    let connection = Connection::new(0, fixture.ctx.clone());
    assert_ok!(connection.connect().await);

    connection.close().await;

    assert!(!connection.is_connected());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(fixture.connector.socket(0).is_closed());
    assert_eq!(connection.connect().await.unwrap_err(), MtsError::NotConnected);
    // closing the socket ourselves is not a failure worth reporting
    assert!(fixture.ctx.inbound.poll(Duration::ZERO).await.is_none());
}

#[tokio::test]
async fn test_pool_opens_every_connection() {
    let fixture = fixture(3);
    let pool = ConnectionPool::new(fixture.ctx.clone());

    assert_ok!(pool.connect().await);

    assert!(pool.is_connected());
    assert_eq!(pool.connections().len(), 3);
    assert_eq!(fixture.connector.connect_count(), 3);
    assert!(pool.connections().iter().all(|c| c.is_connected()));

    pool.close().await;
    assert!(!pool.is_connected());
    assert!(fixture.token.is_closed());
    assert!((0..3).all(|i| fixture.connector.socket(i).is_closed()));
}

#[tokio::test]
async fn test_pool_connect_fails_on_token_error() {
    let connector = FakeConnector::new();
    let ctx = ConnectionContext {
        config: test_config(2).websocket,
        connector: Arc::new(connector.clone()),
        token_source: Arc::new(StaticToken::failing()),
        scheduler: Scheduler::new(),
        outbound: SharedQueue::new(),
        inbound: SharedQueue::new(),
    };
    let pool = ConnectionPool::new(ctx);

    let result = pool.connect().await;

    assert!(matches!(result, Err(MtsError::AuthTokenFailure(_))));
    assert!(!pool.is_connected());
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn test_pool_connect_fails_on_socket_error() {
    let fixture = fixture(2);
    fixture.connector.fail_next_connects(1);
    let pool = ConnectionPool::new(fixture.ctx.clone());

    assert_err!(pool.connect().await);
    assert!(!pool.is_connected());
    pool.close().await;
}
