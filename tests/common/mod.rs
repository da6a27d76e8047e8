#![allow(dead_code)]

use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, StreamExt};
use mts_rs::config::{AuthConfig, Config, ProtocolConfig, WebSocketConfig};
use mts_rs::dto::envelope::RequestEnvelope;
use mts_rs::framing::{reassemble, Frame};
use mts_rs::transport::SocketParts;
use mts_rs::{Connector, FrameSink, MtsError, MtsResult, ProtocolEngine, SocketEvent, TokenSource};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const OPERATOR_ID: i64 = 9985;

pub fn test_config(connections: usize) -> Config {
    Config {
        operator_id: OPERATOR_ID,
        auth: AuthConfig {
            server: "http://127.0.0.1:1/oauth/token".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            audience: "mts".to_string(),
            request_timeout_ms: 1_000,
            retry_delay_ms: 10,
        },
        websocket: WebSocketConfig {
            server: "ws://mts.test/ws".to_string(),
            number_of_connections: connections,
            reconnect_timeout_ms: 1_000,
            fetch_message_timeout_ms: 100,
            send_message_timeout_ms: 1_000,
            consumer_grace_timeout_ms: 1_000,
            refresh_connection_timeout_ms: 3_600_000,
        },
        protocol: ProtocolConfig {
            connect_timeout_ms: 5_000,
            max_send_buffer_size: 1_000,
            dequeue_timeout_ms: 100,
            receive_response_timeout_ms: 1_000,
            retry_count: 2,
            number_of_dispatchers: 2,
        },
    }
}

/// A request as the fake server saw it.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub socket: usize,
    pub frame_count: usize,
    pub envelope: RequestEnvelope,
}

impl SentRequest {
    pub fn content(&self) -> serde_json::Value {
        serde_json::from_str(&self.envelope.content).unwrap()
    }
}

/// Test-side handle of one socket opened through [`FakeConnector`].
#[derive(Clone)]
pub struct FakeSocket {
    pub index: usize,
    events: mpsc::UnboundedSender<SocketEvent>,
    closed: Arc<AtomicBool>,
}

impl FakeSocket {
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.events.send(SocketEvent::Text(text.into()));
    }

    /// Simulate the server dropping the socket.
    pub fn drop_connection(&self) {
        let _ = self.events.send(SocketEvent::Closed {
            code: 1006,
            reason: "abnormal closure".to_string(),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct ConnectorState {
    sockets: Mutex<Vec<FakeSocket>>,
    tokens: Mutex<Vec<String>>,
    fail_connects: AtomicUsize,
    fail_writes: AtomicUsize,
    requests_tx: mpsc::UnboundedSender<SentRequest>,
    requests_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<SentRequest>>,
}

/// In-memory [`Connector`] that records every written envelope.
#[derive(Clone)]
pub struct FakeConnector {
    state: Arc<ConnectorState>,
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl FakeConnector {
    pub fn new() -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(ConnectorState {
                sockets: Mutex::new(Vec::new()),
                tokens: Mutex::new(Vec::new()),
                fail_connects: AtomicUsize::new(0),
                fail_writes: AtomicUsize::new(0),
                requests_tx,
                requests_rx: tokio::sync::Mutex::new(requests_rx),
            }),
        }
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state.fail_connects.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.state.fail_writes.store(count, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.state.tokens.lock().unwrap().len()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.state.tokens.lock().unwrap().clone()
    }

    pub fn socket(&self, index: usize) -> FakeSocket {
        self.state.sockets.lock().unwrap()[index].clone()
    }

    pub fn socket_count(&self) -> usize {
        self.state.sockets.lock().unwrap().len()
    }

    /// Wait for the next written envelope.
    pub async fn next_request(&self) -> SentRequest {
        let mut rx = self.state.requests_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("no request written")
            .expect("request channel closed")
    }

    /// Drain envelopes written so far without waiting.
    pub async fn drain_requests(&self) -> Vec<SentRequest> {
        let mut rx = self.state.requests_rx.lock().await;
        let mut requests = Vec::new();
        while let Ok(request) = rx.try_recv() {
            requests.push(request);
        }
        requests
    }

    /// Answer on the socket that carried `request`.
    pub fn reply(&self, request: &SentRequest, content: serde_json::Value) {
        let text = response_text(&request.envelope.correlation_id, content);
        self.socket(request.socket).push_text(text);
    }
}

impl Connector for FakeConnector {
    fn connect(&self, token: String) -> BoxFuture<'static, MtsResult<SocketParts>> {
        let state = self.state.clone();
        async move {
            state.tokens.lock().unwrap().push(token);
            if take_one(&state.fail_connects) {
                return Err(MtsError::Connection("connection refused".to_string()));
            }

            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let closed = Arc::new(AtomicBool::new(false));
            let index = {
                let mut sockets = state.sockets.lock().unwrap();
                let index = sockets.len();
                sockets.push(FakeSocket {
                    index,
                    events: events_tx.clone(),
                    closed: closed.clone(),
                });
                index
            };

            let sink: Box<dyn FrameSink> = Box::new(FakeSink {
                index,
                state,
                closed,
                events: events_tx,
            });
            let events = futures_util::stream::unfold(events_rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed();
            Ok((sink, events))
        }
        .boxed()
    }
}

struct FakeSink {
    index: usize,
    state: Arc<ConnectorState>,
    closed: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl FrameSink for FakeSink {
    fn send_frames<'a>(&'a self, frames: &'a [Frame]) -> BoxFuture<'a, MtsResult<()>> {
        async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(MtsError::Connection("socket is closed".to_string()));
            }
            if take_one(&self.state.fail_writes) {
                return Err(MtsError::Connection("write failed".to_string()));
            }
            let envelope: RequestEnvelope = serde_json::from_slice(&reassemble(frames))?;
            let _ = self.state.requests_tx.send(SentRequest {
                socket: self.index,
                frame_count: frames.len(),
                envelope,
            });
            Ok(())
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, MtsResult<()>> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(SocketEvent::Closed {
                code: 1000,
                reason: "normal closure".to_string(),
            });
        }
        future::ready(Ok(())).boxed()
    }
}

/// Token source that never touches the network.
#[derive(Default)]
pub struct StaticToken {
    fetches: AtomicUsize,
    closed: AtomicBool,
    fail: AtomicBool,
}

impl StaticToken {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> BoxFuture<'_, MtsResult<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(MtsError::AuthTokenFailure("Auth error: invalid_client".to_string()))
        } else {
            Ok("test-token".to_string())
        };
        future::ready(result).boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.closed.store(true, Ordering::SeqCst);
        future::ready(()).boxed()
    }
}

/// Collects everything passed to the unhandled-error hook.
#[derive(Clone, Default)]
pub struct UnhandledErrors {
    errors: Arc<Mutex<Vec<MtsError>>>,
}

impl UnhandledErrors {
    pub fn handler(&self) -> mts_rs::UnhandledErrorHandler {
        let errors = self.errors.clone();
        Arc::new(move |e: MtsError| errors.lock().unwrap().push(e))
    }

    pub fn all(&self) -> Vec<MtsError> {
        self.errors.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

pub struct Harness {
    pub engine: Arc<ProtocolEngine>,
    pub connector: FakeConnector,
    pub token: Arc<StaticToken>,
    pub unhandled: UnhandledErrors,
}

pub async fn connected_engine(config: Config) -> Harness {
    let connector = FakeConnector::new();
    let token = Arc::new(StaticToken::default());
    let unhandled = UnhandledErrors::default();
    let engine = Arc::new(ProtocolEngine::new(
        &config,
        Arc::new(connector.clone()),
        token.clone(),
        unhandled.handler(),
    ));
    engine.connect().await.unwrap();
    Harness {
        engine,
        connector,
        token,
        unhandled,
    }
}

/// Poll `condition` until it holds, failing the test after a generous bound.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

pub fn response_text(correlation_id: &str, content: serde_json::Value) -> String {
    serde_json::json!({
        "timestampUtc": 1_700_000_000_000_i64,
        "operation": "reply",
        "version": "3.0",
        "correlationId": correlation_id,
        "content": content,
    })
    .to_string()
}

pub fn accepted_ticket_reply(ticket_id: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "ticket-reply",
        "ticketId": ticket_id,
        "status": "accepted",
        "code": 0,
        "signature": "sig-1",
        "bets": [],
    })
}
