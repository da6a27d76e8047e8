//! Request/response engine over the pooled connections.
//!
//! Every request is registered as an [`Awaiter`] under its correlation id,
//! framed, and pushed to the shared outbound queue. A resend task re-enqueues
//! the same frames every `receive_response_timeout` until a reply arrives or
//! `retry_count` resends have been made, after which the request times out.
//! Dispatcher workers drain the inbound queue and complete awaiters.

use crate::awaiter::{Awaiter, AwaiterTable, Delivery, SentCallback};
use crate::config::{Config, ProtocolConfig};
use crate::connection::ConnectionContext;
use crate::connection_pool::ConnectionPool;
use crate::dto::envelope::{RawResponseEnvelope, RequestEnvelope};
use crate::dto::response::{ResponseContent, ResponseKind};
use crate::error::{MtsError, MtsResult};
use crate::framing::encode_frames;
use crate::message::{InboundEvent, OutboundMessage};
use crate::queue::SharedQueue;
use crate::scheduler::Scheduler;
use crate::token_provider::TokenSource;
use crate::transport::Connector;
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Receives every error that cannot be attributed to a pending request.
pub type UnhandledErrorHandler = Arc<dyn Fn(MtsError) + Send + Sync>;

pub struct ProtocolEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    operator_id: i64,
    config: ProtocolConfig,
    awaiters: AwaiterTable,
    pool: ConnectionPool,
    outbound: SharedQueue<OutboundMessage>,
    inbound: SharedQueue<InboundEvent>,
    scheduler: Scheduler,
    on_unhandled: UnhandledErrorHandler,
    connected: AtomicBool,
    lifecycle: tokio::sync::Mutex<()>,
    dispatch_shutdown: Mutex<CancellationToken>,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
}

impl ProtocolEngine {
    pub fn new(
        config: &Config,
        connector: Arc<dyn Connector>,
        token_source: Arc<dyn TokenSource>,
        on_unhandled: UnhandledErrorHandler,
    ) -> Self {
        let outbound = SharedQueue::new();
        let inbound = SharedQueue::new();
        let scheduler = Scheduler::new();
        let pool = ConnectionPool::new(ConnectionContext {
            config: config.websocket.clone(),
            connector,
            token_source,
            scheduler: scheduler.clone(),
            outbound: outbound.clone(),
            inbound: inbound.clone(),
        });

        Self {
            inner: Arc::new(EngineInner {
                operator_id: config.operator_id,
                config: config.protocol.clone(),
                awaiters: AwaiterTable::new(),
                pool,
                outbound,
                inbound,
                scheduler,
                on_unhandled,
                connected: AtomicBool::new(false),
                lifecycle: tokio::sync::Mutex::new(()),
                dispatch_shutdown: Mutex::new(CancellationToken::new()),
                dispatchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Start the dispatchers, then connect the pool.
    pub async fn connect(&self) -> MtsResult<()> {
        let _guard = self.inner.lifecycle.lock().await;
        if self.inner.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.stop_dispatchers().await;
        let shutdown = CancellationToken::new();
        {
            let mut handles = self.inner.lock_dispatchers();
            for worker in 0..self.inner.config.number_of_dispatchers.max(1) {
                let inner = self.inner.clone();
                let shutdown = shutdown.clone();
                handles.push(tokio::spawn(async move {
                    inner.run_dispatcher(worker, shutdown).await
                }));
            }
        }
        *self
            .inner
            .dispatch_shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = shutdown;

        if let Err(e) = self.inner.pool.connect().await {
            error!("Protocol engine failed to connect: {}", e);
            self.inner.stop_dispatchers().await;
            return Err(e);
        }

        self.inner.connected.store(true, Ordering::SeqCst);
        info!(
            "Protocol engine connected with {} dispatchers",
            self.inner.config.number_of_dispatchers
        );
        Ok(())
    }

    /// Stop dispatchers and connections, then fail every pending request with `NotConnected`.
    pub async fn close(&self) {
        let _guard = self.inner.lifecycle.lock().await;
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.stop_dispatchers().await;
        self.inner.pool.close().await;
        self.inner.scheduler.cancel_all();
        let released = self.inner.awaiters.release_all();
        info!("Protocol engine closed, released {} pending requests", released);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Requests currently holding an in-flight slot.
    pub fn in_flight(&self) -> usize {
        self.inner.awaiters.in_flight()
    }

    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.inner.awaiters.contains(correlation_id)
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// Send `content` and wait for a reply of kind `expected`.
    ///
    /// Rejections (not connected, send buffer full, message too big) resolve
    /// immediately without touching the outbound queue.
    pub fn execute(
        &self,
        operation: &str,
        content: String,
        expected: ResponseKind,
        correlation_id: Option<String>,
        on_sent: Option<SentCallback>,
    ) -> BoxFuture<'static, MtsResult<ResponseContent>> {
        let submitted = self.inner.clone().submit(
            operation,
            content,
            correlation_id,
            |message| Awaiter::typed(expected, message, on_sent),
        );
        match submitted {
            Ok(rx) => async move { rx.await.unwrap_or(Err(MtsError::NotConnected)) }.boxed(),
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }

    /// Send `content` and complete on any reply for its correlation id.
    pub fn execute_no_response(
        &self,
        operation: &str,
        content: String,
        correlation_id: Option<String>,
        on_sent: Option<SentCallback>,
    ) -> BoxFuture<'static, MtsResult<()>> {
        let submitted = self.inner.clone().submit(
            operation,
            content,
            correlation_id,
            |message| Awaiter::delivery_only(message, on_sent),
        );
        match submitted {
            Ok(rx) => async move { rx.await.unwrap_or(Err(MtsError::NotConnected)) }.boxed(),
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }
}

impl EngineInner {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.pool.is_connected()
    }

    fn lock_dispatchers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.dispatchers.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn stop_dispatchers(&self) {
        self.dispatch_shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
        let handles: Vec<_> = self.lock_dispatchers().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Dispatcher task failed: {}", e);
            }
        }
    }

    fn submit<T>(
        self: Arc<Self>,
        operation: &str,
        content: String,
        correlation_id: Option<String>,
        make_awaiter: impl FnOnce(OutboundMessage) -> (Awaiter, T),
    ) -> MtsResult<T> {
        if !self.is_connected() {
            return Err(MtsError::NotConnected);
        }

        let correlation_id = correlation_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let envelope = RequestEnvelope {
            operator_id: self.operator_id,
            operation: operation.to_string(),
            content,
            correlation_id: correlation_id.clone(),
        };
        let frames = encode_frames(&envelope)?;

        let (awaiter, rx) = make_awaiter(OutboundMessage::new(correlation_id.clone(), frames));
        let awaiter = Arc::new(awaiter);
        self.awaiters
            .register(awaiter.clone(), self.config.max_send_buffer_size)?;

        // close() may have swept the table between the check above and registration.
        if !self.is_connected() {
            self.awaiters.release(&correlation_id);
            return Ok(rx);
        }

        debug!("Sending {} ({})", operation, correlation_id);
        self.outbound.push(awaiter.message().clone());
        self.schedule_resend(correlation_id);
        Ok(rx)
    }

    fn schedule_resend(self: Arc<Self>, correlation_id: String) {
        let engine = self.clone();
        self.scheduler
            .schedule(self.config.receive_response_timeout(), async move {
                engine.check_awaiter(correlation_id);
            });
    }

    fn check_awaiter(self: Arc<Self>, correlation_id: String) {
        let Some(awaiter) = self.awaiters.get(&correlation_id) else {
            return;
        };
        if awaiter.is_done() {
            self.awaiters.release(&correlation_id);
            return;
        }

        let attempt = awaiter.record_attempt();
        if attempt <= self.config.retry_count {
            debug!(
                "No reply for {} yet, resending (attempt {}/{})",
                correlation_id, attempt, self.config.retry_count
            );
            self.outbound.push(awaiter.message().clone());
            self.schedule_resend(correlation_id);
        } else {
            warn!(
                "Request {} timed out after {} resends",
                correlation_id, self.config.retry_count
            );
            awaiter.fail(MtsError::Timeout);
            self.awaiters.release(&correlation_id);
        }
    }

    async fn run_dispatcher(self: Arc<Self>, worker: usize, shutdown: CancellationToken) {
        let dequeue_timeout = self.config.dequeue_timeout();
        debug!("Dispatcher {} started", worker);
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.inbound.poll(dequeue_timeout) => event,
            };
            if let Some(event) = event {
                self.dispatch(event);
            }
        }
        debug!("Dispatcher {} stopped", worker);
    }

    fn dispatch(&self, event: InboundEvent) {
        match event {
            InboundEvent::ReceivedContent(text) => self.on_content(&text),
            InboundEvent::Sent { correlation_id } => {
                if let Some(awaiter) = self.awaiters.get(&correlation_id) {
                    awaiter.notify_sent();
                }
            }
            InboundEvent::TransportError {
                correlation_id,
                error,
            } => self.fail_or_escalate(correlation_id, error),
            InboundEvent::NotProcessed { correlation_id } => self.fail_or_escalate(
                Some(correlation_id),
                MtsError::InvalidResponse("message was not processed".to_string()),
            ),
        }
    }

    fn on_content(&self, text: &str) {
        let raw = match RawResponseEnvelope::parse(text) {
            Ok(raw) => raw,
            Err(e) => {
                self.escalate(MtsError::InvalidResponse(format!(
                    "unreadable response: {e}"
                )));
                return;
            }
        };
        let Some(correlation_id) = raw.correlation_id().map(str::to_string) else {
            self.escalate(MtsError::InvalidResponse(
                "response has no correlation id".to_string(),
            ));
            return;
        };
        let Some(awaiter) = self.awaiters.get(&correlation_id) else {
            self.escalate(MtsError::InvalidResponse(format!(
                "no pending request for correlation id {correlation_id}"
            )));
            return;
        };

        let decoded = match awaiter.expected() {
            None if raw.has_content() => Ok(None),
            None => Err(MtsError::InvalidResponse(
                "response has no content".to_string(),
            )),
            Some(_) => raw.decode().map(Some),
        };
        let delivery = match decoded {
            Ok(None) => awaiter.acknowledge(),
            Ok(Some(envelope)) => awaiter.deliver(envelope.content),
            Err(e) => {
                awaiter.fail(e.clone());
                self.awaiters.release(&correlation_id);
                self.escalate(e);
                return;
            }
        };

        match delivery {
            Delivery::Completed => {
                debug!("Reply received for {}", correlation_id);
                self.awaiters.release(&correlation_id);
            }
            Delivery::AlreadyDone => {
                debug!("Duplicate reply for {}", correlation_id);
            }
            Delivery::Mismatch { expected, actual } => {
                self.awaiters.release(&correlation_id);
                self.escalate(MtsError::InvalidResponse(format!(
                    "reply for {correlation_id} was {actual}, expected {expected}"
                )));
            }
        }
    }

    fn fail_or_escalate(&self, correlation_id: Option<String>, error: MtsError) {
        if let Some(correlation_id) = correlation_id {
            if let Some(awaiter) = self.awaiters.get(&correlation_id) {
                if awaiter.fail(error.clone()) {
                    debug!("Request {} failed: {}", correlation_id, error);
                    self.awaiters.release(&correlation_id);
                    return;
                }
            }
        }
        self.escalate(error);
    }

    fn escalate(&self, error: MtsError) {
        warn!("Unhandled protocol error: {}", error);
        (self.on_unhandled)(error);
    }
}
