use crate::config::WebSocketConfig;
use crate::connection_state::{ConnectionManager, ConnectionState, Installed};
use crate::error::{MtsError, MtsResult};
use crate::message::{InboundEvent, OutboundMessage};
use crate::queue::SharedQueue;
use crate::scheduler::Scheduler;
use crate::token_provider::TokenSource;
use crate::transport::{Connector, FrameSink, SocketEvent};
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One open socket. Retired sockets keep delivering text until they are
/// closed but no longer report failures or trigger reconnects.
pub struct ActiveSocket {
    sink: Box<dyn FrameSink>,
    retired: AtomicBool,
}

impl ActiveSocket {
    fn new(sink: Box<dyn FrameSink>) -> Self {
        Self {
            sink,
            retired: AtomicBool::new(false),
        }
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if let Err(e) = self.sink.close().await {
            debug!("Error closing socket: {}", e);
        }
    }
}

/// Queues and collaborators shared by every connection of a pool.
#[derive(Clone)]
pub struct ConnectionContext {
    pub config: WebSocketConfig,
    pub connector: Arc<dyn Connector>,
    pub token_source: Arc<dyn TokenSource>,
    pub scheduler: Scheduler,
    pub outbound: SharedQueue<OutboundMessage>,
    pub inbound: SharedQueue<InboundEvent>,
}

/// A single logical socket with its own sender loop.
///
/// The loop takes work from the shared outbound queue, so any connection may
/// carry any message. Inbound text and lifecycle events go to the shared
/// inbound queue.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: usize,
    ctx: ConnectionContext,
    state: ConnectionManager<ActiveSocket>,
    shutdown: CancellationToken,
    sender: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    pub fn new(id: usize, ctx: ConnectionContext) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                ctx,
                state: ConnectionManager::new(),
                shutdown: CancellationToken::new(),
                sender: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get_state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    /// Epoch of the socket currently carrying writes.
    pub fn epoch(&self) -> Option<u64> {
        self.inner.state.current_epoch()
    }

    /// Open the socket and start the sender loop.
    pub async fn connect(&self) -> MtsResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(MtsError::NotConnected);
        }
        if !self.inner.state.is_connected() {
            // Run the open on its own task so an abandoned connect cannot strand the claim.
            let opening = tokio::spawn(self.inner.clone().reconnect(None, true));
            opening
                .await
                .map_err(|e| MtsError::Connection(format!("connect task failed: {e}")))??;
        }

        let mut sender = self.inner.sender.lock().unwrap_or_else(|e| e.into_inner());
        if sender.is_none() {
            let inner = self.inner.clone();
            *sender = Some(tokio::spawn(async move { inner.run_sender().await }));
        }
        info!("Connection {} connected", self.inner.id);
        Ok(())
    }

    /// Replace the socket observed at `observed`.
    ///
    /// Returns `Ok(None)` when another caller already owns the reconnect for
    /// that socket, or when a non-propagating attempt failed.
    pub async fn reconnect(
        &self,
        observed: Option<u64>,
        propagate: bool,
    ) -> MtsResult<Option<u64>> {
        let socket = self.inner.clone().reconnect(observed, propagate).await?;
        Ok(socket.map(|(epoch, _)| epoch))
    }

    /// Stop the sender loop and close the socket.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        if let Some(socket) = self.inner.state.begin_close() {
            socket.retire();
            socket.close().await;
        }
        let sender = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = sender {
            if let Err(e) = handle.await {
                error!("Connection {} sender loop failed: {}", self.inner.id, e);
            }
        }
        self.inner.state.finish_close();
        info!("Connection {} closed", self.inner.id);
    }
}

impl ConnectionInner {
    fn reconnect(
        self: Arc<Self>,
        observed: Option<u64>,
        propagate: bool,
    ) -> BoxFuture<'static, MtsResult<Option<(u64, Arc<ActiveSocket>)>>> {
        async move {
            let Some(claim) = self.state.try_claim(observed) else {
                debug!(
                    "Connection {} reconnect for epoch {:?} already handled",
                    self.id, observed
                );
                return Ok(None);
            };
            info!("Connection {} opening socket (replacing epoch {:?})", self.id, observed);

            let opened = match self.ctx.token_source.token().await {
                Ok(token) => self.ctx.connector.connect(token).await,
                Err(e) => Err(e),
            };
            let (sink, events) = match opened {
                Ok(parts) => parts,
                Err(e) => {
                    self.state.abandon(claim);
                    warn!(
                        "Connection {} failed to open socket (reconnect attempt {}): {}",
                        self.id,
                        self.state.get_reconnect_attempts(),
                        e
                    );
                    if propagate {
                        return Err(e);
                    }
                    self.ctx.inbound.push(InboundEvent::transport_error(e));
                    return Ok(None);
                }
            };

            let socket = Arc::new(ActiveSocket::new(sink));
            match self.state.install(claim, socket.clone()) {
                Installed::Rejected(socket) => {
                    debug!("Connection {} closed while connecting", self.id);
                    socket.retire();
                    socket.close().await;
                    Err(MtsError::NotConnected)
                }
                Installed::Swapped { epoch, previous } => {
                    info!("Connection {} connected at epoch {}", self.id, epoch);
                    let reader = self.clone();
                    let reader_socket = socket.clone();
                    tokio::spawn(async move { reader.run_reader(epoch, reader_socket, events).await });

                    if let Some(old) = previous {
                        old.retire();
                        self.ctx
                            .scheduler
                            .schedule(self.ctx.config.consumer_grace_timeout(), async move {
                                old.close().await;
                            });
                    }

                    let refresher = self.clone();
                    self.ctx
                        .scheduler
                        .schedule(self.ctx.config.refresh_connection_timeout(), async move {
                            if refresher.shutdown.is_cancelled() {
                                return;
                            }
                            debug!("Connection {} refreshing epoch {}", refresher.id, epoch);
                            let _ = refresher.reconnect(Some(epoch), false).await;
                        });

                    Ok(Some((epoch, socket)))
                }
            }
        }
        .boxed()
    }

    async fn run_sender(self: Arc<Self>) {
        let fetch_timeout = self.ctx.config.fetch_message_timeout();
        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                message = self.ctx.outbound.poll(fetch_timeout) => message,
            };
            if let Some(message) = message {
                self.clone().deliver(message).await;
            }
        }
        debug!("Connection {} sender loop stopped", self.id);
    }

    async fn deliver(self: Arc<Self>, message: OutboundMessage) {
        let correlation_id = message.correlation_id.clone();
        if message.frames.is_empty() {
            self.ctx
                .inbound
                .push(InboundEvent::NotProcessed { correlation_id });
            return;
        }

        let (observed, err) = match self.write(&message).await {
            Ok(()) => {
                self.ctx.inbound.push(InboundEvent::Sent { correlation_id });
                return;
            }
            Err(failure) => failure,
        };

        warn!(
            "Connection {} write of {} failed: {}",
            self.id, correlation_id, err
        );
        self.ctx.inbound.push(InboundEvent::transport_error(err));
        if let Err(e) = self.clone().reconnect(observed, false).await {
            debug!("Connection {} reconnect after write failure: {}", self.id, e);
        }

        match self.write(&message).await {
            Ok(()) => self.ctx.inbound.push(InboundEvent::Sent { correlation_id }),
            Err((_, error)) => self.ctx.inbound.push(InboundEvent::TransportError {
                correlation_id: Some(correlation_id),
                error,
            }),
        }
    }

    /// Write to the current socket, reporting the epoch that failed.
    async fn write(&self, message: &OutboundMessage) -> Result<(), (Option<u64>, MtsError)> {
        let Some((epoch, socket)) = self.state.current() else {
            return Err((None, MtsError::NotConnected));
        };
        let send_timeout = self.ctx.config.send_message_timeout();
        match timeout(send_timeout, socket.sink.send_frames(&message.frames)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err((Some(epoch), e)),
            Err(_) => Err((
                Some(epoch),
                MtsError::Connection(format!("send timed out after {send_timeout:?}")),
            )),
        }
    }

    async fn run_reader(
        self: Arc<Self>,
        epoch: u64,
        socket: Arc<ActiveSocket>,
        mut events: BoxStream<'static, SocketEvent>,
    ) {
        let failure = loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                event = events.next() => event,
            };
            match event {
                Some(SocketEvent::Text(text)) => {
                    self.ctx.inbound.push(InboundEvent::ReceivedContent(text));
                }
                Some(SocketEvent::Closed { code, reason }) => {
                    break MtsError::Connection(format!("socket closed ({code}): {reason}"));
                }
                Some(SocketEvent::Error(e)) => break e,
                None => break MtsError::Connection("socket stream ended".to_string()),
            }
        };

        if socket.is_retired() || self.shutdown.is_cancelled() {
            debug!("Connection {} epoch {} reader finished", self.id, epoch);
            return;
        }
        warn!(
            "Connection {} epoch {} lost after {:?}: {}",
            self.id,
            epoch,
            self.state.last_connected_duration().unwrap_or_default(),
            failure
        );
        self.ctx.inbound.push(InboundEvent::transport_error(failure));
        if let Err(e) = self.clone().reconnect(Some(epoch), false).await {
            debug!("Connection {} reconnect after read failure: {}", self.id, e);
        }
    }
}
