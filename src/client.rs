use crate::config::Config;
use crate::error::{MtsError, MtsResult};
use crate::protocol_engine::{ProtocolEngine, UnhandledErrorHandler};
use crate::ticket_protocol::TicketProtocol;
use crate::token_provider::{TokenProvider, TokenSource};
use crate::transport::{Connector, TungsteniteConnector};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Created,
    Connected,
    Closed,
}

/// Entry point of the SDK.
///
/// ```no_run
/// use mts_rs::{Config, MtsClient, MtsError};
/// use std::sync::Arc;
///
/// # async fn run() -> anyhow::Result<()> {
/// let config = Config::new()?;
/// let client = MtsClient::new(config, Arc::new(|e: MtsError| eprintln!("unhandled: {e}")))?;
/// client.connect().await?;
/// // client.ticket_protocol().send_ticket(&ticket).await?;
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct MtsClient {
    config: Config,
    engine: Arc<ProtocolEngine>,
    ticket_protocol: TicketProtocol,
    state: Mutex<ClientState>,
}

impl MtsClient {
    /// Build a client that authenticates over HTTP and talks to `websocket.server`.
    pub fn new(config: Config, on_unhandled: UnhandledErrorHandler) -> MtsResult<Self> {
        let token_provider = Arc::new(TokenProvider::new(config.auth.clone())?);
        let connector = Arc::new(TungsteniteConnector::new(
            config.websocket.server.clone(),
            config.websocket.reconnect_timeout(),
        ));
        Ok(Self::with_transport(
            config,
            connector,
            token_provider,
            on_unhandled,
        ))
    }

    /// Build a client over explicit transport collaborators.
    pub fn with_transport(
        config: Config,
        connector: Arc<dyn Connector>,
        token_source: Arc<dyn TokenSource>,
        on_unhandled: UnhandledErrorHandler,
    ) -> Self {
        let engine = Arc::new(ProtocolEngine::new(
            &config,
            connector,
            token_source,
            guard_handler(on_unhandled),
        ));
        Self {
            config,
            ticket_protocol: TicketProtocol::new(engine.clone()),
            engine,
            state: Mutex::new(ClientState::Created),
        }
    }

    /// Connect the engine. Calling it again while connected does nothing.
    pub async fn connect(&self) -> MtsResult<()> {
        let mut state = self.state.lock().await;
        match *state {
            ClientState::Connected => return Ok(()),
            ClientState::Closed => {
                return Err(MtsError::Connection("client is closed".to_string()))
            }
            ClientState::Created => {}
        }

        let connect_timeout = self.config.protocol.connect_timeout();
        timeout(connect_timeout, self.engine.connect())
            .await
            .map_err(|_| {
                MtsError::Connection(format!("connect timed out after {connect_timeout:?}"))
            })??;

        *state = ClientState::Connected;
        info!("MTS client connected (operator {})", self.config.operator_id);
        Ok(())
    }

    /// Close the engine. The client cannot be reconnected afterwards.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if *state == ClientState::Closed {
            return;
        }
        self.engine.close().await;
        *state = ClientState::Closed;
        info!("MTS client closed");
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    pub fn ticket_protocol(&self) -> &TicketProtocol {
        &self.ticket_protocol
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Keep a panicking user handler from taking a dispatcher down with it.
fn guard_handler(handler: UnhandledErrorHandler) -> UnhandledErrorHandler {
    Arc::new(move |error: MtsError| {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(error))) {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Unhandled error handler panicked: {}", reason);
        }
    })
}
