use crate::connection::{Connection, ConnectionContext};
use crate::error::MtsResult;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// N connections sharing one outbound and one inbound queue.
pub struct ConnectionPool {
    ctx: ConnectionContext,
    connections: Vec<Connection>,
    connected: AtomicBool,
}

impl ConnectionPool {
    pub fn new(ctx: ConnectionContext) -> Self {
        let connections = (0..ctx.config.number_of_connections.max(1))
            .map(|id| Connection::new(id, ctx.clone()))
            .collect();
        Self {
            ctx,
            connections,
            connected: AtomicBool::new(false),
        }
    }

    /// Authenticate once, then open every connection.
    ///
    /// Connections opened before a failure stay open, so a retry only opens the rest.
    pub async fn connect(&self) -> MtsResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.ctx.token_source.token().await?;

        for connection in &self.connections {
            if let Err(e) = connection.connect().await {
                warn!("Connection {} failed to connect: {}", connection.id(), e);
                return Err(e);
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        info!(
            "Connection pool connected with {} connections",
            self.connections.len()
        );
        Ok(())
    }

    /// Close every connection, then the token source.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        for connection in &self.connections {
            connection.close().await;
        }
        self.ctx.token_source.close().await;
        info!("Connection pool closed");
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }
}
