//! # mts-rs
//!
//! A Rust client SDK for submitting betting tickets to the MTS trading platform
//! and receiving its asynchronous replies over a pool of WebSocket connections.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mts_rs::dto::{Bet, Odds, Selection, Stake, TicketRequest};
//! use mts_rs::{Config, MtsClient, MtsError};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! // Load configuration from config.toml
//! let config = Config::new()?;
//!
//! // Errors that cannot be tied to a request end up here
//! let client = MtsClient::new(config, Arc::new(|e: MtsError| eprintln!("unhandled: {e}")))?;
//! client.connect().await?;
//!
//! let ticket = TicketRequest {
//!     correlation_id: None,
//!     ticket_id: "ticket-1".to_string(),
//!     bets: vec![Bet {
//!         bet_id: Some("bet-1".to_string()),
//!         selections: vec![Selection {
//!             event_id: "sr:match:1".to_string(),
//!             market_id: "1".to_string(),
//!             outcome_id: "1".to_string(),
//!             specifiers: None,
//!             odds: Odds::Decimal { value: Decimal::new(15, 1) },
//!         }],
//!         stake: vec![Stake::cash("EUR", Decimal::new(10, 0))],
//!     }],
//!     test_source: None,
//! };
//!
//! let reply = client.ticket_protocol().send_ticket(&ticket).await?;
//! println!("ticket {} {:?}", reply.ticket_id, reply.status);
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Token Provider**: OAuth2 client-credentials token, cached until shortly before expiry
//! - **Connection Pool**: N sockets sharing one outbound and one inbound queue, reconnecting on failure
//! - **Framing**: messages split into 32,000 byte frames, at most 4 per message
//! - **Retry Until Ack**: requests are resent until a reply arrives or the retry budget runs out
//! - **Backpressure**: requests beyond `max_send_buffer_size` in flight are rejected immediately
//!
//! ## Configuration
//!
//! Create a `config.toml` file:
//!
//! ```toml
//! operator_id = 9985
//!
//! [auth]
//! server = "https://auth.example.com/oauth/token"
//! client_id = "mts-client"
//! client_secret = "secret"
//! audience = "mts"
//!
//! [websocket]
//! server = "wss://mts.example.com/ws"
//! number_of_connections = 2
//!
//! [protocol]
//! receive_response_timeout_ms = 15000
//! retry_count = 3
//! ```
//!
//! `MTS_AUTH_CLIENT_SECRET` and `MTS_OPERATOR_ID` (also read from `.env`)
//! override the file.

pub mod awaiter;
pub mod client;
pub mod config;
pub mod connection;
pub mod connection_pool;
pub mod connection_state;
pub mod dto;
pub mod error;
pub mod framing;
pub mod message;
pub mod protocol_engine;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod ticket_protocol;
pub mod token_provider;
pub mod transport;

// Re-export commonly used types at the crate root
pub use awaiter::SentCallback;
pub use client::MtsClient;
pub use config::Config;
pub use error::{MtsError, MtsResult};
pub use protocol_engine::{ProtocolEngine, UnhandledErrorHandler};
pub use ticket_protocol::TicketProtocol;
pub use token_provider::{TokenProvider, TokenSource};
pub use transport::{Connector, FrameSink, SocketEvent, TungsteniteConnector};
