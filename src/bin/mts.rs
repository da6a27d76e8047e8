use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mts_rs::dto::*;
use mts_rs::error::is_rejected_before_send;
use mts_rs::{Config, MtsClient, MtsError, TicketProtocol, TokenProvider};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mts")]
#[command(about = "MTS ticket submission CLI", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = mts_rs::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch an access token and print when it expires
    Token,
    /// Send a JSON request and print the reply
    Send {
        /// Operation name, e.g. ticket-placement or ticket-cancel
        operation: String,
        /// File holding the request content
        file: PathBuf,
        /// Correlation id to use instead of a generated one
        #[arg(long)]
        correlation_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    match cli.command {
        Commands::Token => token(config).await,
        Commands::Send {
            operation,
            file,
            correlation_id,
        } => send(config, &operation, file, correlation_id).await,
    }
}

async fn token(config: Config) -> Result<()> {
    let provider = TokenProvider::new(config.auth)?;
    let token = provider.get_token().await?;
    let prefix: String = token.chars().take(12).collect();
    match provider.expires_at().await {
        Some(expires_at) => println!("token {prefix}... valid until {expires_at}"),
        None => println!("token {prefix}... (not cached, lifetime too short)"),
    }
    Ok(())
}

async fn send(
    config: Config,
    operation: &str,
    file: PathBuf,
    correlation_id: Option<String>,
) -> Result<()> {
    let body = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;

    let client = MtsClient::new(
        config,
        Arc::new(|e: MtsError| warn!("Unhandled MTS error: {}", e)),
    )?;
    client.connect().await?;
    info!("Sending {} from {}", operation, file.display());

    let protocol = client.ticket_protocol();
    let id = correlation_id.as_deref();
    let reply = match operation {
        "ticket-placement" => send_as::<TicketRequest>(protocol, &body, id).await,
        "ticket-placement-inform" => send_as::<TicketInformRequest>(protocol, &body, id).await,
        "ticket-placement-ack" => send_as::<TicketAckRequest>(protocol, &body, id).await,
        "ticket-cancel" => send_as::<CancelRequest>(protocol, &body, id).await,
        "ticket-cancel-ack" => send_as::<CancelAckRequest>(protocol, &body, id).await,
        "ticket-cashout" => send_as::<CashoutRequest>(protocol, &body, id).await,
        "cashout-inform" => send_as::<CashoutInformRequest>(protocol, &body, id).await,
        "ticket-cashout-ack" => send_as::<CashoutAckRequest>(protocol, &body, id).await,
        "ticket-ext-settlement" => send_as::<ExtSettlementRequest>(protocol, &body, id).await,
        "ticket-ext-settlement-ack" => {
            send_as::<ExtSettlementAckRequest>(protocol, &body, id).await
        }
        "max-stake" => send_as::<MaxStakeRequest>(protocol, &body, id).await,
        other => Err(anyhow::anyhow!("Unknown operation: {other}")),
    };

    client.close().await;
    println!("{}", serde_json::to_string_pretty(&reply?)?);
    Ok(())
}

async fn send_as<R>(
    protocol: &TicketProtocol,
    body: &str,
    correlation_id: Option<&str>,
) -> Result<serde_json::Value>
where
    R: MtsRequest + DeserializeOwned,
    R::Response: Serialize,
{
    let mut request: R = serde_json::from_str(body).context("parsing request")?;
    if let Some(id) = correlation_id {
        request.set_correlation_id(id.to_string());
    }

    match protocol.send(&request, None).await {
        Ok(reply) => Ok(serde_json::to_value(reply)?),
        Err(e) if is_rejected_before_send(&e) => {
            Err(anyhow::anyhow!("Request rejected before sending: {e}"))
        }
        Err(e) => Err(e.into()),
    }
}
