use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub server: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_auth_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    pub server: String,
    #[serde(default = "default_number_of_connections")]
    pub number_of_connections: usize,
    #[serde(default = "default_timeout_ms")]
    pub reconnect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub fetch_message_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub send_message_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub consumer_grace_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub refresh_connection_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_max_send_buffer_size")]
    pub max_send_buffer_size: usize,
    #[serde(default = "default_timeout_ms")]
    pub dequeue_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub receive_response_timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_number_of_dispatchers")]
    pub number_of_dispatchers: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_timeout_ms(),
            max_send_buffer_size: default_max_send_buffer_size(),
            dequeue_timeout_ms: default_timeout_ms(),
            receive_response_timeout_ms: default_timeout_ms(),
            retry_count: default_retry_count(),
            number_of_dispatchers: default_number_of_dispatchers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub operator_id: i64,
    pub auth: AuthConfig,
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

fn default_client_id() -> String {
    "mts-client".to_string()
}

fn default_audience() -> String {
    "mts".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_auth_retry_delay_ms() -> u64 {
    5_000
}

fn default_number_of_connections() -> usize {
    1
}

fn default_max_send_buffer_size() -> usize {
    1_000
}

fn default_retry_count() -> u32 {
    3
}

fn default_number_of_dispatchers() -> usize {
    1
}

impl Config {
    /// Load `config.toml` from the working directory.
    pub fn new() -> Result<Self> {
        Self::from_file(DEFAULT_CONFIG_PATH)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&config_str)?;
        info!(
            "Config loaded from {}: operator_id={}, ws={}, connections={}",
            path.as_ref().display(),
            config.operator_id,
            config.websocket.server,
            config.websocket.number_of_connections
        );
        Ok(config)
    }

    /// Parse a TOML document, apply environment overrides and validate.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(config_str)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        dotenv::dotenv().ok();
        if let Ok(secret) = env::var("MTS_AUTH_CLIENT_SECRET") {
            self.auth.client_secret = secret;
        }
        if let Ok(operator_id) = env::var("MTS_OPERATOR_ID") {
            self.operator_id = operator_id
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid MTS_OPERATOR_ID {operator_id:?}: {e}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.websocket.number_of_connections == 0 {
            return Err(anyhow::anyhow!(
                "websocket.number_of_connections must be at least 1"
            ));
        }
        if self.protocol.number_of_dispatchers == 0 {
            return Err(anyhow::anyhow!(
                "protocol.number_of_dispatchers must be at least 1"
            ));
        }
        if self.protocol.receive_response_timeout_ms == 0 {
            return Err(anyhow::anyhow!(
                "protocol.receive_response_timeout_ms must be greater than 0"
            ));
        }
        Ok(())
    }
}

impl AuthConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl WebSocketConfig {
    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }

    pub fn fetch_message_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_message_timeout_ms)
    }

    pub fn send_message_timeout(&self) -> Duration {
        Duration::from_millis(self.send_message_timeout_ms)
    }

    pub fn consumer_grace_timeout(&self) -> Duration {
        Duration::from_millis(self.consumer_grace_timeout_ms)
    }

    pub fn refresh_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_connection_timeout_ms)
    }
}

impl ProtocolConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn receive_response_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_response_timeout_ms)
    }
}
