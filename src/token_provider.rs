use crate::config::AuthConfig;
use crate::error::{MtsError, MtsResult};
use crate::retry::{RetryConfig, RetryPolicy};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Attempts made against the authorization server before giving up.
pub const MAX_TOKEN_ATTEMPTS: u32 = 10;

/// Subtracted from `expires_in` so a cached token is never used at the edge of its lifetime.
const EXPIRY_SAFETY_MARGIN_SECS: i64 = 1;

#[derive(Debug, Clone, Deserialize)]
struct AuthResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl AuthResponse {
    fn error_message(&self) -> Option<String> {
        let error = non_blank(self.error.as_deref());
        let description = non_blank(self.error_description.as_deref());
        if error.is_none() && description.is_none() {
            return None;
        }
        let mut message = "Auth error".to_string();
        for part in [error, description].into_iter().flatten() {
            message.push_str(": ");
            message.push_str(part);
        }
        Some(message)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Monotonic and wall-clock end of a token's usable lifetime, or `None` when
/// the lifetime is too short or does not fit either clock.
fn cache_window(expires_in: i64) -> Option<(Instant, DateTime<Utc>)> {
    if expires_in <= EXPIRY_SAFETY_MARGIN_SECS {
        return None;
    }
    let secs = expires_in - EXPIRY_SAFETY_MARGIN_SECS;
    let expires_at =
        chrono::Duration::try_seconds(secs).and_then(|d| Utc::now().checked_add_signed(d))?;
    let valid_until = Instant::now().checked_add(Duration::from_secs(secs as u64))?;
    Some((valid_until, expires_at))
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    valid_until: Instant,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
enum FetchError {
    /// The server answered with an explicit error payload.
    Rejected(String),
    Transport(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FetchError::Rejected(msg) => write!(f, "{msg}"),
            FetchError::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

/// Source of the bearer token sent on every socket upgrade.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> BoxFuture<'_, MtsResult<String>>;

    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Acquires and caches a bearer token via the OAuth2 client-credentials grant.
pub struct TokenProvider {
    client: Client,
    config: AuthConfig,
    retry_policy: RetryPolicy,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(config: AuthConfig) -> MtsResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let retry_policy = RetryPolicy::new(RetryConfig::fixed(
            MAX_TOKEN_ATTEMPTS,
            config.retry_delay(),
        ));
        Ok(Self {
            client,
            config,
            retry_policy,
            cached: Mutex::new(None),
        })
    }

    /// Return the cached token, or fetch a fresh one when the cache is empty or expired.
    ///
    /// The cache lock is held across the fetch so concurrent callers wait for a
    /// single refresh instead of racing the authorization server.
    pub async fn get_token(&self) -> MtsResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.valid_until {
                return Ok(token.token.clone());
            }
            debug!("Cached auth token expired at {}", token.expires_at);
        }

        let (token, expires_in) = self
            .retry_policy
            .retry_if(
                || self.fetch_token(),
                |err| matches!(err, FetchError::Transport(_)),
            )
            .await
            .map_err(|err| MtsError::AuthTokenFailure(err.to_string()))?;

        match cache_window(expires_in) {
            Some((valid_until, expires_at)) => {
                info!("Auth token refreshed, valid until {}", expires_at);
                *cached = Some(CachedToken {
                    token: token.clone(),
                    valid_until,
                    expires_at,
                });
            }
            None => debug!("Auth token expires_in={} not cacheable", expires_in),
        }

        Ok(token)
    }

    /// Expiry of the currently cached token, if any.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.cached.lock().await.as_ref().map(|t| t.expires_at)
    }

    /// Drop the cached token.
    pub async fn close(&self) {
        self.cached.lock().await.take();
    }

    async fn fetch_token(&self) -> Result<(String, i64), FetchError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("audience", self.config.audience.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.server)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        debug!("Auth response status: {}", status);

        let auth: AuthResponse = match serde_json::from_str(&body) {
            Ok(auth) => auth,
            Err(e) if status.is_success() => {
                return Err(FetchError::Transport(format!("invalid auth response: {e}")))
            }
            Err(_) => {
                return Err(FetchError::Transport(format!(
                    "auth request failed with status {status}"
                )))
            }
        };

        if let Some(message) = auth.error_message() {
            return Err(FetchError::Rejected(message));
        }

        match non_blank(auth.access_token.as_deref()) {
            Some(token) if status.is_success() => {
                Ok((token.to_string(), auth.expires_in.unwrap_or(0)))
            }
            _ => Err(FetchError::Transport(format!(
                "no access token in auth response (status {status})"
            ))),
        }
    }
}

impl TokenSource for TokenProvider {
    fn token(&self) -> BoxFuture<'_, MtsResult<String>> {
        self.get_token().boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        TokenProvider::close(self).boxed()
    }
}
