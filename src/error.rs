//! Error types shared across CabalGuard modules

use std::fmt::Display;
use thiserror::Error;

/// Errors worth repeating the same call for
pub trait Retryable: Display {
    fn is_transient(&self) -> bool;
}

/// Failure talking to an external data provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: &'static str },

    #[error("rate limited by {endpoint}")]
    RateLimited { endpoint: &'static str },

    #[error("http error from {endpoint}: {source}")]
    Http {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("{endpoint} returned api error code {code}: {message}")]
    Api {
        endpoint: &'static str,
        code: i64,
        message: String,
    },

    #[error("malformed response from {endpoint}: {detail}")]
    Malformed {
        endpoint: &'static str,
        detail: String,
    },
}

impl ProviderError {
    /// Build from a reqwest error, classifying timeouts separately
    pub fn from_reqwest(endpoint: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ProviderError::Timeout { endpoint }
        } else if source.is_decode() {
            ProviderError::Malformed {
                endpoint,
                detail: source.to_string(),
            }
        } else if source.status().map(|s| s.as_u16()) == Some(429) {
            ProviderError::RateLimited { endpoint }
        } else {
            ProviderError::Http { endpoint, source }
        }
    }

    /// Map a non-success HTTP status
    pub fn from_status(endpoint: &'static str, status: u16) -> Self {
        if status == 429 {
            ProviderError::RateLimited { endpoint }
        } else {
            ProviderError::Status { endpoint, status }
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            ProviderError::Timeout { endpoint }
            | ProviderError::RateLimited { endpoint }
            | ProviderError::Http { endpoint, .. }
            | ProviderError::Status { endpoint, .. }
            | ProviderError::Api { endpoint, .. }
            | ProviderError::Malformed { endpoint, .. } => endpoint,
        }
    }
}

impl Retryable for ProviderError {
    fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout { .. } | ProviderError::RateLimited { .. } => true,
            ProviderError::Http { source, .. } => source.is_connect() || source.is_request(),
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::Api { .. } | ProviderError::Malformed { .. } => false,
        }
    }
}

/// Errors raised by the monitor core
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor is already running")]
    AlreadyRunning,

    #[error("monitor is still stopping, try again shortly")]
    Stopping,

    #[error("token feed unavailable: {0}")]
    Feed(#[source] ProviderError),

    #[error("trader fetch failed for {token}: {source}")]
    Traders {
        token: String,
        #[source]
        source: ProviderError,
    },

    #[error("invalid alert input: {0}")]
    InvalidAlert(String),
}

/// Errors raised while delivering an alert
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram rejected message with status {status}: {body}")]
    Telegram { status: u16, body: String },

    #[error("alert rate limit reached ({per_minute}/min)")]
    RateLimited { per_minute: u32 },

    #[error("alert for {token} suppressed by cooldown")]
    Cooldown { token: String },
}

impl Retryable for SinkError {
    fn is_transient(&self) -> bool {
        match self {
            SinkError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SinkError::Telegram { status, .. } => *status == 429 || *status >= 500,
            SinkError::RateLimited { .. } | SinkError::Cooldown { .. } => false,
        }
    }
}

/// Invalid configuration value
#[derive(Debug, Error)]
#[error("invalid configuration {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(key: &'static str, reason: impl Into<String>) -> Self {
        Self {
            key,
            reason: reason.into(),
        }
    }
}
