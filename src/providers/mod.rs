//! External data providers: token feed, trader history and address activity

pub mod jupiter;
pub mod okx;

pub use jupiter::JupiterFeed;
pub use okx::OkxClient;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::Config;
use crate::error::{ProviderError, Retryable};
use crate::models::{ActivityReport, TokenSnapshot};
use crate::utils::MetricsService;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Supplies the currently-qualifying tokens once per cycle
#[async_trait]
pub trait TokenFeed: Send + Sync {
    async fn fetch_qualifying_tokens(&self) -> Result<Vec<TokenSnapshot>, ProviderError>;
}

/// Recent traders of a token; best effort, may return fewer than `limit`
#[async_trait]
pub trait TraderSource: Send + Sync {
    async fn fetch_traders(&self, token: &str, limit: usize) -> Result<Vec<String>, ProviderError>;
}

/// Trade counts and token holdings of one address
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn fetch_activity(&self, address: &str) -> Result<ActivityReport, ProviderError>;
}

/// Bounded exponential backoff applied at the call site
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.http_max_retries.max(1),
            initial_delay: Duration::from_millis(config.http_retry_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

/// Run `op`, retrying transient failures with doubling delay
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    let mut delay = policy.initial_delay;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    target: "PROVIDERS",
                    "{} failed: {} - retrying in {:?} (attempt {}/{})",
                    label,
                    e,
                    delay,
                    attempt,
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Shared HTTP client for all providers
pub fn build_http_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .user_agent(USER_AGENT)
        .build()
}

/// Send a request and decode its JSON body, recording the call in metrics
pub(crate) async fn send_json<T: DeserializeOwned>(
    endpoint: &'static str,
    request: reqwest::RequestBuilder,
    metrics: &MetricsService,
) -> Result<T, ProviderError> {
    let started = Instant::now();

    let result = match request.send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                response
                    .json::<T>()
                    .await
                    .map_err(|e| ProviderError::Malformed {
                        endpoint,
                        detail: e.to_string(),
                    })
            } else {
                Err(ProviderError::from_status(endpoint, status.as_u16()))
            }
        }
        Err(e) => Err(ProviderError::from_reqwest(endpoint, e)),
    };

    let status_label = match &result {
        Ok(_) => "ok",
        Err(ProviderError::Timeout { .. }) => "timeout",
        Err(ProviderError::RateLimited { .. }) => "rate_limited",
        Err(ProviderError::Malformed { .. }) => "malformed",
        Err(_) => "error",
    };
    metrics.record_provider_call(endpoint, status_label, started.elapsed());

    result
}

/// Solana addresses are base58-encoded 32-byte keys
pub fn is_valid_address(address: &str) -> bool {
    matches!(bs58::decode(address).into_vec(), Ok(bytes) if bytes.len() == 32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&quick_policy(3), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::RateLimited { endpoint: "test" })
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&quick_policy(2), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Timeout { endpoint: "test" })
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_responses_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&quick_policy(5), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Malformed {
                endpoint: "test",
                detail: "no data".into(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn address_validation() {
        assert!(is_valid_address("So11111111111111111111111111111111111111112"));
        assert!(is_valid_address("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"));
        assert!(!is_valid_address("not-an-address"));
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("abc"));
    }
}
