//! Configuration module for CabalGuard

use std::env;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::modules::cluster_analyzer::DEFAULT_EXCLUDED_TOKENS;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Data providers
    pub jupiter_api_url: String,
    pub okx_api_url: String,
    pub http_timeout_secs: u64,
    pub http_max_retries: u32,
    pub http_retry_delay_ms: u64,

    // Token feed filters
    pub min_market_cap: f64,
    pub max_market_cap: f64,
    pub min_volume_1h: f64,
    pub min_age_minutes: i64,

    // Monitor loop
    pub price_increase_threshold: f64,
    pub snapshot_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub stop_timeout_secs: u64,
    pub auto_start: bool,

    // Address profiling
    pub max_tx_count_7d: u32,
    pub max_tx_count_30d: u32,
    pub min_suspicious_addresses: usize,
    pub worker_pool_size: usize,
    pub per_address_timeout_secs: u64,
    pub trader_fetch_limit: usize,
    pub token_list_limit: usize,

    // Clustering
    pub cluster_min_addresses: usize,
    pub cluster_min_total_value_usd: f64,
    pub excluded_tokens: Vec<String>,
    pub require_cluster_match: bool,
    /// Watch list reported on every alert whose traders touched one of them
    pub cabal_tokens: Vec<String>,

    // Telegram Alerts
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_topic_id: Option<i64>,
    pub alert_cooldown_secs: u64,
    pub max_alerts_per_minute: u32,

    // Dashboard
    pub dashboard_port: u16,
}

impl Config {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str, default: bool| {
            var(key)
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(default)
        };

        Self {
            jupiter_api_url: var("JUPITER_API_URL").unwrap_or_else(|| "https://datapi.jup.ag".to_string()),
            okx_api_url: var("OKX_API_URL").unwrap_or_else(|| "https://web3.okx.com".to_string()),
            http_timeout_secs: parse_or(var("HTTP_TIMEOUT_SECS"), 10),
            http_max_retries: parse_or(var("HTTP_MAX_RETRIES"), 3),
            http_retry_delay_ms: parse_or(var("HTTP_RETRY_DELAY_MS"), 500),

            min_market_cap: parse_or(var("MIN_MARKET_CAP"), 10_000.0),
            max_market_cap: parse_or(var("MAX_MARKET_CAP"), 30_000.0),
            min_volume_1h: parse_or(var("MIN_VOLUME_1H"), 500.0),
            min_age_minutes: parse_or(var("MIN_AGE_MINUTES"), 720),

            price_increase_threshold: parse_or(var("PRICE_INCREASE_THRESHOLD"), 20.0),
            snapshot_interval_secs: parse_or(var("SNAPSHOT_INTERVAL_SECS"), 20),
            error_backoff_secs: parse_or(var("ERROR_BACKOFF_SECS"), 60),
            stop_timeout_secs: parse_or(var("STOP_TIMEOUT_SECS"), 10),
            auto_start: flag("AUTO_START", true),

            max_tx_count_7d: parse_or(var("MAX_TX_COUNT_7D"), 50),
            max_tx_count_30d: parse_or(var("MAX_TX_COUNT_30D"), 50),
            min_suspicious_addresses: parse_or(var("MIN_SUSPICIOUS_ADDRESSES"), 5),
            worker_pool_size: parse_or(var("WORKER_POOL_SIZE"), 5),
            per_address_timeout_secs: parse_or(var("PER_ADDRESS_TIMEOUT_SECS"), 15),
            trader_fetch_limit: parse_or(var("TRADER_FETCH_LIMIT"), 100),
            token_list_limit: parse_or(var("TOKEN_LIST_LIMIT"), 100),

            cluster_min_addresses: parse_or(var("CLUSTER_MIN_ADDRESSES"), 3),
            cluster_min_total_value_usd: parse_or(var("CLUSTER_MIN_TOTAL_VALUE_USD"), 10_000.0),
            excluded_tokens: var("EXCLUDED_TOKENS")
                .map(|v| parse_list(&v))
                .unwrap_or_else(|| DEFAULT_EXCLUDED_TOKENS.iter().map(|t| t.to_string()).collect()),
            require_cluster_match: flag("REQUIRE_CLUSTER_MATCH", false),
            cabal_tokens: var("CABAL_TOKENS").map(|v| parse_list(&v)).unwrap_or_default(),

            telegram_bot_token: var("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: var("TELEGRAM_CHAT_ID"),
            telegram_topic_id: var("TELEGRAM_TOPIC_ID").and_then(|v| v.trim().parse().ok()),
            alert_cooldown_secs: parse_or(var("ALERT_COOLDOWN_SECS"), 0),
            max_alerts_per_minute: parse_or(var("MAX_ALERTS_PER_MINUTE"), 10),

            dashboard_port: parse_or(var("DASHBOARD_PORT"), 3000),
        }
    }

    /// Reject combinations the monitor cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !non_negative(self.min_market_cap) {
            return Err(ConfigError::new("MIN_MARKET_CAP", "must be a non-negative number"));
        }
        if !non_negative(self.max_market_cap) || self.max_market_cap < self.min_market_cap {
            return Err(ConfigError::new(
                "MAX_MARKET_CAP",
                format!("{} is below MIN_MARKET_CAP {}", self.max_market_cap, self.min_market_cap),
            ));
        }
        if !non_negative(self.min_volume_1h) {
            return Err(ConfigError::new("MIN_VOLUME_1H", "must be a non-negative number"));
        }
        if !non_negative(self.price_increase_threshold) {
            return Err(ConfigError::new(
                "PRICE_INCREASE_THRESHOLD",
                "must be a non-negative percentage",
            ));
        }
        if !non_negative(self.cluster_min_total_value_usd) {
            return Err(ConfigError::new(
                "CLUSTER_MIN_TOTAL_VALUE_USD",
                "must be a non-negative number",
            ));
        }
        if self.snapshot_interval_secs == 0 {
            return Err(ConfigError::new("SNAPSHOT_INTERVAL_SECS", "must be at least 1"));
        }
        if self.worker_pool_size == 0 {
            return Err(ConfigError::new("WORKER_POOL_SIZE", "must be at least 1"));
        }
        if self.per_address_timeout_secs == 0 {
            return Err(ConfigError::new("PER_ADDRESS_TIMEOUT_SECS", "must be at least 1"));
        }
        if self.trader_fetch_limit == 0 {
            return Err(ConfigError::new("TRADER_FETCH_LIMIT", "must be at least 1"));
        }
        if self.cluster_min_addresses == 0 {
            return Err(ConfigError::new("CLUSTER_MIN_ADDRESSES", "must be at least 1"));
        }
        Ok(())
    }

    pub fn telegram_enabled(&self) -> bool {
        self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some()
    }
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Comma-separated list, blanks dropped
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
