//! OKX DEX client - recent traders of a token and per-address activity

use async_trait::async_trait;
use chrono::Utc;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{is_valid_address, send_json, with_retry, ActivitySource, RetryPolicy, TraderSource};
use crate::config::Config;
use crate::error::ProviderError;
use crate::models::ActivityReport;
use crate::utils::{shorten_address, MetricsService};

const TRADES_ENDPOINT: &str = "okx_trading_history";
const SUMMARY_ENDPOINT: &str = "okx_wallet_summary";
const TOKENS_ENDPOINT: &str = "okx_token_list";

const SOLANA_CHAIN_ID: &str = "501";

/// OKX wallet-profile period codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Period {
    SevenDays,
    ThirtyDays,
}

impl Period {
    fn code(self) -> &'static str {
        match self {
            Period::SevenDays => "3",
            Period::ThirtyDays => "4",
        }
    }
}

// ============================================
// RESPONSE SHAPES
// ============================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default, deserialize_with = "lenient_i64")]
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self, endpoint: &'static str) -> Result<T, ProviderError> {
        if self.code != 0 {
            return Err(ProviderError::Api {
                endpoint,
                code: self.code,
                message: self.msg.unwrap_or_default(),
            });
        }
        self.data.ok_or_else(|| ProviderError::Malformed {
            endpoint,
            detail: "missing data field".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TradingHistory {
    #[serde(default)]
    list: Vec<TradeRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeRecord {
    user_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletSummary {
    #[serde(default, deserialize_with = "lenient_u32")]
    total_txs_buy: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    total_txs_sell: u32,
}

impl WalletSummary {
    fn total(&self) -> u32 {
        self.total_txs_buy.saturating_add(self.total_txs_sell)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenList {
    #[serde(default)]
    token_list: Vec<TokenListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenListEntry {
    token_contract_address: Option<String>,
    token_symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    balance_usd: f64,
}

/// Numbers arrive either as JSON numbers or numeric strings
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(0.0),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom("number out of range")),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(0.0),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("not a number: {}", s))),
        other => Err(D::Error::custom(format!("unexpected value: {}", other))),
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    lenient_number(deserializer)
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = lenient_number(deserializer)?;
    Ok(value.clamp(0.0, u32::MAX as f64) as u32)
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(lenient_number(deserializer)? as i64)
}

// ============================================
// PARSING
// ============================================

/// Distinct valid trader addresses in first-seen order
fn parse_traders(history: TradingHistory, token: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut traders = Vec::new();

    for record in history.list {
        let Some(address) = record.user_address.filter(|a| !a.is_empty()) else {
            continue;
        };
        if !is_valid_address(&address) {
            warn!(
                target: "OKX",
                "Discarding malformed trader address '{}' for token {}",
                address,
                token
            );
            continue;
        }
        if seen.insert(address.clone()) {
            traders.push(address);
        }
    }

    traders
}

fn build_activity(week: &WalletSummary, month: &WalletSummary, tokens: TokenList) -> ActivityReport {
    let mut report = ActivityReport {
        tx_count_7d: week.total(),
        tx_count_30d: month.total(),
        ..Default::default()
    };

    for entry in tokens.token_list {
        let Some(contract) = entry.token_contract_address.filter(|c| !c.is_empty()) else {
            continue;
        };
        if entry.balance_usd.is_finite() && entry.balance_usd > 0.0 {
            *report.held_value_usd.entry(contract.clone()).or_insert(0.0) += entry.balance_usd;
        }
        if let Some(symbol) = entry.token_symbol.filter(|s| !s.is_empty()) {
            report.token_symbols.entry(contract.clone()).or_insert(symbol);
        }
        report.touched_tokens.push(contract);
    }

    report
}

// ============================================
// CLIENT
// ============================================

/// OKX web API client implementing both trader and activity lookups
pub struct OkxClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    token_list_limit: usize,
    metrics: Arc<MetricsService>,
}

impl OkxClient {
    pub fn new(config: &Config, client: reqwest::Client, metrics: Arc<MetricsService>) -> Self {
        Self {
            client,
            base_url: config.okx_api_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from_config(config),
            token_list_limit: config.token_list_limit,
            metrics,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/priapi/v1/dx/market/v2/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = self.url(path);
        let envelope: Envelope<T> = with_retry(&self.retry, endpoint, || {
            send_json(endpoint, self.client.get(&url).query(query), &self.metrics)
        })
        .await?;
        envelope.into_data(endpoint)
    }

    async fn wallet_summary(&self, address: &str, period: Period) -> Result<WalletSummary, ProviderError> {
        self.get(
            SUMMARY_ENDPOINT,
            "pnl/wallet-profile/summary",
            &[
                ("walletAddress", address.to_string()),
                ("chainId", SOLANA_CHAIN_ID.to_string()),
                ("periodType", period.code().to_string()),
            ],
        )
        .await
    }

    async fn token_list(&self, address: &str) -> Result<TokenList, ProviderError> {
        self.get(
            TOKENS_ENDPOINT,
            "pnl/token-list",
            &[
                ("walletAddress", address.to_string()),
                ("chainId", SOLANA_CHAIN_ID.to_string()),
                ("isAsc", "true".to_string()),
                ("sortType", "1".to_string()),
                ("filterEmptyBalance", "false".to_string()),
                ("offset", "0".to_string()),
                ("limit", self.token_list_limit.to_string()),
                ("t", Utc::now().timestamp_millis().to_string()),
            ],
        )
        .await
    }
}

#[async_trait]
impl TraderSource for OkxClient {
    async fn fetch_traders(&self, token: &str, limit: usize) -> Result<Vec<String>, ProviderError> {
        let url = format!(
            "{}?t={}",
            self.url("trading-history/filter-list"),
            Utc::now().timestamp_millis()
        );
        let payload = serde_json::json!({
            "desc": true,
            "orderBy": "timestamp",
            "limit": limit,
            "tradingHistoryFilter": {
                "chainId": SOLANA_CHAIN_ID,
                "tokenContractAddress": token,
                "type": "0",
                "currentUserWalletAddress": "",
                "userAddressList": [],
                "volumeMin": "",
                "volumeMax": "",
                "priceMin": "",
                "priceMax": "",
                "amountMin": "",
                "amountMax": ""
            }
        });

        let envelope: Envelope<TradingHistory> = with_retry(&self.retry, TRADES_ENDPOINT, || {
            send_json(
                TRADES_ENDPOINT,
                self.client.post(&url).json(&payload),
                &self.metrics,
            )
        })
        .await?;

        let traders = parse_traders(envelope.into_data(TRADES_ENDPOINT)?, token);
        debug!(
            target: "OKX",
            "{} distinct traders for {}",
            traders.len(),
            shorten_address(token, 4)
        );
        Ok(traders)
    }
}

#[async_trait]
impl ActivitySource for OkxClient {
    async fn fetch_activity(&self, address: &str) -> Result<ActivityReport, ProviderError> {
        let (week, month, tokens) = tokio::try_join!(
            self.wallet_summary(address, Period::SevenDays),
            self.wallet_summary(address, Period::ThirtyDays),
            self.token_list(address),
        )?;

        Ok(build_activity(&week, &month, tokens))
    }
}

/// Symbol fallback for well-known mints
pub fn known_symbol(mint: &str) -> Option<&'static str> {
    match mint {
        "So11111111111111111111111111111111111111112" => Some("SOL"),
        "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v" => Some("USDC"),
        "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB" => Some("USDT"),
        _ => None,
    }
}
