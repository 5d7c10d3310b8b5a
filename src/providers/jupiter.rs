//! Jupiter top-traded feed - supplies qualifying low-cap token snapshots

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{send_json, with_retry, RetryPolicy, TokenFeed};
use crate::config::Config;
use crate::error::ProviderError;
use crate::models::TokenSnapshot;
use crate::utils::MetricsService;

const ENDPOINT: &str = "jupiter_toptraded";
const TIME_FRAME: &str = "1h";
/// A full page; anything shorter is the last one
const PAGE_SIZE: usize = 50;
const MAX_PAGES: usize = 10;
const PAGE_DELAY: Duration = Duration::from_secs(1);

/// Qualification bounds applied to every pool the feed returns
#[derive(Debug, Clone)]
pub struct FeedFilters {
    pub min_market_cap: f64,
    pub max_market_cap: f64,
    pub min_volume_1h: f64,
    pub min_age_minutes: i64,
}

impl FeedFilters {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_market_cap: config.min_market_cap,
            max_market_cap: config.max_market_cap,
            min_volume_1h: config.min_volume_1h,
            min_age_minutes: config.min_age_minutes,
        }
    }

    /// Market cap within bounds (inclusive), enough 1h volume, old enough.
    /// A token without a creation time is treated as brand new.
    pub fn admits(
        &self,
        market_cap: f64,
        volume_1h: f64,
        created_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let age_ok = created_at
            .map(|created| (now - created).num_minutes() >= self.min_age_minutes)
            .unwrap_or(self.min_age_minutes <= 0);

        age_ok
            && market_cap >= self.min_market_cap
            && market_cap <= self.max_market_cap
            && volume_1h >= self.min_volume_1h
    }
}

/// Pools stay raw so one bad entry cannot sink the page
#[derive(Debug, Deserialize)]
struct TopTradedResponse {
    #[serde(default)]
    pools: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolEntry {
    base_asset: Option<BaseAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BaseAsset {
    id: Option<String>,
    symbol: Option<String>,
    name: Option<String>,
    mcap: Option<f64>,
    usd_price: Option<f64>,
    first_pool: Option<FirstPool>,
    #[serde(rename = "stats1h")]
    stats_1h: Option<WindowStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirstPool {
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WindowStats {
    buy_volume: Option<f64>,
    sell_volume: Option<f64>,
}

impl WindowStats {
    fn total(&self) -> Option<f64> {
        match (self.buy_volume, self.sell_volume) {
            (None, None) => None,
            (buy, sell) => Some(buy.unwrap_or(0.0) + sell.unwrap_or(0.0)),
        }
    }
}

/// 1h volume of a raw pool entry, used as the paging cursor
fn pool_volume(pool: &Value) -> Option<f64> {
    let stats = pool.get("baseAsset")?.get("stats1h")?.clone();
    serde_json::from_value::<WindowStats>(stats).ok()?.total()
}

/// `maxVolume1h` for the page after `pools`, or None when paging is done
fn next_cursor(pools: &[Value], min_volume: f64) -> Option<f64> {
    if pools.len() < PAGE_SIZE {
        return None;
    }
    let last = pool_volume(pools.last()?)?;
    (last > min_volume).then(|| last - 1.0)
}

/// Pool entry after presence checks
struct ParsedAsset {
    snapshot: TokenSnapshot,
    created_at: Option<DateTime<Utc>>,
}

impl BaseAsset {
    fn parse(self, captured_at: DateTime<Utc>) -> Result<ParsedAsset, String> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "missing id".to_string())?;
        let price = self
            .usd_price
            .ok_or_else(|| format!("{}: missing usdPrice", id))?;
        let market_cap = self.mcap.ok_or_else(|| format!("{}: missing mcap", id))?;

        let volume_1h = self
            .stats_1h
            .and_then(|s| s.total())
            .unwrap_or(0.0);

        let created_at = self
            .first_pool
            .and_then(|p| p.created_at)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let symbol = self.symbol.unwrap_or_else(|| id.chars().take(8).collect());

        Ok(ParsedAsset {
            snapshot: TokenSnapshot {
                name: self.name.unwrap_or_else(|| symbol.clone()),
                symbol,
                contract_address: id,
                market_cap,
                price,
                volume_1h,
                captured_at,
            },
            created_at,
        })
    }
}

/// Token feed backed by Jupiter's top-traded pools
pub struct JupiterFeed {
    client: reqwest::Client,
    base_url: String,
    filters: FeedFilters,
    retry: RetryPolicy,
    metrics: Arc<MetricsService>,
}

impl JupiterFeed {
    pub fn new(config: &Config, client: reqwest::Client, metrics: Arc<MetricsService>) -> Self {
        let filters = FeedFilters::from_config(config);

        info!(
            target: "FEED",
            "Filters: mcap ${:.0}-${:.0}, 1h volume >= ${:.0}, age >= {} min",
            filters.min_market_cap,
            filters.max_market_cap,
            filters.min_volume_1h,
            filters.min_age_minutes
        );

        Self {
            client,
            base_url: config.jupiter_api_url.trim_end_matches('/').to_string(),
            filters,
            retry: RetryPolicy::from_config(config),
            metrics,
        }
    }

    async fn fetch_page(&self, max_volume: Option<f64>) -> Result<TopTradedResponse, ProviderError> {
        let url = format!("{}/v1/pools/toptraded/{}", self.base_url, TIME_FRAME);
        let mut query = vec![
            ("minMcap", self.filters.min_market_cap.to_string()),
            ("maxMcap", self.filters.max_market_cap.to_string()),
            ("minVolume1h", self.filters.min_volume_1h.to_string()),
        ];
        if let Some(max) = max_volume {
            query.push(("maxVolume1h", max.to_string()));
        }
        let request = self.client.get(&url).query(&query);
        send_json(ENDPOINT, request, &self.metrics).await
    }

    /// Walk pages by descending 1h volume until a short page, the volume floor or the page cap
    async fn fetch_pools(&self) -> Result<Vec<Value>, ProviderError> {
        let mut pools = Vec::new();
        let mut max_volume = None;

        for page in 1..=MAX_PAGES {
            let batch = match with_retry(&self.retry, "jupiter toptraded", || {
                self.fetch_page(max_volume)
            })
            .await
            {
                Ok(response) => response.pools,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!(target: "FEED", "Page {} failed, keeping {} pools: {}", page, pools.len(), e);
                    break;
                }
            };

            let cursor = next_cursor(&batch, self.filters.min_volume_1h);
            debug!(target: "FEED", "Page {}: {} pools", page, batch.len());
            pools.extend(batch);

            match cursor {
                Some(next) if page < MAX_PAGES => {
                    max_volume = Some(next);
                    tokio::time::sleep(PAGE_DELAY).await;
                }
                _ => break,
            }
        }

        Ok(pools)
    }

    fn qualify(&self, pools: Vec<Value>, now: DateTime<Utc>) -> Vec<TokenSnapshot> {
        let total = pools.len();
        let mut seen = HashSet::new();
        let mut qualified = Vec::new();

        for raw in pools {
            let pool: PoolEntry = match serde_json::from_value(raw) {
                Ok(pool) => pool,
                Err(e) => {
                    warn!(target: "FEED", "Undecodable pool entry discarded: {}", e);
                    continue;
                }
            };
            let Some(asset) = pool.base_asset else {
                warn!(target: "FEED", "Pool entry without baseAsset, skipped");
                continue;
            };

            match asset.parse(now) {
                Ok(parsed) => {
                    let snap = &parsed.snapshot;
                    if self
                        .filters
                        .admits(snap.market_cap, snap.volume_1h, parsed.created_at, now)
                        && seen.insert(snap.contract_address.clone())
                    {
                        qualified.push(parsed.snapshot);
                    }
                }
                Err(reason) => warn!(target: "FEED", "Malformed pool entry discarded: {}", reason),
            }
        }

        debug!(target: "FEED", "{} of {} tokens qualified", qualified.len(), total);
        qualified
    }
}

#[async_trait]
impl TokenFeed for JupiterFeed {
    async fn fetch_qualifying_tokens(&self) -> Result<Vec<TokenSnapshot>, ProviderError> {
        let pools = self.fetch_pools().await?;
        Ok(self.qualify(pools, Utc::now()))
    }
}
