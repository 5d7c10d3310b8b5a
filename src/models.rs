//! Domain records passed between the monitor stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Point-in-time view of a qualifying token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub contract_address: String,
    pub symbol: String,
    pub name: String,
    pub market_cap: f64,
    pub price: f64,
    pub volume_1h: f64,
    pub captured_at: DateTime<Utc>,
}

impl TokenSnapshot {
    /// Non-empty identity, finite non-negative price and market cap
    pub fn is_valid(&self) -> bool {
        !self.contract_address.is_empty()
            && self.price.is_finite()
            && self.price >= 0.0
            && self.market_cap.is_finite()
            && self.market_cap >= 0.0
    }
}

/// Threshold policy deciding whether an address is low-activity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuspicionPolicy {
    pub max_tx_count_7d: u32,
    pub max_tx_count_30d: u32,
}

impl Default for SuspicionPolicy {
    fn default() -> Self {
        Self {
            max_tx_count_7d: 50,
            max_tx_count_30d: 50,
        }
    }
}

/// Raw activity returned by the activity provider for one address
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityReport {
    pub tx_count_7d: u32,
    pub tx_count_30d: u32,
    pub touched_tokens: Vec<String>,
    pub held_value_usd: HashMap<String, f64>,
    pub token_symbols: HashMap<String, String>,
}

/// Trading profile of one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressProfile {
    pub address: String,
    pub tx_count_7d: u32,
    pub tx_count_30d: u32,
    pub touched_tokens: BTreeSet<String>,
    pub held_value_usd: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub token_symbols: HashMap<String, String>,
    /// Watch-list tokens this address touched
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub watched_tokens: BTreeSet<String>,
}

impl AddressProfile {
    pub fn from_report(address: impl Into<String>, report: ActivityReport) -> Self {
        let touched_tokens = report
            .touched_tokens
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            address: address.into(),
            tx_count_7d: report.tx_count_7d,
            tx_count_30d: report.tx_count_30d,
            touched_tokens,
            held_value_usd: report.held_value_usd,
            token_symbols: report.token_symbols,
            watched_tokens: BTreeSet::new(),
        }
    }

    /// Record which of `watch_list` this address touched
    pub fn match_watch_list(&mut self, watch_list: &BTreeSet<String>) {
        self.watched_tokens = watch_list
            .iter()
            .filter(|token| self.touched(token))
            .cloned()
            .collect();
    }

    /// Low activity in either window
    pub fn is_suspicious(&self, policy: &SuspicionPolicy) -> bool {
        self.tx_count_7d < policy.max_tx_count_7d || self.tx_count_30d < policy.max_tx_count_30d
    }

    /// USD value this address holds of `token`, zero when unknown
    pub fn held_value(&self, token: &str) -> f64 {
        self.held_value_usd
            .get(token)
            .copied()
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(0.0)
    }

    pub fn touched(&self, token: &str) -> bool {
        self.touched_tokens.contains(token)
    }
}

/// One commonly-held token among the suspicious addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub token: String,
    pub symbol: Option<String>,
    pub supporting_addresses: Vec<String>,
    pub total_value_usd: f64,
}

impl ClusterEntry {
    pub fn address_count(&self) -> usize {
        self.supporting_addresses.len()
    }
}

/// Group of addresses sharing several tokens; diagnostic only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCluster {
    pub addresses: Vec<String>,
    pub common_tokens: Vec<String>,
    pub score: usize,
}

/// Cluster analysis outcome for one candidate token
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterResult {
    pub candidate: String,
    pub entries: Vec<ClusterEntry>,
    pub groups: Vec<GroupCluster>,
}

impl ClusterResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, token: &str) -> Option<&ClusterEntry> {
        self.entries.iter().find(|e| e.token == token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.get(token).is_some()
    }
}

/// Low-activity counts over every successfully profiled trader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub profiled: usize,
    pub low_7d: usize,
    pub low_30d: usize,
}

impl ActivityStats {
    pub fn from_profiles<'a>(
        profiles: impl IntoIterator<Item = &'a AddressProfile>,
        policy: &SuspicionPolicy,
    ) -> Self {
        profiles
            .into_iter()
            .fold(ActivityStats::default(), |mut stats, profile| {
                stats.profiled += 1;
                if profile.tx_count_7d < policy.max_tx_count_7d {
                    stats.low_7d += 1;
                }
                if profile.tx_count_30d < policy.max_tx_count_30d {
                    stats.low_30d += 1;
                }
                stats
            })
    }

    /// Share of profiled traders that were low-activity in the 7d window
    pub fn low_7d_pct(&self) -> f64 {
        percent(self.low_7d, self.profiled)
    }

    pub fn low_30d_pct(&self) -> f64 {
        percent(self.low_30d, self.profiled)
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Cabal alert produced for one candidate in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CabalAlert {
    pub token: TokenSnapshot,
    pub previous_price: f64,
    pub price_increase_pct: f64,
    pub suspicious: Vec<AddressProfile>,
    pub activity: ActivityStats,
    pub cluster: ClusterResult,
    /// Watch-list tokens touched by any profiled trader, sorted
    #[serde(default)]
    pub watched_tokens: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Operator-facing status of the monitor loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub running: bool,
    pub tracked_tokens: usize,
    pub previous_tokens: usize,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub alerts_delivered: u64,
    pub price_threshold: f64,
    pub snapshot_interval_secs: u64,
}
