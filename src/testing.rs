//! In-memory collaborators for unit tests

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{ProviderError, SinkError};
use crate::models::{ActivityReport, AddressProfile, CabalAlert, TokenSnapshot};
use crate::providers::{ActivitySource, TokenFeed, TraderSource};
use crate::utils::alerts::NotificationSink;

pub fn snapshot(id: &str, price: f64) -> TokenSnapshot {
    TokenSnapshot {
        contract_address: id.to_string(),
        symbol: id.to_string(),
        name: format!("{} token", id),
        market_cap: 20_000.0,
        price,
        volume_1h: 1_000.0,
        captured_at: Utc::now(),
    }
}

/// Report touching every token in `holdings` with the given USD value
pub fn activity(tx_7d: u32, tx_30d: u32, holdings: &[(&str, f64)]) -> ActivityReport {
    ActivityReport {
        tx_count_7d: tx_7d,
        tx_count_30d: tx_30d,
        touched_tokens: holdings.iter().map(|(t, _)| t.to_string()).collect(),
        held_value_usd: holdings.iter().map(|(t, v)| (t.to_string(), *v)).collect(),
        token_symbols: HashMap::new(),
    }
}

pub fn profile(address: &str, tx_7d: u32, tx_30d: u32, holdings: &[(&str, f64)]) -> AddressProfile {
    AddressProfile::from_report(address, activity(tx_7d, tx_30d, holdings))
}

/// Feed returning one scripted batch per call; `None` is a failed fetch.
/// Once the script runs out it keeps returning the last successful batch.
pub struct ScriptedFeed {
    script: Mutex<VecDeque<Option<Vec<TokenSnapshot>>>>,
    last: Mutex<Vec<TokenSnapshot>>,
    calls: AtomicUsize,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(script: Vec<Option<Vec<TokenSnapshot>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Every fetch takes `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Most fetches ever running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenFeed for ScriptedFeed {
    async fn fetch_qualifying_tokens(&self) -> Result<Vec<TokenSnapshot>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let step = self.script.lock().pop_front();
        match step {
            Some(Some(batch)) => {
                *self.last.lock() = batch.clone();
                Ok(batch)
            }
            Some(None) => Err(ProviderError::Status {
                endpoint: "scripted_feed",
                status: 503,
            }),
            None => Ok(self.last.lock().clone()),
        }
    }
}

/// Same trader list for every token
pub struct StaticTraders {
    traders: Option<Vec<String>>,
}

impl StaticTraders {
    pub fn new(traders: &[&str]) -> Self {
        Self {
            traders: Some(traders.iter().map(|t| t.to_string()).collect()),
        }
    }

    pub fn failing() -> Self {
        Self { traders: None }
    }
}

#[async_trait]
impl TraderSource for StaticTraders {
    async fn fetch_traders(&self, _token: &str, limit: usize) -> Result<Vec<String>, ProviderError> {
        match &self.traders {
            Some(traders) => Ok(traders.iter().take(limit).cloned().collect()),
            None => Err(ProviderError::Timeout {
                endpoint: "static_traders",
            }),
        }
    }
}

/// Activity keyed by address; unknown addresses are malformed responses
pub struct MapActivity {
    reports: HashMap<String, ActivityReport>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MapActivity {
    pub fn new(reports: Vec<(&str, ActivityReport)>) -> Self {
        Self {
            reports: reports
                .into_iter()
                .map(|(a, r)| (a.to_string(), r))
                .collect(),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivitySource for MapActivity {
    async fn fetch_activity(&self, address: &str) -> Result<ActivityReport, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.reports
            .get(address)
            .cloned()
            .ok_or_else(|| ProviderError::Malformed {
                endpoint: "map_activity",
                detail: format!("no activity for {}", address),
            })
    }
}

/// Sink that keeps every delivered alert
#[derive(Default)]
pub struct CollectingSink {
    alerts: Mutex<Vec<CabalAlert>>,
    fail: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn alerts(&self) -> Vec<CabalAlert> {
        self.alerts.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn deliver(&self, alert: &CabalAlert) -> Result<(), SinkError> {
        self.alerts.lock().push(alert.clone());
        if self.fail {
            return Err(SinkError::Telegram {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(())
    }
}
