//! Address Profiler - profiles the recent traders of a candidate token

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ProviderError;
use crate::models::{ActivityStats, AddressProfile, SuspicionPolicy};
use crate::providers::{ActivitySource, TraderSource};
use crate::utils::shorten_address;
use crate::utils::worker_pool::{TaskOutcome, WorkerPool};

/// Profiler settings
#[derive(Debug, Clone)]
pub struct ProfilerSettings {
    pub trader_fetch_limit: usize,
    pub concurrency: usize,
    pub per_address_timeout: Duration,
    pub policy: SuspicionPolicy,
    pub min_suspicious_addresses: usize,
    /// Configured cabal tokens to look for in every trader's history
    pub watch_list: BTreeSet<String>,
}

impl ProfilerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            trader_fetch_limit: config.trader_fetch_limit,
            concurrency: config.worker_pool_size,
            per_address_timeout: Duration::from_secs(config.per_address_timeout_secs),
            policy: SuspicionPolicy {
                max_tx_count_7d: config.max_tx_count_7d,
                max_tx_count_30d: config.max_tx_count_30d,
            },
            min_suspicious_addresses: config.min_suspicious_addresses,
            watch_list: config.cabal_tokens.iter().cloned().collect(),
        }
    }
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            trader_fetch_limit: 100,
            concurrency: 5,
            per_address_timeout: Duration::from_secs(15),
            policy: SuspicionPolicy::default(),
            min_suspicious_addresses: 5,
            watch_list: BTreeSet::new(),
        }
    }
}

/// Why an address has no profile this cycle
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Failed(String),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAddress {
    pub address: String,
    pub reason: SkipReason,
}

/// Profiles of one candidate's traders, split by classification.
/// Both lists are ordered by address.
#[derive(Debug, Clone, Default)]
pub struct TraderProfiles {
    pub universe_size: usize,
    pub suspicious: Vec<AddressProfile>,
    pub organic: Vec<AddressProfile>,
    pub skipped: Vec<SkippedAddress>,
    pub stats: ActivityStats,
    /// Watch-list tokens touched by any profiled trader
    pub watched_tokens: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub enum ProfilingOutcome {
    /// Trader source returned nothing usable
    NoTraders,
    /// Fewer suspicious addresses than required; the candidate is dropped
    Insufficient(TraderProfiles),
    Qualified(TraderProfiles),
    /// Stop was requested while profiling
    Cancelled,
}

/// Fetches a candidate's traders and profiles each one through the worker pool
pub struct AddressProfiler {
    traders: Arc<dyn TraderSource>,
    activity: Arc<dyn ActivitySource>,
    pool: WorkerPool,
    settings: ProfilerSettings,
}

impl AddressProfiler {
    pub fn new(
        traders: Arc<dyn TraderSource>,
        activity: Arc<dyn ActivitySource>,
        settings: ProfilerSettings,
    ) -> Self {
        let pool = WorkerPool::new(settings.concurrency, settings.per_address_timeout);
        Self {
            traders,
            activity,
            pool,
            settings,
        }
    }

    /// Profile every distinct trader of `token`.
    /// Only the trader fetch itself is fatal; per-address failures become skips.
    pub async fn profile(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<ProfilingOutcome, ProviderError> {
        let raw = self
            .traders
            .fetch_traders(token, self.settings.trader_fetch_limit)
            .await?;

        let universe: BTreeSet<String> = raw.into_iter().filter(|a| !a.is_empty()).collect();
        if universe.is_empty() {
            debug!(target: "PROFILER", "No traders found for {}", shorten_address(token, 4));
            return Ok(ProfilingOutcome::NoTraders);
        }

        debug!(
            target: "PROFILER",
            "Profiling {} traders of {} with {} workers",
            universe.len(),
            shorten_address(token, 4),
            self.pool.size()
        );

        let mut batch = self.pool.batch(cancel.clone());
        for address in &universe {
            let activity = Arc::clone(&self.activity);
            let target = address.clone();
            batch
                .submit(address.clone(), async move { activity.fetch_activity(&target).await })
                .await;
        }
        let results = batch.await_all().await;

        if cancel.is_cancelled() {
            return Ok(ProfilingOutcome::Cancelled);
        }

        let mut profiles = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for (address, outcome) in results {
            match outcome {
                TaskOutcome::Completed(report) => {
                    let mut profile = AddressProfile::from_report(address, report);
                    profile.match_watch_list(&self.settings.watch_list);
                    profiles.push(profile);
                }
                TaskOutcome::Failed(reason) => {
                    debug!(
                        target: "PROFILER",
                        "Skipping {}: {}",
                        shorten_address(&address, 4),
                        reason
                    );
                    skipped.push(SkippedAddress {
                        address,
                        reason: SkipReason::Failed(reason),
                    });
                }
                TaskOutcome::TimedOut => {
                    debug!(target: "PROFILER", "Skipping {}: timed out", shorten_address(&address, 4));
                    skipped.push(SkippedAddress {
                        address,
                        reason: SkipReason::TimedOut,
                    });
                }
                TaskOutcome::Cancelled => skipped.push(SkippedAddress {
                    address,
                    reason: SkipReason::Cancelled,
                }),
            }
        }

        // Completion order is arbitrary; sort before partitioning
        profiles.sort_by(|a, b| a.address.cmp(&b.address));
        skipped.sort_by(|a, b| a.address.cmp(&b.address));

        let policy = self.settings.policy;
        let stats = ActivityStats::from_profiles(&profiles, &policy);
        let watched_tokens: BTreeSet<String> = profiles
            .iter()
            .flat_map(|p| p.watched_tokens.iter().cloned())
            .collect();
        let (suspicious, organic): (Vec<_>, Vec<_>) =
            profiles.into_iter().partition(|p| p.is_suspicious(&policy));

        info!(
            target: "PROFILER",
            "{}: {} traders, {} suspicious, {} organic, {} skipped",
            shorten_address(token, 4),
            universe.len(),
            suspicious.len(),
            organic.len(),
            skipped.len()
        );

        let profiles = TraderProfiles {
            universe_size: universe.len(),
            suspicious,
            organic,
            skipped,
            stats,
            watched_tokens,
        };

        if profiles.suspicious.len() < self.settings.min_suspicious_addresses {
            Ok(ProfilingOutcome::Insufficient(profiles))
        } else {
            Ok(ProfilingOutcome::Qualified(profiles))
        }
    }
}
