//! Monitor Loop - drives fetch → snapshot → compare → profile → cluster → alert

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::MonitorError;
use crate::models::MonitorStatus;
use crate::modules::address_profiler::{AddressProfiler, ProfilerSettings, ProfilingOutcome};
use crate::modules::alert_assembler::assemble;
use crate::modules::cluster_analyzer::{ClusterAnalyzer, ClusterSettings};
use crate::modules::price_detector::{Candidate, PriceChangeDetector};
use crate::modules::snapshot_store::SnapshotStore;
use crate::providers::{ActivitySource, TokenFeed, TraderSource};
use crate::utils::alerts::NotificationSink;
use crate::utils::{shorten_address, MetricsService};

/// Loop timing and gating
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub snapshot_interval: Duration,
    pub error_backoff: Duration,
    pub stop_timeout: Duration,
    pub price_increase_threshold: f64,
    pub require_cluster_match: bool,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            snapshot_interval: Duration::from_secs(config.snapshot_interval_secs),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            stop_timeout: Duration::from_secs(config.stop_timeout_secs),
            price_increase_threshold: config.price_increase_threshold,
            require_cluster_match: config.require_cluster_match,
        }
    }
}

/// External collaborators injected at startup
pub struct Collaborators {
    pub feed: Arc<dyn TokenFeed>,
    pub traders: Arc<dyn TraderSource>,
    pub activity: Arc<dyn ActivitySource>,
    pub sink: Arc<dyn NotificationSink>,
    pub metrics: Arc<MetricsService>,
}

/// Why a candidate produced no delivered alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    NoTraders,
    TraderFetch,
    InsufficientSuspicious,
    NoCluster,
    InvalidAlert,
    SinkError,
}

impl DiscardReason {
    pub fn label(self) -> &'static str {
        match self {
            DiscardReason::NoTraders => "no_traders",
            DiscardReason::TraderFetch => "trader_fetch",
            DiscardReason::InsufficientSuspicious => "insufficient_suspicious",
            DiscardReason::NoCluster => "no_cluster",
            DiscardReason::InvalidAlert => "invalid",
            DiscardReason::SinkError => "sink_error",
        }
    }
}

enum CandidateOutcome {
    Delivered,
    Discarded(DiscardReason),
    Cancelled,
}

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub tokens_fetched: usize,
    pub tokens_recorded: usize,
    pub comparable_pairs: usize,
    pub candidates: usize,
    pub alerts_delivered: usize,
    pub discarded: Vec<(String, DiscardReason)>,
}

struct MonitorCore {
    feed: Arc<dyn TokenFeed>,
    sink: Arc<dyn NotificationSink>,
    store: SnapshotStore,
    detector: PriceChangeDetector,
    profiler: AddressProfiler,
    analyzer: ClusterAnalyzer,
    metrics: Arc<MetricsService>,
    settings: MonitorSettings,

    last_cycle_at: RwLock<Option<DateTime<Utc>>>,
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    alerts_delivered: AtomicU64,
}

/// Live driver. Kept until the task has actually exited, so a stop in
/// progress still blocks a new start.
struct RunHandle {
    cancel: CancellationToken,
    /// Cancelled when the driver future is dropped, including on abort
    exited: CancellationToken,
    task: JoinHandle<()>,
}

impl RunHandle {
    fn is_live(&self) -> bool {
        !self.exited.is_cancelled()
    }
}

/// Two-state (Stopped/Running) monitor; clones share the same loop
#[derive(Clone)]
pub struct MonitorLoop {
    core: Arc<MonitorCore>,
    handle: Arc<Mutex<Option<RunHandle>>>,
}

impl MonitorLoop {
    pub fn new(deps: Collaborators, config: &Config) -> Self {
        let settings = MonitorSettings::from_config(config);
        let profiler = AddressProfiler::new(
            deps.traders,
            deps.activity,
            ProfilerSettings::from_config(config),
        );

        let core = MonitorCore {
            feed: deps.feed,
            sink: deps.sink,
            store: SnapshotStore::new(),
            detector: PriceChangeDetector::new(settings.price_increase_threshold),
            profiler,
            analyzer: ClusterAnalyzer::new(ClusterSettings::from_config(config)),
            metrics: deps.metrics,
            settings,
            last_cycle_at: RwLock::new(None),
            cycles_completed: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            alerts_delivered: AtomicU64::new(0),
        };

        Self {
            core: Arc::new(core),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Stopped → Running. Fails while a driver task is live, including one
    /// that is still finishing after a stop request.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut handle = self.handle.lock();
        if let Some(current) = handle.as_ref().filter(|h| h.is_live()) {
            if current.cancel.is_cancelled() {
                warn!(target: "MONITOR", "Start rejected, previous driver still stopping");
                return Err(MonitorError::Stopping);
            }
            warn!(target: "MONITOR", "Already running");
            return Err(MonitorError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let exited = CancellationToken::new();
        let exit_guard = exited.clone().drop_guard();
        let core = Arc::clone(&self.core);
        let driver_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let _exit_guard = exit_guard;
            core.drive(driver_cancel).await;
        });
        *handle = Some(RunHandle {
            cancel,
            exited,
            task,
        });

        self.core.metrics.set_running(true);
        info!(
            target: "MONITOR",
            "Started: threshold {:.1}%, interval {:?}",
            self.core.settings.price_increase_threshold,
            self.core.settings.snapshot_interval
        );
        Ok(())
    }

    /// Running → Stopped. Waits for the current cycle up to the stop timeout,
    /// then aborts. No-op when already stopped.
    pub async fn stop(&self) {
        let live = self
            .handle
            .lock()
            .as_ref()
            .filter(|h| h.is_live())
            .map(|h| (h.cancel.clone(), h.exited.clone(), h.task.abort_handle()));
        let Some((cancel, exited, abort)) = live else {
            debug!(target: "MONITOR", "Stop requested but monitor is not running");
            return;
        };

        cancel.cancel();
        if tokio::time::timeout(self.core.settings.stop_timeout, exited.cancelled())
            .await
            .is_err()
        {
            warn!(
                target: "MONITOR",
                "Cycle did not finish within {:?}, aborting",
                self.core.settings.stop_timeout
            );
            abort.abort();
            exited.cancelled().await;
        }

        info!(target: "MONITOR", "Stopped");
        if !self.is_running() {
            self.core.metrics.set_running(false);
        }
    }

    /// True only while a driver is live and no stop has been requested
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| h.is_live() && !h.cancel.is_cancelled())
    }

    pub fn status(&self) -> MonitorStatus {
        let core = &self.core;
        MonitorStatus {
            running: self.is_running(),
            tracked_tokens: core.store.tracked_count(),
            previous_tokens: core.store.previous_count(),
            last_cycle_at: *core.last_cycle_at.read(),
            cycles_completed: core.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: core.cycles_failed.load(Ordering::Relaxed),
            alerts_delivered: core.alerts_delivered.load(Ordering::Relaxed),
            price_threshold: core.detector.threshold(),
            snapshot_interval_secs: core.settings.snapshot_interval.as_secs(),
        }
    }
}

impl MonitorCore {
    async fn drive(self: Arc<Self>, cancel: CancellationToken) {
        info!(target: "MONITOR", "Cycle driver running");

        while !cancel.is_cancelled() {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(self.run_cycle(&cancel))
                .catch_unwind()
                .await;

            let wait = match outcome {
                Ok(Ok(report)) => {
                    self.cycles_completed.fetch_add(1, Ordering::Relaxed);
                    self.metrics.record_cycle("ok", started.elapsed());
                    debug!(
                        target: "MONITOR",
                        "Cycle done in {:?}: {} fetched, {} recorded, {} comparable, {} candidates, {} alerts",
                        started.elapsed(),
                        report.tokens_fetched,
                        report.tokens_recorded,
                        report.comparable_pairs,
                        report.candidates,
                        report.alerts_delivered
                    );
                    self.settings.snapshot_interval
                }
                Ok(Err(e)) => {
                    self.cycles_failed.fetch_add(1, Ordering::Relaxed);
                    self.metrics.record_cycle("error", started.elapsed());
                    error!(
                        target: "MONITOR",
                        "Cycle failed: {} - retrying in {:?}",
                        e,
                        self.settings.error_backoff
                    );
                    self.settings.error_backoff
                }
                Err(_) => {
                    self.cycles_failed.fetch_add(1, Ordering::Relaxed);
                    self.metrics.record_cycle("panic", started.elapsed());
                    error!(
                        target: "MONITOR",
                        "Cycle panicked - retrying in {:?}",
                        self.settings.error_backoff
                    );
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!(target: "MONITOR", "Cycle driver exited");
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, MonitorError> {
        let tokens = self
            .feed
            .fetch_qualifying_tokens()
            .await
            .map_err(MonitorError::Feed)?;

        self.store.begin_cycle();
        let mut report = CycleReport {
            tokens_fetched: tokens.len(),
            ..Default::default()
        };
        for snapshot in tokens {
            if self.store.record(snapshot) {
                report.tokens_recorded += 1;
            }
        }
        self.metrics.tokens_tracked.set(report.tokens_recorded as f64);

        let pairs = self.store.comparable_pairs();
        report.comparable_pairs = pairs.len();

        let candidates = self.detector.detect(&pairs);
        report.candidates = candidates.len();
        self.metrics.candidates.inc_by(candidates.len() as f64);

        for candidate in &candidates {
            if cancel.is_cancelled() {
                info!(target: "MONITOR", "Stop requested, skipping remaining candidates");
                break;
            }

            match self.process_candidate(candidate, cancel).await {
                CandidateOutcome::Delivered => report.alerts_delivered += 1,
                CandidateOutcome::Discarded(reason) => {
                    self.metrics.record_discard(reason.label());
                    report
                        .discarded
                        .push((candidate.snapshot.contract_address.clone(), reason));
                }
                CandidateOutcome::Cancelled => break,
            }
        }

        *self.last_cycle_at.write() = Some(Utc::now());
        Ok(report)
    }

    async fn process_candidate(
        &self,
        candidate: &Candidate,
        cancel: &CancellationToken,
    ) -> CandidateOutcome {
        let token = &candidate.snapshot;

        let profiles = match self.profiler.profile(&token.contract_address, cancel).await {
            Ok(ProfilingOutcome::Qualified(profiles)) => profiles,
            Ok(ProfilingOutcome::Insufficient(profiles)) => {
                self.metrics.record_profiles(
                    profiles.suspicious.len(),
                    profiles.organic.len(),
                    profiles.skipped.len(),
                );
                info!(
                    target: "MONITOR",
                    "{}: only {} suspicious of {} traders, no alert",
                    token.symbol,
                    profiles.suspicious.len(),
                    profiles.universe_size
                );
                return CandidateOutcome::Discarded(DiscardReason::InsufficientSuspicious);
            }
            Ok(ProfilingOutcome::NoTraders) => {
                return CandidateOutcome::Discarded(DiscardReason::NoTraders);
            }
            Ok(ProfilingOutcome::Cancelled) => return CandidateOutcome::Cancelled,
            Err(source) => {
                let endpoint = source.endpoint();
                let err = MonitorError::Traders {
                    token: token.contract_address.clone(),
                    source,
                };
                warn!(target: "MONITOR", endpoint, "{}", err);
                return CandidateOutcome::Discarded(DiscardReason::TraderFetch);
            }
        };

        self.metrics.record_profiles(
            profiles.suspicious.len(),
            profiles.organic.len(),
            profiles.skipped.len(),
        );

        let cluster = self
            .analyzer
            .analyze(&token.contract_address, &profiles.suspicious);
        if self.settings.require_cluster_match && cluster.is_empty() {
            info!(target: "MONITOR", "{}: no common holdings, no alert", token.symbol);
            return CandidateOutcome::Discarded(DiscardReason::NoCluster);
        }

        let alert = match assemble(
            candidate,
            profiles.suspicious,
            profiles.stats,
            cluster,
            profiles.watched_tokens.into_iter().collect(),
            Utc::now(),
        ) {
            Ok(alert) => alert,
            Err(e) => {
                error!(target: "MONITOR", "Dropping alert for {}: {}", token.contract_address, e);
                return CandidateOutcome::Discarded(DiscardReason::InvalidAlert);
            }
        };

        crate::log_cabal!(
            "{} ({}) +{:.2}%: {} suspicious traders, {} common tokens",
            token.symbol,
            shorten_address(&token.contract_address, 4),
            alert.price_increase_pct,
            alert.suspicious.len(),
            alert.cluster.entries.len()
        );

        match self.sink.deliver(&alert).await {
            Ok(()) => {
                self.alerts_delivered.fetch_add(1, Ordering::Relaxed);
                self.metrics.alerts_delivered.inc();
                CandidateOutcome::Delivered
            }
            Err(e) => {
                warn!(target: "MONITOR", "Alert delivery failed for {}: {}", token.symbol, e);
                CandidateOutcome::Discarded(DiscardReason::SinkError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{activity, snapshot, CollectingSink, MapActivity, ScriptedFeed, StaticTraders};

    const SOL: &str = "So11111111111111111111111111111111111111112";

    fn config() -> Config {
        let mut config = Config::default();
        config.price_increase_threshold = 20.0;
        config.min_suspicious_addresses = 5;
        config.cluster_min_addresses = 3;
        config.cluster_min_total_value_usd = 100_000.0;
        config.worker_pool_size = 3;
        config.per_address_timeout_secs = 2;
        config
    }

    /// Ten traders, six of them low-activity; four suspicious ones hold $30k of U each
    fn traders_and_activity() -> (StaticTraders, MapActivity) {
        let names: Vec<String> = (0..10).map(|i| format!("trader{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();

        let reports = refs
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let report = match i {
                    0..=3 => activity(5, 200, &[("U", 30_000.0), (SOL, 1_000_000.0)]),
                    4 => activity(5, 200, &[("V", 500_000.0)]),
                    5 => activity(200, 5, &[]),
                    _ => activity(200, 200, &[("U", 90_000.0)]),
                };
                (*name, report)
            })
            .collect();

        (StaticTraders::new(&refs), MapActivity::new(reports))
    }

    fn monitor(feed: Arc<ScriptedFeed>, sink: Arc<CollectingSink>, config: &Config) -> MonitorLoop {
        let (traders, activity) = traders_and_activity();
        MonitorLoop::new(
            Collaborators {
                feed,
                traders: Arc::new(traders),
                activity: Arc::new(activity),
                sink,
                metrics: Arc::new(MetricsService::new().unwrap()),
            },
            config,
        )
    }

    fn spike_script() -> Vec<Option<Vec<crate::models::TokenSnapshot>>> {
        vec![
            Some(vec![snapshot("CAND", 0.0020), snapshot("FLAT", 1.0)]),
            Some(vec![
                snapshot("CAND", 0.0028),
                snapshot("FLAT", 1.01),
                snapshot("NEW", 5.0),
            ]),
        ]
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        for _ in 0..300 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn spike_with_cabal_produces_alert() {
        let feed = Arc::new(ScriptedFeed::new(spike_script()));
        let sink = Arc::new(CollectingSink::new());
        let monitor = monitor(feed, Arc::clone(&sink), &config());
        let cancel = CancellationToken::new();

        let first = monitor.core.run_cycle(&cancel).await.unwrap();
        assert_eq!(first.comparable_pairs, 0);
        assert_eq!(first.candidates, 0);

        let second = monitor.core.run_cycle(&cancel).await.unwrap();
        assert_eq!(second.tokens_recorded, 3);
        assert_eq!(second.comparable_pairs, 2);
        assert_eq!(second.candidates, 1);
        assert_eq!(second.alerts_delivered, 1);

        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.token.contract_address, "CAND");
        assert!((alert.price_increase_pct - 40.0).abs() < 1e-9);
        assert_eq!(alert.suspicious.len(), 6);
        assert_eq!(alert.activity.profiled, 10);
        assert_eq!(alert.activity.low_7d, 5);

        let u = alert.cluster.get("U").expect("U clusters");
        assert_eq!(u.address_count(), 4);
        assert_eq!(u.total_value_usd, 120_000.0);
        assert!(!alert.cluster.contains(SOL));
        assert!(!alert.cluster.contains("V"));

        let status = monitor.status();
        assert!(!status.running);
        assert_eq!(status.tracked_tokens, 3);
        assert_eq!(status.previous_tokens, 2);
        assert!(status.last_cycle_at.is_some());
        assert_eq!(status.alerts_delivered, 1);
    }

    #[tokio::test]
    async fn too_few_suspicious_traders_means_no_alert() {
        let mut config = config();
        config.min_suspicious_addresses = 7;
        let sink = Arc::new(CollectingSink::new());
        let monitor = monitor(Arc::new(ScriptedFeed::new(spike_script())), Arc::clone(&sink), &config);
        let cancel = CancellationToken::new();

        monitor.core.run_cycle(&cancel).await.unwrap();
        let report = monitor.core.run_cycle(&cancel).await.unwrap();

        assert_eq!(report.candidates, 1);
        assert_eq!(
            report.discarded,
            vec![("CAND".to_string(), DiscardReason::InsufficientSuspicious)]
        );
        assert!(sink.alerts().is_empty());
    }

    #[tokio::test]
    async fn cluster_gate_drops_candidates_without_common_holdings() {
        let mut config = config();
        config.require_cluster_match = true;
        config.cluster_min_total_value_usd = 1e12;
        let sink = Arc::new(CollectingSink::new());
        let monitor = monitor(Arc::new(ScriptedFeed::new(spike_script())), Arc::clone(&sink), &config);
        let cancel = CancellationToken::new();

        monitor.core.run_cycle(&cancel).await.unwrap();
        let report = monitor.core.run_cycle(&cancel).await.unwrap();

        assert_eq!(report.discarded[0].1, DiscardReason::NoCluster);
        assert!(sink.alerts().is_empty());
    }

    #[tokio::test]
    async fn feed_failure_fails_the_cycle_and_keeps_generations() {
        let feed = Arc::new(ScriptedFeed::new(vec![
            Some(vec![snapshot("CAND", 0.0020)]),
            None,
        ]));
        let monitor = monitor(feed, Arc::new(CollectingSink::new()), &config());
        let cancel = CancellationToken::new();

        monitor.core.run_cycle(&cancel).await.unwrap();
        let result = monitor.core.run_cycle(&cancel).await;

        assert!(matches!(result, Err(MonitorError::Feed(_))));
        assert_eq!(monitor.status().tracked_tokens, 1);
    }

    #[tokio::test]
    async fn sink_failure_is_not_fatal() {
        let sink = Arc::new(CollectingSink::failing());
        let monitor = monitor(Arc::new(ScriptedFeed::new(spike_script())), Arc::clone(&sink), &config());
        let cancel = CancellationToken::new();

        monitor.core.run_cycle(&cancel).await.unwrap();
        let report = monitor.core.run_cycle(&cancel).await.unwrap();

        assert_eq!(report.alerts_delivered, 0);
        assert_eq!(report.discarded[0].1, DiscardReason::SinkError);
        assert_eq!(sink.alerts().len(), 1);
        assert_eq!(monitor.status().alerts_delivered, 0);
    }

    #[tokio::test]
    async fn start_twice_is_rejected_and_stop_is_idempotent() {
        let mut config = config();
        config.snapshot_interval_secs = 3600;
        let feed = Arc::new(ScriptedFeed::new(vec![Some(vec![snapshot("A", 1.0)])]));
        let monitor = monitor(feed, Arc::new(CollectingSink::new()), &config);

        monitor.start().unwrap();
        assert!(matches!(monitor.start(), Err(MonitorError::AlreadyRunning)));
        assert!(monitor.status().running);

        wait_until(|| monitor.status().cycles_completed >= 1).await;

        // Sleep of an hour must be interrupted by stop
        let started = Instant::now();
        monitor.stop().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!monitor.status().running);

        monitor.stop().await;
        assert!(!monitor.status().running);

        monitor.start().unwrap();
        assert!(monitor.is_running());
        monitor.stop().await;
        assert!(!monitor.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn restart_during_stop_never_overlaps_drivers() {
        let mut config = config();
        config.snapshot_interval_secs = 0;
        config.stop_timeout_secs = 5;
        let feed = Arc::new(
            ScriptedFeed::new(vec![Some(vec![snapshot("A", 1.0)])])
                .with_delay(Duration::from_millis(400)),
        );
        let monitor = monitor(Arc::clone(&feed), Arc::new(CollectingSink::new()), &config);

        monitor.start().unwrap();
        wait_until(|| feed.calls() >= 1).await;

        let stopping = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.stop().await })
        };
        wait_until(|| !monitor.is_running()).await;

        // The first driver is still inside its feed call
        assert!(matches!(monitor.start(), Err(MonitorError::Stopping)));

        stopping.await.unwrap();
        assert!(!monitor.status().running);

        monitor.start().unwrap();
        assert!(monitor.is_running());
        wait_until(|| feed.calls() >= 2).await;
        monitor.stop().await;

        assert!(!monitor.is_running());
        assert_eq!(feed.peak_in_flight(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_mid_profiling_drains_in_flight_calls() {
        let mut config = config();
        config.snapshot_interval_secs = 0;
        config.stop_timeout_secs = 5;
        config.per_address_timeout_secs = 5;
        let (traders, activity) = traders_and_activity();
        let activity = Arc::new(activity.with_delay(Duration::from_millis(300)));
        let sink = Arc::new(CollectingSink::new());
        let monitor = MonitorLoop::new(
            Collaborators {
                feed: Arc::new(ScriptedFeed::new(spike_script())),
                traders: Arc::new(traders),
                activity: activity.clone(),
                sink: sink.clone(),
                metrics: Arc::new(MetricsService::new().unwrap()),
            },
            &config,
        );

        monitor.start().unwrap();
        wait_until(|| activity.peak_in_flight() > 0).await;

        let started = Instant::now();
        monitor.stop().await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(activity.in_flight(), 0);
        assert!(activity.peak_in_flight() <= 3);
        assert!(!monitor.status().running);
        assert!(sink.alerts().is_empty());
    }

    #[tokio::test]
    async fn failed_cycles_back_off_without_exiting() {
        let mut config = config();
        config.error_backoff_secs = 3600;
        let feed = Arc::new(ScriptedFeed::new(vec![None]));
        let monitor = monitor(Arc::clone(&feed), Arc::new(CollectingSink::new()), &config);

        monitor.start().unwrap();
        wait_until(|| monitor.status().cycles_failed == 1).await;
        assert!(monitor.status().running);
        assert_eq!(feed.calls(), 1);

        monitor.stop().await;
        assert!(!monitor.status().running);
    }
}
