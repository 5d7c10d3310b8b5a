//! Prometheus metrics service for CabalGuard

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics service for Prometheus
pub struct MetricsService {
    registry: Registry,
    start_time: Instant,

    // Monitor loop
    pub cycles: CounterVec,
    pub cycle_duration: Histogram,
    pub tokens_tracked: Gauge,
    pub candidates: Counter,
    pub monitor_running: Gauge,

    // Profiling
    pub addresses_profiled: CounterVec,

    // Alerts
    pub alerts_delivered: Counter,
    pub alerts_discarded: CounterVec,

    // Providers
    pub provider_requests: CounterVec,
    pub provider_latency: HistogramVec,

    pub uptime: Gauge,
}

impl MetricsService {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cycles = CounterVec::new(
            Opts::new("cabalguard_cycles_total", "Monitor cycles by outcome"),
            &["outcome"],
        )?;
        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new("cabalguard_cycle_duration_seconds", "Monitor cycle duration")
                .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;
        let tokens_tracked = Gauge::new("cabalguard_tokens_tracked", "Tokens in the current generation")?;
        let candidates = Counter::new("cabalguard_candidates_total", "Tokens that crossed the price threshold")?;
        let monitor_running = Gauge::new("cabalguard_monitor_running", "Monitor loop status")?;

        let addresses_profiled = CounterVec::new(
            Opts::new("cabalguard_addresses_profiled_total", "Trader addresses by classification"),
            &["class"],
        )?;

        let alerts_delivered = Counter::new("cabalguard_alerts_delivered_total", "Alerts handed to the sink")?;
        let alerts_discarded = CounterVec::new(
            Opts::new("cabalguard_alerts_discarded_total", "Candidates dropped before alerting"),
            &["reason"],
        )?;

        let provider_requests = CounterVec::new(
            Opts::new("cabalguard_provider_requests_total", "External API requests"),
            &["endpoint", "status"],
        )?;
        let provider_latency = HistogramVec::new(
            HistogramOpts::new("cabalguard_provider_latency_seconds", "External API latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["endpoint"],
        )?;

        let uptime = Gauge::new("cabalguard_uptime_seconds", "Application uptime")?;

        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;
        registry.register(Box::new(tokens_tracked.clone()))?;
        registry.register(Box::new(candidates.clone()))?;
        registry.register(Box::new(monitor_running.clone()))?;
        registry.register(Box::new(addresses_profiled.clone()))?;
        registry.register(Box::new(alerts_delivered.clone()))?;
        registry.register(Box::new(alerts_discarded.clone()))?;
        registry.register(Box::new(provider_requests.clone()))?;
        registry.register(Box::new(provider_latency.clone()))?;
        registry.register(Box::new(uptime.clone()))?;

        info!(target: "METRICS", "Prometheus metrics initialized");

        Ok(Self {
            registry,
            start_time: Instant::now(),
            cycles,
            cycle_duration,
            tokens_tracked,
            candidates,
            monitor_running,
            addresses_profiled,
            alerts_delivered,
            alerts_discarded,
            provider_requests,
            provider_latency,
            uptime,
        })
    }

    pub fn record_provider_call(&self, endpoint: &str, status: &str, elapsed: Duration) {
        self.provider_requests
            .with_label_values(&[endpoint, status])
            .inc();
        self.provider_latency
            .with_label_values(&[endpoint])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_cycle(&self, outcome: &str, elapsed: Duration) {
        self.cycles.with_label_values(&[outcome]).inc();
        self.cycle_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_profiles(&self, suspicious: usize, organic: usize, skipped: usize) {
        for (class, count) in [("suspicious", suspicious), ("organic", organic), ("skipped", skipped)] {
            self.addresses_profiled
                .with_label_values(&[class])
                .inc_by(count as f64);
        }
    }

    pub fn record_discard(&self, reason: &str) {
        self.alerts_discarded.with_label_values(&[reason]).inc();
    }

    pub fn set_running(&self, running: bool) {
        self.monitor_running.set(if running { 1.0 } else { 0.0 });
    }

    /// Metrics in Prometheus text exposition format
    pub fn get_metrics(&self) -> Result<String, prometheus::Error> {
        self.uptime.set(self.start_time.elapsed().as_secs_f64());

        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
