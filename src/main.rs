//! CabalGuard - low-cap token spike monitor with cabal detection
//!
//! Polls qualifying low-cap Solana tokens, flags sharp price rises, profiles
//! the traders behind each spike and alerts when a cluster of low-activity
//! wallets shares the same holdings.
//!
//! This is a **monitoring-only** tool - no wallet or trading functionality.

mod config;
mod dashboard;
mod error;
mod models;
mod modules;
mod providers;
mod utils;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use config::Config;
use dashboard::DashboardServer;
use modules::{Collaborators, MonitorLoop};
use providers::{build_http_client, JupiterFeed, OkxClient};
use utils::alerts::AlertSettings;
use utils::{init_logger, AlertService, MetricsService};

const BANNER: &str = r#"
    ╔═══════════════════════════════════════════════════════╗
    ║                                                       ║
    ║   🛡️  CabalGuard                                       ║
    ║   📈 Price spikes | 👥 Trader profiling | 🔗 Clusters  ║
    ║                                                       ║
    ╚═══════════════════════════════════════════════════════╝
"#;

/// CabalGuard application
pub struct CabalGuard {
    config: Config,
    alerts: Arc<AlertService>,
    metrics: Arc<MetricsService>,
    monitor: MonitorLoop,
}

impl CabalGuard {
    pub fn new() -> Result<Self> {
        let config = Config::from_env();
        config.validate()?;

        let metrics = Arc::new(MetricsService::new().context("registering metrics")?);
        let http = build_http_client(&config).context("building HTTP client")?;

        let feed = Arc::new(JupiterFeed::new(&config, http.clone(), Arc::clone(&metrics)));
        let okx = Arc::new(OkxClient::new(&config, http.clone(), Arc::clone(&metrics)));
        let alerts = Arc::new(AlertService::new(AlertSettings::from_config(&config), http));

        let monitor = MonitorLoop::new(
            Collaborators {
                feed,
                traders: okx.clone(),
                activity: okx,
                sink: alerts.clone(),
                metrics: Arc::clone(&metrics),
            },
            &config,
        );

        Ok(Self {
            config,
            alerts,
            metrics,
            monitor,
        })
    }

    pub async fn start(&self) -> Result<()> {
        println!("{}", BANNER);

        info!(target: "CABALGUARD", "Initializing CabalGuard...");
        info!(
            target: "CABALGUARD",
            "Price threshold {:.1}%, min suspicious {}, {} workers, telegram {}",
            self.config.price_increase_threshold,
            self.config.min_suspicious_addresses,
            self.config.worker_pool_size,
            if self.config.telegram_enabled() { "on" } else { "off" }
        );

        if self.config.auto_start {
            self.monitor.start()?;
            crate::log_success!("CABALGUARD", "Monitor started");
        } else {
            info!(target: "CABALGUARD", "AUTO_START=false, start the monitor from the dashboard");
        }

        info!(target: "CABALGUARD", "Dashboard: http://localhost:{}", self.config.dashboard_port);

        let dashboard = DashboardServer::new(
            self.config.dashboard_port,
            self.monitor.clone(),
            Arc::clone(&self.alerts),
            Arc::clone(&self.metrics),
        );
        dashboard.start().await?;

        Ok(())
    }

    /// Graceful shutdown
    pub async fn shutdown(&self) {
        info!(target: "CABALGUARD", "Shutting down...");
        self.monitor.stop().await;
        crate::log_success!("CABALGUARD", "Shutdown complete");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let cabalguard = match CabalGuard::new() {
        Ok(app) => app,
        Err(e) => {
            error!(target: "CABALGUARD", "Failed to initialize: {:#}", e);
            return Err(e);
        }
    };

    let shutdown_signal = async {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    tokio::select! {
        result = cabalguard.start() => {
            if let Err(e) = result {
                error!(target: "CABALGUARD", "Fatal error: {:#}", e);
            }
            warn!(target: "CABALGUARD", "Dashboard exited, stopping monitor");
            cabalguard.shutdown().await;
        }
        _ = shutdown_signal => {
            cabalguard.shutdown().await;
        }
    }

    Ok(())
}
