//! Logging setup for CabalGuard

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Components log under their own targets, so verbosity is raised per target
const COMPONENT_TARGETS: &[&str] = &[
    "CABALGUARD",
    "MONITOR",
    "SNAPSHOTS",
    "DETECTOR",
    "SPIKE",
    "PROFILER",
    "CLUSTER",
    "CABAL",
    "FEED",
    "OKX",
    "PROVIDERS",
    "WORKER_POOL",
    "ALERTS",
    "METRICS",
    "DASHBOARD",
];

/// Filter used when `RUST_LOG` is unset
fn default_directives() -> String {
    let mut directives = String::from("info,cabalguard=debug");
    for target in COMPONENT_TARGETS {
        directives.push_str(&format!(",{}=debug", target));
    }
    directives
}

/// Initialize tracing. Colored text by default, JSON lines when `LOG_FORMAT=json`.
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives()));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[macro_export]
macro_rules! log_success {
    ($module:expr, $($arg:tt)*) => {
        tracing::info!(target: $module, "✅ {}", format!($($arg)*))
    };
}

/// Price spike on a tracked token
#[macro_export]
macro_rules! log_spike {
    ($($arg:tt)*) => {
        tracing::info!(target: "SPIKE", "📈 {}", format!($($arg)*))
    };
}

/// Coordinated-wallet alert raised
#[macro_export]
macro_rules! log_cabal {
    ($($arg:tt)*) => {
        tracing::warn!(target: "CABAL", "🚨 {}", format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_component_targets() {
        let directives = default_directives();
        assert!(EnvFilter::try_new(&directives).is_ok());
        for target in ["MONITOR", "PROFILER", "FEED", "ALERTS", "WORKER_POOL"] {
            assert!(directives.contains(&format!("{}=debug", target)), "{}", target);
        }
        assert!(directives.starts_with("info,"));
    }
}
