//! Utility modules

pub mod alerts;
pub mod logger;
pub mod metrics;
pub mod worker_pool;

pub use alerts::AlertService;
pub use logger::init_logger;
pub use metrics::MetricsService;

/// `abcd...wxyz` form of a long address for logs and messages
pub fn shorten_address(address: &str, chars: usize) -> String {
    if address.len() <= chars * 2 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..chars], &address[address.len() - chars..])
}
