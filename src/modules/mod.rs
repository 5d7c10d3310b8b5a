//! CabalGuard monitoring modules

pub mod address_profiler;
pub mod alert_assembler;
pub mod cluster_analyzer;
pub mod monitor_loop;
pub mod price_detector;
pub mod snapshot_store;

pub use monitor_loop::{Collaborators, MonitorLoop};
