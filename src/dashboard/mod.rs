//! Operator dashboard: REST, Prometheus and WebSocket endpoints

pub mod server;

pub use server::DashboardServer;
