//! File, process, and network witness monitors, and the buffering daemon
//! that aggregates their output into hash-chained witness records.

#![forbid(unsafe_code)]

pub mod config;
pub mod daemon;
pub mod file_monitor;
pub mod gateway;
pub mod network_monitor;
pub mod process_monitor;

pub use config::WitnessConfig;
pub use daemon::{Sink, WitnessDaemon, WitnessStats};
pub use file_monitor::FileMonitor;
pub use network_monitor::NetworkMonitor;
pub use process_monitor::ProcessMonitor;
