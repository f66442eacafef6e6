//! Witness daemon: owns the three monitors, tags and buffers their events,
//! and flushes batches to a sink on a size threshold, a 5s timer, or `stop`.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agenttrust_proto::{WitnessEvent, WitnessSource};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{error, info, warn};

use crate::config::WitnessConfig;
use crate::file_monitor::FileMonitor;
use crate::gateway::{discover_gateway_pid, process_tree};
use crate::network_monitor::NetworkMonitor;
use crate::process_monitor::ProcessMonitor;

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct WitnessStats {
    pub events_by_source: HashMap<WitnessSource, u64>,
    pub last_event_at: HashMap<WitnessSource, DateTime<Utc>>,
}

struct BufferedEvent {
    source: WitnessSource,
    event: WitnessEvent,
}

pub type Sink = dyn Fn(Vec<(WitnessSource, WitnessEvent)>) + Send + Sync;

pub struct WitnessDaemon {
    config: WitnessConfig,
    file_monitor: Arc<FileMonitor>,
    process_monitor: Arc<ProcessMonitor>,
    network_monitor: Arc<NetworkMonitor>,
    gateway_pids: Arc<Mutex<Option<HashSet<u32>>>>,
    buffer: Arc<Mutex<Vec<BufferedEvent>>>,
    stats: Arc<Mutex<WitnessStats>>,
    sink: Arc<Sink>,
    running: Arc<AtomicBool>,
    flush_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    dropped_after_stop: Arc<AtomicU64>,
}

impl WitnessDaemon {
    pub fn new(config: WitnessConfig, sink: Arc<Sink>) -> Self {
        let file_monitor = Arc::new(FileMonitor::new(config.watch_dirs.clone(), config.exclude_patterns.clone(), config.file_polling_ms));
        let process_monitor = Arc::new(ProcessMonitor::new(config.process_polling_ms, config.gateway_pid_file.clone(), config.gateway_process_name.clone()));
        let network_monitor = Arc::new(NetworkMonitor::new(config.network_polling_ms));
        Self {
            config,
            file_monitor,
            process_monitor,
            network_monitor,
            gateway_pids: Arc::new(Mutex::new(None)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(WitnessStats::default())),
            sink,
            running: Arc::new(AtomicBool::new(false)),
            flush_handle: Mutex::new(None),
            dropped_after_stop: Arc::new(AtomicU64::new(0)),
        }
    }

    fn discover_gateway_tree(&self) -> Option<HashSet<u32>> {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let own_pid = std::process::id();
        let parent_of: HashMap<u32, u32> = sys.processes().iter().map(|(pid, p)| (pid.as_u32(), p.parent().map(|pp| pp.as_u32()).unwrap_or(0))).collect();
        let command_of: HashMap<u32, String> = sys
            .processes()
            .iter()
            .map(|(pid, p)| (pid.as_u32(), p.cmd().iter().map(|s| s.to_string_lossy().to_string()).collect::<Vec<_>>().join(" ")))
            .collect();
        discover_gateway_pid(self.config.gateway_pid_file.as_deref(), self.config.gateway_process_name.as_deref(), own_pid, &command_of)
            .map(|root| process_tree(root, &parent_of))
    }

    fn record(&self, source: WitnessSource, event: WitnessEvent) {
        if !self.running.load(Ordering::SeqCst) {
            self.dropped_after_stop.fetch_add(1, Ordering::Relaxed);
            return;
        }
        {
            let mut stats = self.stats.lock();
            *stats.events_by_source.entry(source).or_insert(0) += 1;
            stats.last_event_at.insert(source, Utc::now());
        }
        let should_flush = {
            let mut buffer = self.buffer.lock();
            buffer.push(BufferedEvent { source, event });
            buffer.len() >= self.config.buffer_size
        };
        if should_flush {
            self.flush();
        }
    }

    /// Drain the buffer and hand it to the sink. A sink panic is caught and
    /// logged; the buffer is emptied regardless of the sink's outcome.
    pub fn flush(&self) {
        let batch: Vec<(WitnessSource, WitnessEvent)> = {
            let mut buffer = self.buffer.lock();
            std::mem::take(&mut *buffer).into_iter().map(|b| (b.source, b.event)).collect()
        };
        if batch.is_empty() {
            return;
        }
        let sink = Arc::clone(&self.sink);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| sink(batch)));
        if outcome.is_err() {
            error!("witness sink panicked during flush; batch dropped");
        }
    }

    /// Idempotent. Starting an already-running daemon is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        *self.gateway_pids.lock() = self.discover_gateway_tree();

        let this_file = Arc::clone(self);
        self.file_monitor.start(Arc::new(move |event| this_file.record(WitnessSource::Filesystem, event)));

        let this_process = Arc::clone(self);
        self.process_monitor.start(Arc::new(move |event| this_process.record(WitnessSource::Process, event)));

        let this_network = Arc::clone(self);
        self.network_monitor.start(Arc::new(move |event| this_network.record(WitnessSource::Network, event)), Arc::clone(&self.gateway_pids));

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);
            while this.running.load(Ordering::SeqCst) {
                interval.tick().await;
                if this.running.load(Ordering::SeqCst) {
                    this.flush();
                }
            }
        });
        *self.flush_handle.lock() = Some(handle);
        info!("witness daemon started");
    }

    /// Stops all monitors, cancels the flush timer, and performs one final
    /// flush before returning. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.file_monitor.stop();
        self.process_monitor.stop();
        self.network_monitor.stop();
        if let Some(handle) = self.flush_handle.lock().take() {
            handle.abort();
        }
        self.flush();
        if self.dropped_after_stop.load(Ordering::Relaxed) > 0 {
            warn!(dropped = self.dropped_after_stop.load(Ordering::Relaxed), "late witness callbacks dropped after stop");
        }
        info!("witness daemon stopped");
    }

    pub fn get_stats(&self) -> WitnessStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrust_proto::FileEventData;
    use std::sync::atomic::AtomicUsize;

    fn file_event() -> WitnessEvent {
        WitnessEvent::FileCreated(FileEventData { path: "/tmp/x".to_string(), observed_at: Utc::now(), stat: None })
    }

    #[tokio::test]
    async fn test_record_flushes_on_buffer_size_threshold() {
        let flush_count = Arc::new(AtomicUsize::new(0));
        let fc = Arc::clone(&flush_count);
        let sink: Arc<Sink> = Arc::new(move |_batch| {
            fc.fetch_add(1, Ordering::SeqCst);
        });
        let mut config = WitnessConfig::default();
        config.buffer_size = 2;
        let daemon = WitnessDaemon::new(config, sink);
        daemon.running.store(true, Ordering::SeqCst);

        daemon.record(WitnessSource::Filesystem, file_event());
        assert_eq!(flush_count.load(Ordering::SeqCst), 0);
        daemon.record(WitnessSource::Filesystem, file_event());
        assert_eq!(flush_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sink_panic_does_not_poison_buffer() {
        let sink: Arc<Sink> = Arc::new(|_batch| panic!("sink exploded"));
        let config = WitnessConfig::default();
        let daemon = WitnessDaemon::new(config, sink);
        daemon.running.store(true, Ordering::SeqCst);
        daemon.record(WitnessSource::Process, file_event());
        daemon.flush();
        assert!(daemon.buffer.lock().is_empty());
    }

    #[tokio::test]
    async fn test_events_after_stop_are_dropped_not_buffered() {
        let sink: Arc<Sink> = Arc::new(|_batch| {});
        let config = WitnessConfig::default();
        let daemon = WitnessDaemon::new(config, sink);
        // running is false by default (never started)
        daemon.record(WitnessSource::Network, file_event());
        assert!(daemon.buffer.lock().is_empty());
        assert_eq!(daemon.dropped_after_stop.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_get_stats_tracks_per_source_counts() {
        let sink: Arc<Sink> = Arc::new(|_batch| {});
        let config = WitnessConfig::default();
        let daemon = WitnessDaemon::new(config, sink);
        daemon.running.store(true, Ordering::SeqCst);
        daemon.record(WitnessSource::Filesystem, file_event());
        daemon.record(WitnessSource::Filesystem, file_event());
        let stats = daemon.get_stats();
        assert_eq!(stats.events_by_source[&WitnessSource::Filesystem], 2);
    }
}
