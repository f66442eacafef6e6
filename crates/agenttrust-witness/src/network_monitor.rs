//! Polling network monitor. Reads open outbound TCP/UDP connections from the
//! kernel's `/proc/net/*` tables on Linux; on other platforms it reports no
//! connections (passive mode still functions, simply with nothing to see).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agenttrust_proto::{NetworkEventData, Protocol, WitnessEvent};
use chrono::Utc;
use parking_lot::Mutex;
use tracing::warn;

const NETWORK_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const LOCALHOST_ADDRS: &[&str] = &["127.0.0.1", "::1", "localhost", "0.0.0.0"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub protocol: Protocol,
    pub remote_host: String,
    pub remote_port: u16,
    pub pid: Option<u32>,
}

#[cfg(target_os = "linux")]
fn decode_hex_ipv4(hex: &str) -> Option<String> {
    let bytes = u32::from_str_radix(hex, 16).ok()?;
    let b = bytes.to_le_bytes();
    Some(format!("{}.{}.{}.{}", b[0], b[1], b[2], b[3]))
}

#[cfg(target_os = "linux")]
fn parse_proc_net_line(line: &str, protocol: Protocol) -> Option<(String, u16, String, u64)> {
    let mut fields = line.split_whitespace();
    let _sl = fields.next()?;
    let _local = fields.next()?;
    let rem = fields.next()?;
    let state = fields.next()?;
    if protocol == Protocol::Tcp && state != "01" {
        return None; // only ESTABLISHED
    }
    let (rem_addr, rem_port) = rem.split_once(':')?;
    let host = decode_hex_ipv4(rem_addr)?;
    let port = u16::from_str_radix(rem_port, 16).ok()?;
    // tx_queue:rx_queue, tr:tm_when, retrnsmt, uid, timeout, inode
    let inode = fields.nth(4)?.parse::<u64>().ok()?;
    Some((host, port, state.to_string(), inode))
}

#[cfg(target_os = "linux")]
fn inode_to_pid_map() -> HashMap<u64, u32> {
    let mut map = HashMap::new();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return map;
    };
    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        let fd_dir = entry.path().join("fd");
        let Ok(fds) = std::fs::read_dir(&fd_dir) else {
            continue;
        };
        for fd in fds.flatten() {
            if let Ok(target) = std::fs::read_link(fd.path()) {
                let target = target.to_string_lossy();
                if let Some(inode_str) = target.strip_prefix("socket:[").and_then(|s| s.strip_suffix(']')) {
                    if let Ok(inode) = inode_str.parse::<u64>() {
                        map.insert(inode, pid);
                    }
                }
            }
        }
    }
    map
}

#[cfg(target_os = "linux")]
fn scan_connections() -> HashSet<ConnectionKey> {
    let inode_to_pid = inode_to_pid_map();
    let mut out = HashSet::new();
    for (path, protocol) in [("/proc/net/tcp", Protocol::Tcp), ("/proc/net/udp", Protocol::Udp)] {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        for line in contents.lines().skip(1) {
            if let Some((host, port, _state, inode)) = parse_proc_net_line(line, protocol) {
                if is_localhost(&host) {
                    continue;
                }
                out.insert(ConnectionKey { protocol, remote_host: host, remote_port: port, pid: inode_to_pid.get(&inode).copied() });
            }
        }
    }
    out
}

#[cfg(not(target_os = "linux"))]
fn scan_connections() -> HashSet<ConnectionKey> {
    HashSet::new()
}

fn is_localhost(host: &str) -> bool {
    LOCALHOST_ADDRS.contains(&host)
}

/// Diff two connection snapshots into open/close events, restricted to
/// `gateway_pids` when present. `None` for `previous` suppresses the first
/// scan (baseline seeding).
pub fn diff_connections(
    previous: Option<&HashSet<ConnectionKey>>,
    current: &HashSet<ConnectionKey>,
    gateway_pids: Option<&HashSet<u32>>,
) -> Vec<WitnessEvent> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    let in_scope = |conn: &ConnectionKey| match (gateway_pids, conn.pid) {
        (Some(tree), Some(pid)) => tree.contains(&pid),
        (Some(_), None) => false,
        (None, _) => true,
    };
    let now = Utc::now();
    let mut events = Vec::new();

    for conn in current.difference(previous) {
        if in_scope(conn) {
            events.push(WitnessEvent::ConnectionOpened(event_data(conn, now)));
        }
    }
    for conn in previous.difference(current) {
        if in_scope(conn) {
            events.push(WitnessEvent::ConnectionClosed(event_data(conn, now)));
        }
    }
    events
}

fn event_data(conn: &ConnectionKey, now: chrono::DateTime<Utc>) -> NetworkEventData {
    NetworkEventData {
        remote_host: conn.remote_host.clone(),
        remote_port: Some(conn.remote_port),
        protocol: Some(conn.protocol),
        pid: conn.pid,
        command: None,
        observed_at: now,
    }
}

pub struct NetworkMonitor {
    polling_ms: u64,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl NetworkMonitor {
    pub fn new(polling_ms: u64) -> Self {
        Self { polling_ms, running: Arc::new(AtomicBool::new(false)), handle: Mutex::new(None) }
    }

    /// `gateway_pids` is recomputed by the caller (the daemon) each cycle
    /// from the process monitor's view and passed in via a shared cell, to
    /// avoid this monitor re-discovering the gateway independently.
    pub fn start(self: &Arc<Self>, cb: Arc<dyn Fn(WitnessEvent) + Send + Sync>, gateway_pids: Arc<Mutex<Option<HashSet<u32>>>>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut previous: Option<HashSet<ConnectionKey>> = None;
            let mut interval = tokio::time::interval(Duration::from_millis(this.polling_ms));
            while this.running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                let probe = tokio::task::spawn_blocking(scan_connections);
                let current = match tokio::time::timeout(NETWORK_PROBE_TIMEOUT, probe).await {
                    Ok(Ok(snap)) => snap,
                    _ => {
                        warn!("network probe timed out, retrying next cycle");
                        continue;
                    }
                };
                let tree = gateway_pids.lock().clone();
                for event in diff_connections(previous.as_ref(), &current, tree.as_ref()) {
                    if this.running.load(Ordering::SeqCst) {
                        cb(event);
                    }
                }
                previous = Some(current);
            }
        });
        *self.handle.lock() = Some(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(host: &str, port: u16, pid: Option<u32>) -> ConnectionKey {
        ConnectionKey { protocol: Protocol::Tcp, remote_host: host.to_string(), remote_port: port, pid }
    }

    #[test]
    fn test_first_scan_suppressed() {
        let current = HashSet::from([conn("1.2.3.4", 443, Some(1))]);
        assert!(diff_connections(None, &current, None).is_empty());
    }

    #[test]
    fn test_new_connection_emits_opened_closed_emits_for_dropped() {
        let previous = HashSet::from([conn("1.2.3.4", 443, Some(1))]);
        let current = HashSet::from([conn("5.6.7.8", 80, Some(1))]);
        let events = diff_connections(Some(&previous), &current, None);
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| matches!(e, WitnessEvent::ConnectionOpened(d) if d.remote_host == "5.6.7.8")));
        assert!(events.iter().any(|e| matches!(e, WitnessEvent::ConnectionClosed(d) if d.remote_host == "1.2.3.4")));
    }

    #[test]
    fn test_gateway_scope_excludes_unassociated_pid() {
        let previous = HashSet::new();
        let current = HashSet::from([conn("1.2.3.4", 443, Some(99))]);
        let tree = HashSet::from([1u32, 2u32]);
        let events = diff_connections(Some(&previous), &current, Some(&tree));
        assert!(events.is_empty());
    }

    #[test]
    fn test_is_localhost_matches_known_forms() {
        assert!(is_localhost("127.0.0.1"));
        assert!(is_localhost("::1"));
        assert!(!is_localhost("8.8.8.8"));
    }
}
