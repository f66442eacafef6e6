//! Polling process monitor with baseline suppression and optional
//! gateway-tree filtering.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agenttrust_proto::{ProcessEventData, WitnessEvent};
use chrono::Utc;
use parking_lot::Mutex;
use sysinfo::{ProcessesToUpdate, System};
use tracing::warn;

use crate::gateway::{discover_gateway_pid, process_tree};

const PROCESS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ProcSnapshot {
    pub ppid: u32,
    pub command: String,
    pub user: Option<String>,
    pub cwd: Option<String>,
}

fn snapshot_processes(sys: &mut System) -> HashMap<u32, ProcSnapshot> {
    sys.refresh_processes(ProcessesToUpdate::All, true);
    sys.processes()
        .iter()
        .map(|(pid, proc)| {
            let command = proc
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(" ");
            let command = if command.is_empty() { proc.name().to_string_lossy().to_string() } else { command };
            (
                pid.as_u32(),
                ProcSnapshot {
                    ppid: proc.parent().map(|p| p.as_u32()).unwrap_or(0),
                    command,
                    user: proc.user_id().map(|u| u.to_string()),
                    cwd: proc.cwd().map(|p| p.display().to_string()),
                },
            )
        })
        .collect()
}

/// Diff two process snapshots into spawn/exit events, restricted to
/// `gateway_tree` when present. `None` for `previous` suppresses the first
/// scan's results (baseline seeding).
pub fn diff_processes(
    previous: Option<&HashMap<u32, ProcSnapshot>>,
    current: &HashMap<u32, ProcSnapshot>,
    gateway_tree: Option<&HashSet<u32>>,
) -> Vec<WitnessEvent> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    let in_scope = |pid: u32| gateway_tree.map(|t| t.contains(&pid)).unwrap_or(true);
    let now = Utc::now();
    let mut events = Vec::new();

    for (&pid, proc) in current {
        if !previous.contains_key(&pid) && in_scope(pid) {
            events.push(WitnessEvent::ProcessSpawned(ProcessEventData {
                command: proc.command.clone(),
                pid,
                ppid: proc.ppid,
                observed_at: now,
                exit_code: None,
                user: proc.user.clone(),
                cwd: proc.cwd.clone(),
            }));
        }
    }
    for (&pid, proc) in previous {
        if !current.contains_key(&pid) && in_scope(pid) {
            events.push(WitnessEvent::ProcessExited(ProcessEventData {
                command: proc.command.clone(),
                pid,
                ppid: proc.ppid,
                observed_at: now,
                exit_code: None,
                user: proc.user.clone(),
                cwd: proc.cwd.clone(),
            }));
        }
    }
    events
}

pub struct ProcessMonitor {
    polling_ms: u64,
    gateway_pid_file: Option<PathBuf>,
    gateway_process_name: Option<String>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ProcessMonitor {
    pub fn new(polling_ms: u64, gateway_pid_file: Option<PathBuf>, gateway_process_name: Option<String>) -> Self {
        Self {
            polling_ms,
            gateway_pid_file,
            gateway_process_name,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn start(self: &Arc<Self>, cb: Arc<dyn Fn(WitnessEvent) + Send + Sync>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let own_pid = std::process::id();
            let mut previous: Option<HashMap<u32, ProcSnapshot>> = None;
            let mut interval = tokio::time::interval(Duration::from_millis(this.polling_ms));

            while this.running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }

                let probe = tokio::task::spawn_blocking(|| {
                    let mut sys = System::new();
                    snapshot_processes(&mut sys)
                });
                let current = match tokio::time::timeout(PROCESS_PROBE_TIMEOUT, probe).await {
                    Ok(Ok(snap)) => snap,
                    _ => {
                        warn!("process probe timed out, retrying next cycle");
                        continue;
                    }
                };

                let parent_of: HashMap<u32, u32> = current.iter().map(|(&pid, p)| (pid, p.ppid)).collect();
                let command_of: HashMap<u32, String> = current.iter().map(|(&pid, p)| (pid, p.command.clone())).collect();
                let gateway_tree = discover_gateway_pid(
                    this.gateway_pid_file.as_deref(),
                    this.gateway_process_name.as_deref(),
                    own_pid,
                    &command_of,
                )
                .map(|root| process_tree(root, &parent_of));

                for event in diff_processes(previous.as_ref(), &current, gateway_tree.as_ref()) {
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

    fn snap(ppid: u32, command: &str) -> ProcSnapshot {
        ProcSnapshot { ppid, command: command.to_string(), user: None, cwd: None }
    }

    #[test]
    fn test_first_scan_is_baseline_only() {
        let current = HashMap::from([(1, snap(0, "init"))]);
        assert!(diff_processes(None, &current, None).is_empty());
    }

    #[test]
    fn test_diff_detects_spawn_and_exit_in_passive_mode() {
        let previous = HashMap::from([(1, snap(0, "init")), (2, snap(1, "bash"))]);
        let current = HashMap::from([(1, snap(0, "init")), (3, snap(1, "curl evil.com"))]);
        let events = diff_processes(Some(&previous), &current, None);
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| matches!(e, WitnessEvent::ProcessSpawned(d) if d.pid == 3)));
        assert!(events.iter().any(|e| matches!(e, WitnessEvent::ProcessExited(d) if d.pid == 2)));
    }

    #[test]
    fn test_gateway_tree_filters_out_of_scope_pids() {
        let previous = HashMap::from([(1, snap(0, "init"))]);
        let current = HashMap::from([(1, snap(0, "init")), (2, snap(1, "in-tree")), (50, snap(0, "unrelated"))]);
        let tree = HashSet::from([1, 2]);
        let events = diff_processes(Some(&previous), &current, Some(&tree));
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], WitnessEvent::ProcessSpawned(d) if d.pid == 2));
    }
}
