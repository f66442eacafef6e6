//! Polling file monitor: snapshots the watched directories, diffs against
//! the prior snapshot, and emits create/modify/delete/access events.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agenttrust_proto::{FileEventData, FileStat, WitnessEvent};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    size: u64,
    mtime: DateTime<Utc>,
    atime: DateTime<Utc>,
}

fn to_utc(t: std::io::Result<std::time::SystemTime>) -> DateTime<Utc> {
    t.map(DateTime::<Utc>::from).unwrap_or(DateTime::UNIX_EPOCH)
}

fn is_excluded(path: &Path, patterns: &[String]) -> bool {
    let s = path.to_string_lossy();
    patterns.iter().any(|p| s.contains(p.as_str()))
}

fn walk(dir: &Path, exclude: &[String], out: &mut HashMap<PathBuf, Snapshot>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if is_excluded(&path, exclude) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_dir() {
            walk(&path, exclude, out);
            continue;
        }
        out.insert(
            path,
            Snapshot {
                size: meta.len(),
                mtime: to_utc(meta.modified()),
                atime: to_utc(meta.accessed()),
            },
        );
    }
}

fn content_hash_prefix(path: &Path) -> Option<String> {
    use std::io::Read;
    let mut file = std::fs::File::open(path).ok()?;
    let mut buf = vec![0u8; 4096];
    let n = file.read(&mut buf).ok()?;
    buf.truncate(n);
    Some(agenttrust_evidence::sha256_hex_bytes(&buf))
}

fn file_stat(snap: &Snapshot, path: &Path) -> FileStat {
    FileStat {
        size_bytes: snap.size,
        mode: unix_mode(path),
        mtime: snap.mtime,
        content_hash_prefix: content_hash_prefix(path),
    }
}

#[cfg(unix)]
fn unix_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).map(|m| m.permissions().mode()).unwrap_or(0)
}
#[cfg(not(unix))]
fn unix_mode(_path: &Path) -> u32 {
    0
}

/// Diff two snapshots into events. `None` for `previous` means this is the
/// first scan: no events are emitted, only the baseline is established.
fn diff(previous: Option<&HashMap<PathBuf, Snapshot>>, current: &HashMap<PathBuf, Snapshot>) -> Vec<WitnessEvent> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    let mut events = Vec::new();
    let now = Utc::now();

    for (path, snap) in current {
        match previous.get(path) {
            None => events.push(WitnessEvent::FileCreated(FileEventData {
                path: path.display().to_string(),
                observed_at: now,
                stat: Some(file_stat(snap, path)),
            })),
            Some(prev) => {
                if prev.mtime != snap.mtime || prev.size != snap.size {
                    events.push(WitnessEvent::FileModified(FileEventData {
                        path: path.display().to_string(),
                        observed_at: now,
                        stat: Some(file_stat(snap, path)),
                    }));
                } else if prev.atime != snap.atime {
                    events.push(WitnessEvent::FileAccessed(FileEventData {
                        path: path.display().to_string(),
                        observed_at: now,
                        stat: None,
                    }));
                }
            }
        }
    }

    for path in previous.keys() {
        if !current.contains_key(path) {
            events.push(WitnessEvent::FileDeleted(FileEventData {
                path: path.display().to_string(),
                observed_at: now,
                stat: None,
            }));
        }
    }

    events
}

pub struct FileMonitor {
    watch_dirs: Vec<PathBuf>,
    exclude: Vec<String>,
    polling_ms: u64,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl FileMonitor {
    pub fn new(watch_dirs: Vec<PathBuf>, exclude: Vec<String>, polling_ms: u64) -> Self {
        Self {
            watch_dirs,
            exclude,
            polling_ms,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    fn scan_once(&self) -> HashMap<PathBuf, Snapshot> {
        let mut snapshot = HashMap::new();
        for dir in &self.watch_dirs {
            walk(dir, &self.exclude, &mut snapshot);
        }
        snapshot
    }

    /// Start polling on the current tokio runtime. Idempotent: a second
    /// `start` while already running is a no-op.
    pub fn start(self: &Arc<Self>, cb: Arc<dyn Fn(WitnessEvent) + Send + Sync>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut previous: Option<HashMap<PathBuf, Snapshot>> = None;
            let mut interval = tokio::time::interval(Duration::from_millis(this.polling_ms));
            while this.running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                let current = this.scan_once();
                for event in diff(previous.as_ref(), &current) {
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

    #[test]
    fn test_first_scan_suppresses_events() {
        let current = HashMap::from([(
            PathBuf::from("/a"),
            Snapshot { size: 1, mtime: Utc::now(), atime: Utc::now() },
        )]);
        assert!(diff(None, &current).is_empty());
    }

    #[test]
    fn test_diff_detects_created_modified_deleted() {
        let now = Utc::now();
        let previous = HashMap::from([
            (PathBuf::from("/unchanged"), Snapshot { size: 1, mtime: now, atime: now }),
            (PathBuf::from("/removed"), Snapshot { size: 1, mtime: now, atime: now }),
        ]);
        let current = HashMap::from([
            (PathBuf::from("/unchanged"), Snapshot { size: 1, mtime: now, atime: now }),
            (PathBuf::from("/new"), Snapshot { size: 2, mtime: now, atime: now }),
        ]);
        let events = diff(Some(&previous), &current);
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| matches!(e, WitnessEvent::FileCreated(d) if d.path == "/new")));
        assert!(events.iter().any(|e| matches!(e, WitnessEvent::FileDeleted(d) if d.path == "/removed")));
    }

    #[test]
    fn test_exclude_pattern_filters_matches() {
        assert!(is_excluded(Path::new("/home/u/.git/index"), &[".git".to_string()]));
        assert!(!is_excluded(Path::new("/home/u/notes.txt"), &[".git".to_string()]));
    }
}
