//! Append-only, date-bucketed JSONL storage for agenttrust's three record
//! logs (executions, claims, witness observations).
//!
//! Each [`RecordStore`] owns one directory and one filename suffix. Records
//! are appended as one canonical-JSON line per record; readers tolerate a
//! truncated trailing line (treated as EOF) and skip lines that fail to
//! parse rather than aborting the whole file.

#![forbid(unsafe_code)]

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use agenttrust_proto::HashChainRecord;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// `ledger/<date>.agenttrust.jsonl`.
pub const LEDGER_SUFFIX: &str = ".agenttrust.jsonl";
/// `claims/<date>.claims.jsonl`.
pub const CLAIMS_SUFFIX: &str = ".claims.jsonl";
/// `witness/<date>.witness.jsonl`.
pub const WITNESS_SUFFIX: &str = ".witness.jsonl";

/// An append-only, date-bucketed JSONL record store.
///
/// `dir` holds one file per UTC day named `<YYYY-MM-DD><suffix>`. The chain
/// is per-file: callers are expected to pass each file's last known `hash`
/// as the `prevHash` of the next record appended to it.
pub struct RecordStore {
    dir: PathBuf,
    suffix: &'static str,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>, suffix: &'static str) -> Self {
        Self {
            dir: dir.into(),
            suffix,
        }
    }

    /// Create the store's directory with owner-only permissions (mode 0700)
    /// if it doesn't already exist.
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&self.dir)?.permissions();
            perms.set_mode(0o700);
            std::fs::set_permissions(&self.dir, perms)?;
        }
        Ok(())
    }

    /// Path of the file that owns today's (UTC) records.
    pub fn today_file_path(&self) -> PathBuf {
        let today = Utc::now().format("%Y-%m-%d");
        self.dir.join(format!("{today}{}", self.suffix))
    }

    /// Append `record` to today's file, creating the directory and file as
    /// needed. The file is written with owner-only permissions (mode 0600).
    pub fn append<T: Serialize>(&self, record: &HashChainRecord<T>) -> std::io::Result<()> {
        self.ensure_dir()?;
        let path = self.today_file_path();
        let value = serde_json::to_value(record).map_err(std::io::Error::other)?;
        let mut line = agenttrust_proto::canonical_json(&value);
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&line)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    /// Parse every non-empty line of `path`. Lines that fail to parse are
    /// logged and skipped; a missing file yields an empty vec (missing-file
    /// read errors collapse to "empty" per the storage contract).
    pub fn read_file<T: DeserializeOwned>(path: &Path) -> Vec<HashChainRecord<T>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        let mut records = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HashChainRecord<T>>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(path = %path.display(), line = lineno + 1, error = %e, "skipping unparseable record line");
                }
            }
        }
        records
    }

    /// Enumerate this store's files, lexicographically sorted (equal to
    /// chronological order given `YYYY-MM-DD` filenames). A missing
    /// directory collapses to an empty list.
    pub fn list_files(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(self.suffix))
            })
            .collect();
        files.sort();
        files
    }

    /// Read today's file and return its last valid record, or `None` if the
    /// file is missing, empty, or contains no parseable record.
    pub fn get_last_record<T: DeserializeOwned>(&self) -> Option<HashChainRecord<T>> {
        Self::read_file(&self.today_file_path()).into_iter().next_back()
    }

    /// The hash to chain the next append onto: the last record's `hash` if
    /// today's file has one, else the empty string (new chain).
    pub fn last_hash<T: DeserializeOwned>(&self) -> String {
        self.get_last_record::<T>().map(|r| r.hash).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrust_proto::ExecutionPayload;

    fn store(dir: &Path) -> RecordStore {
        RecordStore::new(dir.join("ledger"), LEDGER_SUFFIX)
    }

    #[test]
    fn test_append_then_get_last_record() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let r1 = HashChainRecord::new(ExecutionPayload::test_fixture(), String::new());
        store.append(&r1).unwrap();
        let last = store.get_last_record::<ExecutionPayload>().unwrap();
        assert_eq!(last.id, r1.id);
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        assert!(RecordStore::read_file::<ExecutionPayload>(&store.today_file_path()).is_empty());
    }

    #[test]
    fn test_list_files_filters_by_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        store.ensure_dir().unwrap();
        std::fs::write(store.dir.join("2026-01-01.agenttrust.jsonl"), "").unwrap();
        std::fs::write(store.dir.join("notes.txt"), "").unwrap();
        let files = store.list_files();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_read_file_skips_unparseable_lines_but_keeps_rest() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let r1 = HashChainRecord::new(ExecutionPayload::test_fixture(), String::new());
        store.append(&r1).unwrap();
        let path = store.today_file_path();
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("not json at all\n");
        let r2 = HashChainRecord::new(ExecutionPayload::test_fixture(), r1.hash.clone());
        content.push_str(&String::from_utf8(agenttrust_proto::canonical_json(
            &serde_json::to_value(&r2).unwrap(),
        )).unwrap());
        content.push('\n');
        std::fs::write(&path, content).unwrap();

        let records = RecordStore::read_file::<ExecutionPayload>(&path);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_append_chain_links_prev_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let r1 = HashChainRecord::new(ExecutionPayload::test_fixture(), store.last_hash::<ExecutionPayload>());
        store.append(&r1).unwrap();
        let r2 = HashChainRecord::new(ExecutionPayload::test_fixture(), store.last_hash::<ExecutionPayload>());
        store.append(&r2).unwrap();
        assert_eq!(r2.prev_hash, r1.hash);
    }
}
