//! Integrity verification: per-record self-hash checks plus per-file chain
//! walks, aggregated across every file in a [`RecordStore`].
//!
//! Verification is structural — it operates on raw JSON values rather than a
//! typed payload, since `hash`/`prevHash` checking never needs to know
//! whether a line is an execution, claim, or witness record.

use std::path::{Path, PathBuf};

use agenttrust_persist::RecordStore;
use serde_json::Value;

/// The kind of problem found at a specific `(file, line)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityErrorKind {
    HashMismatch,
    ChainBroken,
    ParseError,
}

impl IntegrityErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HashMismatch => "hash_mismatch",
            Self::ChainBroken => "chain_broken",
            Self::ParseError => "parse_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntegrityError {
    pub file: PathBuf,
    pub line: usize,
    pub kind: IntegrityErrorKind,
    pub detail: String,
}

/// Result of verifying a single file.
#[derive(Debug, Clone, Default)]
pub struct FileVerification {
    pub entries: usize,
    pub errors: Vec<IntegrityError>,
}

/// Result of verifying every file in a store.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub valid: bool,
    pub files_checked: usize,
    pub total_entries: usize,
    pub errors: Vec<IntegrityError>,
}

/// Integrity has no partial credit: 100 if `report.errors` is empty, else 0.
pub fn integrity_score(report: &IntegrityReport) -> u8 {
    if report.errors.is_empty() { 100 } else { 0 }
}

/// Re-hash every record in `path` and walk the chain. Records that fail to
/// parse are reported as `parse_error`s and the walk continues, except for a
/// truncated trailing line (a write caught mid-flush), which is silently
/// treated as EOF.
pub fn verify_file(path: &Path) -> FileVerification {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return FileVerification::default(),
    };

    let non_empty: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| (i + 1, l))
        .collect();
    let last_idx = non_empty.len().saturating_sub(1);

    let mut errors = Vec::new();
    let mut parsed: Vec<(usize, Value)> = Vec::new();
    for (idx, (lineno, line)) in non_empty.iter().enumerate() {
        match serde_json::from_str::<Value>(line) {
            Ok(value) => parsed.push((*lineno, value)),
            Err(e) => {
                if idx == last_idx {
                    continue;
                }
                errors.push(IntegrityError {
                    file: path.to_path_buf(),
                    line: *lineno,
                    kind: IntegrityErrorKind::ParseError,
                    detail: e.to_string(),
                });
            }
        }
    }

    for (lineno, value) in &parsed {
        match value.get("hash").and_then(Value::as_str) {
            Some(stored) => match agenttrust_proto::hash_of(value) {
                Ok(recomputed) if recomputed == stored => {}
                Ok(_) => errors.push(IntegrityError {
                    file: path.to_path_buf(),
                    line: *lineno,
                    kind: IntegrityErrorKind::HashMismatch,
                    detail: "recomputed hash does not match stored hash".to_string(),
                }),
                Err(e) => errors.push(IntegrityError {
                    file: path.to_path_buf(),
                    line: *lineno,
                    kind: IntegrityErrorKind::ParseError,
                    detail: e.to_string(),
                }),
            },
            None => errors.push(IntegrityError {
                file: path.to_path_buf(),
                line: *lineno,
                kind: IntegrityErrorKind::ParseError,
                detail: "record missing hash field".to_string(),
            }),
        }
    }

    let mut expected_prev: Option<String> = None;
    for (lineno, value) in &parsed {
        let this_prev = value.get("prevHash").and_then(Value::as_str).unwrap_or("");
        let broken = match &expected_prev {
            None => !this_prev.is_empty(),
            Some(expected) => this_prev != expected,
        };
        if broken {
            errors.push(IntegrityError {
                file: path.to_path_buf(),
                line: *lineno,
                kind: IntegrityErrorKind::ChainBroken,
                detail: format!("prevHash does not match prior record's hash (expected {:?})", expected_prev),
            });
        }
        expected_prev = value.get("hash").and_then(Value::as_str).map(str::to_string);
    }

    FileVerification {
        entries: parsed.len(),
        errors,
    }
}

/// Verify every file in `store`, aggregating into one report.
pub fn verify_all(store: &RecordStore) -> IntegrityReport {
    let files = store.list_files();
    let mut report = IntegrityReport {
        valid: true,
        files_checked: files.len(),
        total_entries: 0,
        errors: Vec::new(),
    };
    for file in files {
        let result = verify_file(&file);
        report.total_entries += result.entries;
        report.errors.extend(result.errors);
    }
    report.valid = report.errors.is_empty();
    report
}
