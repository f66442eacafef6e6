//! Evidence receipts: pure helpers that fingerprint an action's real-world
//! side effect so it can be embedded in an execution's `meta` and later
//! checked against a witness observation by the correlation engine.

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const CONTENT_HASH_PREFIX_BYTES: usize = 4096;

pub fn sha256_hex_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvidence {
    pub path: String,
    #[serde(rename = "existedBefore")]
    pub existed_before: bool,
    #[serde(rename = "existedAfter")]
    pub existed_after: bool,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    pub mode: u32,
    pub mtime: DateTime<Utc>,
    pub inode: u64,
    #[serde(rename = "contentHashPrefix", skip_serializing_if = "Option::is_none")]
    pub content_hash_prefix: Option<String>,
}

/// Inspect `path`'s current state and fingerprint up to the first 4096 bytes
/// of its content. `existed_before` is supplied by the caller, who observed
/// the path immediately before the action ran.
pub fn file_evidence(path: &Path, existed_before: bool) -> FileEvidence {
    let metadata = std::fs::metadata(path);
    let existed_after = metadata.is_ok();

    let (size_bytes, mode, mtime, inode) = match &metadata {
        Ok(meta) => (meta.len(), unix_mode(meta), mtime_of(meta), unix_inode(meta)),
        Err(_) => (0, 0, DateTime::UNIX_EPOCH, 0),
    };

    let content_hash_prefix = if existed_after {
        File::open(path).ok().and_then(|mut f| {
            let mut buf = vec![0u8; CONTENT_HASH_PREFIX_BYTES];
            let n = f.read(&mut buf).ok()?;
            buf.truncate(n);
            Some(sha256_hex_bytes(&buf))
        })
    } else {
        None
    };

    FileEvidence {
        path: path.display().to_string(),
        existed_before,
        existed_after,
        size_bytes,
        mode,
        mtime,
        inode,
        content_hash_prefix,
    }
}

#[cfg(unix)]
fn unix_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}
#[cfg(not(unix))]
fn unix_mode(_meta: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(unix)]
fn unix_inode(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}
#[cfg(not(unix))]
fn unix_inode(_meta: &std::fs::Metadata) -> u64 {
    0
}

fn mtime_of(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or(DateTime::UNIX_EPOCH)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEvidence {
    pub command: String,
    #[serde(rename = "exitCode", skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(rename = "stdoutLen")]
    pub stdout_len: usize,
    #[serde(rename = "stdoutHash")]
    pub stdout_hash: String,
    #[serde(rename = "stderrPresent")]
    pub stderr_present: bool,
}

pub fn process_evidence(command: &str, exit_code: Option<i32>, pid: Option<u32>, stdout: &[u8], stderr: &[u8]) -> ProcessEvidence {
    ProcessEvidence {
        command: command.to_string(),
        exit_code,
        pid,
        stdout_len: stdout.len(),
        stdout_hash: sha256_hex_bytes(stdout),
        stderr_present: !stderr.is_empty(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEvidence {
    pub url: String,
    pub method: String,
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(rename = "responseSizeBytes")]
    pub response_size_bytes: usize,
    #[serde(rename = "responseHash")]
    pub response_hash: String,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

pub fn network_evidence(url: &str, method: &str, status_code: Option<u16>, response_body: &[u8], duration_ms: u64) -> NetworkEvidence {
    NetworkEvidence {
        url: url.to_string(),
        method: method.to_string(),
        status_code,
        response_size_bytes: response_body.len(),
        response_hash: sha256_hex_bytes(response_body),
        duration_ms,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvidence {
    pub channel: String,
    /// Hash of the recipient/target; the target itself is never persisted.
    #[serde(rename = "targetHash")]
    pub target_hash: String,
    #[serde(rename = "contentLength")]
    pub content_length: usize,
    #[serde(rename = "contentHash", skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(rename = "hasAttachments")]
    pub has_attachments: bool,
}

pub fn message_evidence(channel: &str, target: &str, content: Option<&str>, has_attachments: bool) -> MessageEvidence {
    MessageEvidence {
        channel: channel.to_string(),
        target_hash: sha256_hex_bytes(target.as_bytes()),
        content_length: content.map(str::len).unwrap_or(0),
        content_hash: content.map(|c| sha256_hex_bytes(c.as_bytes())),
        has_attachments,
    }
}
