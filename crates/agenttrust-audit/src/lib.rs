//! Execution and claim record construction, validation, and integrity
//! verification for the append-only hash-chained ledgers.
//!
//! Records are cryptographically chained — tampering with any record, or
//! reordering records, breaks the chain and surfaces at `verify_all`.

#![forbid(unsafe_code)]

pub mod error;
pub mod integrity;

pub use error::{AuditError, AuditResult};
pub use integrity::{IntegrityError, IntegrityErrorKind, IntegrityReport, integrity_score, verify_all, verify_file};

use std::path::Path;

use agenttrust_persist::{CLAIMS_SUFFIX, LEDGER_SUFFIX, RecordStore};
use agenttrust_proto::{ClaimPayload, ClaimRecord, ExecutionPayload, ExecutionRecord};
use tracing::info;

/// Build a fresh execution record chained onto `prev_hash`.
pub fn create_execution(input: ExecutionPayload, prev_hash: String) -> ExecutionRecord {
    ExecutionRecord::new(input, prev_hash)
}

/// Build a fresh claim record chained onto `prev_hash`.
pub fn create_claim(input: ClaimPayload, prev_hash: String) -> ClaimRecord {
    ClaimRecord::new(input, prev_hash)
}

/// Required-field, enum-range, and risk-score-range checks for an execution
/// record. Enum membership itself is enforced by the type system at parse
/// time; this checks the bounds serde can't express (`0..=10` risk scores,
/// non-empty identifiers) and the `autoFlagged` invariant.
pub fn validate_execution(record: &ExecutionRecord) -> bool {
    let payload = &record.payload;
    if payload.agent.is_empty() || payload.session.is_empty() {
        return false;
    }
    if payload.risk.score > 10 {
        return false;
    }
    if payload.risk.auto_flagged != (payload.risk.score >= 7) {
        return false;
    }
    true
}

/// Required-field and risk-score-range checks for a claim record.
pub fn validate_claim(record: &ClaimRecord) -> bool {
    let payload = &record.payload;
    if payload.agent.is_empty() || payload.session.is_empty() {
        return false;
    }
    if payload.intent.self_assessed_risk > 10 {
        return false;
    }
    true
}

/// JSON-parse and validate one line as an execution record. Returns `None`
/// on either a parse failure or a validation failure.
pub fn parse_execution_line(line: &str) -> Option<ExecutionRecord> {
    let record: ExecutionRecord = serde_json::from_str(line).ok()?;
    validate_execution(&record).then_some(record)
}

/// JSON-parse and validate one line as a claim record.
pub fn parse_claim_line(line: &str) -> Option<ClaimRecord> {
    let record: ClaimRecord = serde_json::from_str(line).ok()?;
    validate_claim(&record).then_some(record)
}

/// The execution ledger: validates before append, chains onto the prior
/// record in today's file.
pub struct ExecutionLog {
    store: RecordStore,
}

impl ExecutionLog {
    pub fn new(workspace: &Path) -> Self {
        Self {
            store: RecordStore::new(workspace.join(".agenttrust").join("ledger"), LEDGER_SUFFIX),
        }
    }

    pub fn append(&self, input: ExecutionPayload) -> AuditResult<ExecutionRecord> {
        let prev_hash = self.store.last_hash::<ExecutionPayload>();
        let record = create_execution(input, prev_hash);
        if !validate_execution(&record) {
            return Err(AuditError::Validation("execution record failed validation".to_string()));
        }
        self.store.append(&record)?;
        info!(record_id = %record.id, agent = %record.payload.agent, "execution appended");
        Ok(record)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn verify_all(&self) -> IntegrityReport {
        verify_all(&self.store)
    }
}

/// The claim ledger: same shape as [`ExecutionLog`], separate directory and
/// chain.
pub struct ClaimLog {
    store: RecordStore,
}

impl ClaimLog {
    pub fn new(workspace: &Path) -> Self {
        Self {
            store: RecordStore::new(workspace.join(".agenttrust").join("claims"), CLAIMS_SUFFIX),
        }
    }

    pub fn append(&self, input: ClaimPayload) -> AuditResult<ClaimRecord> {
        let prev_hash = self.store.last_hash::<ClaimPayload>();
        let record = create_claim(input, prev_hash);
        if !validate_claim(&record) {
            return Err(AuditError::Validation("claim record failed validation".to_string()));
        }
        self.store.append(&record)?;
        info!(record_id = %record.id, agent = %record.payload.agent, "claim appended");
        Ok(record)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn verify_all(&self) -> IntegrityReport {
        verify_all(&self.store)
    }
}
