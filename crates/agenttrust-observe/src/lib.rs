//! Structured observability for the agenttrust core.
//!
//! Provides:
//! - [`OperationsMetrics`] — atomic counters for all key operations
//! - [`MetricsExporter`] — Prometheus text format export
//! - [`AuditLogger`] — structured JSON logging of core operations

#![forbid(unsafe_code)]

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info, warn};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────
// Atomic Counter
// ─────────────────────────────────────────────────────────────

/// A thread-safe u64 counter backed by an atomic.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Increment the counter by one.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Read the current counter value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────
// Operations Metrics
// ─────────────────────────────────────────────────────────────

/// Atomic operation counters for the core's key operations.
///
/// All counters are thread-safe and can be shared via [`Arc`].
///
/// # Example
/// ```rust
/// # use agenttrust_observe::OperationsMetrics;
/// # use std::sync::Arc;
/// let metrics = Arc::new(OperationsMetrics::new());
/// metrics.executions_appended.inc();
/// assert_eq!(metrics.executions_appended.get(), 1);
/// ```
#[derive(Debug, Default)]
pub struct OperationsMetrics {
    /// Total execution records appended to the ledger.
    pub executions_appended: Counter,
    /// Total claim records appended to the ledger.
    pub claims_appended: Counter,
    /// Total append failures (integrity/storage errors).
    pub append_errors: Counter,
    /// Total integrity verification runs.
    pub verifications_total: Counter,
    /// Total integrity verifications that surfaced a chain break.
    pub verification_failures: Counter,
    /// Total rule-engine batch evaluations.
    pub rule_batches_evaluated: Counter,
    /// Total individual rule matches found across all batches.
    pub rule_matches_total: Counter,
    /// Total correlation engine runs.
    pub correlations_run: Counter,
    /// Total correlation findings produced.
    pub correlation_findings_total: Counter,
    /// Total witness daemon buffer flushes.
    pub witness_flushes_total: Counter,
    /// Total witness flush failures (sink threw).
    pub witness_flush_errors: Counter,
    /// Total trust verdicts computed.
    pub verdicts_computed: Counter,
    /// Total digests assembled.
    pub digests_generated: Counter,
}

impl OperationsMetrics {
    /// Create a new zeroed metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful execution append.
    pub fn record_execution_append(&self) {
        self.executions_appended.inc();
        tracing::info!(
            counter = "executions_appended",
            value = self.executions_appended.get(),
            "execution appended"
        );
    }

    /// Record a successful claim append.
    pub fn record_claim_append(&self) {
        self.claims_appended.inc();
        tracing::info!(
            counter = "claims_appended",
            value = self.claims_appended.get(),
            "claim appended"
        );
    }

    /// Record an append failure.
    pub fn record_append_error(&self) {
        self.append_errors.inc();
        tracing::warn!(
            counter = "append_errors",
            value = self.append_errors.get(),
            "append failed"
        );
    }

    /// Record a completed integrity verification run.
    pub fn record_verification(&self, chain_broken: bool) {
        self.verifications_total.inc();
        if chain_broken {
            self.verification_failures.inc();
            warn!(
                counter = "verification_failures",
                value = self.verification_failures.get(),
                "integrity verification found a chain break"
            );
        }
    }

    /// Record a rule-engine batch evaluation producing `match_count` matches.
    pub fn record_rule_batch(&self, match_count: u64) {
        self.rule_batches_evaluated.inc();
        for _ in 0..match_count {
            self.rule_matches_total.inc();
        }
        info!(
            counter = "rule_batches_evaluated",
            value = self.rule_batches_evaluated.get(),
            matches = match_count,
            "rule batch evaluated"
        );
    }

    /// Record a correlation engine run producing `finding_count` findings.
    pub fn record_correlation(&self, finding_count: u64) {
        self.correlations_run.inc();
        for _ in 0..finding_count {
            self.correlation_findings_total.inc();
        }
    }

    /// Record a witness buffer flush.
    pub fn record_witness_flush(&self) {
        self.witness_flushes_total.inc();
    }

    /// Record a witness flush whose sink callback threw.
    pub fn record_witness_flush_error(&self) {
        self.witness_flush_errors.inc();
        error!(
            counter = "witness_flush_errors",
            value = self.witness_flush_errors.get(),
            "witness flush sink failed"
        );
    }

    /// Record a trust verdict computation.
    pub fn record_verdict(&self) {
        self.verdicts_computed.inc();
    }

    /// Record a digest assembly.
    pub fn record_digest(&self) {
        self.digests_generated.inc();
    }
}

// ─────────────────────────────────────────────────────────────
// Metrics Exporter (Prometheus text format)
// ─────────────────────────────────────────────────────────────

/// Exports [`OperationsMetrics`] in Prometheus text format.
pub struct MetricsExporter {
    metrics: Arc<OperationsMetrics>,
    /// Label prefix added to all metric names (default: `agenttrust`).
    prefix: String,
}

impl MetricsExporter {
    /// Create a new exporter wrapping the given metrics.
    pub fn new(metrics: Arc<OperationsMetrics>) -> Self {
        Self {
            metrics,
            prefix: "agenttrust".to_string(),
        }
    }

    /// Create with a custom metric name prefix.
    pub fn with_prefix(metrics: Arc<OperationsMetrics>, prefix: impl Into<String>) -> Self {
        Self {
            metrics,
            prefix: prefix.into(),
        }
    }

    /// Render all metrics as a Prometheus text format string.
    ///
    /// Each metric is rendered with `# HELP`, `# TYPE`, and value lines.
    pub fn render(&self) -> String {
        let m = &self.metrics;
        let p = &self.prefix;
        let mut out = String::new();

        self.write_counter(&mut out, p, "executions_appended", "Total execution records appended", m.executions_appended.get());
        self.write_counter(&mut out, p, "claims_appended", "Total claim records appended", m.claims_appended.get());
        self.write_counter(&mut out, p, "append_errors", "Total append failures", m.append_errors.get());
        self.write_counter(&mut out, p, "verifications_total", "Total integrity verification runs", m.verifications_total.get());
        self.write_counter(&mut out, p, "verification_failures", "Total verifications that found a chain break", m.verification_failures.get());
        self.write_counter(&mut out, p, "rule_batches_evaluated", "Total rule-engine batch evaluations", m.rule_batches_evaluated.get());
        self.write_counter(&mut out, p, "rule_matches_total", "Total rule matches across all batches", m.rule_matches_total.get());
        self.write_counter(&mut out, p, "correlations_run", "Total correlation engine runs", m.correlations_run.get());
        self.write_counter(&mut out, p, "correlation_findings_total", "Total correlation findings produced", m.correlation_findings_total.get());
        self.write_counter(&mut out, p, "witness_flushes_total", "Total witness buffer flushes", m.witness_flushes_total.get());
        self.write_counter(&mut out, p, "witness_flush_errors", "Total witness flush sink failures", m.witness_flush_errors.get());
        self.write_counter(&mut out, p, "verdicts_computed", "Total trust verdicts computed", m.verdicts_computed.get());
        self.write_counter(&mut out, p, "digests_generated", "Total digests assembled", m.digests_generated.get());

        out
    }

    fn write_counter(&self, out: &mut String, prefix: &str, name: &str, help: &str, value: u64) {
        out.push_str(&format!("# HELP {prefix}_{name} {help}\n"));
        out.push_str(&format!("# TYPE {prefix}_{name} counter\n"));
        out.push_str(&format!("{prefix}_{name} {value}\n\n"));
    }
}

// ─────────────────────────────────────────────────────────────
// Audit Logger
// ─────────────────────────────────────────────────────────────

/// Category of core operation being logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Execution record append.
    ExecutionAppend,
    /// Claim record append.
    ClaimAppend,
    /// Integrity verification run.
    Verification,
    /// Rule-engine batch evaluation.
    RuleEvaluation,
    /// Correlation engine run.
    Correlation,
    /// Witness buffer flush.
    WitnessFlush,
    /// Trust verdict computation.
    Verdict,
    /// Digest assembly.
    Digest,
}

/// Outcome of a logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationOutcome {
    /// Completed successfully.
    Success,
    /// Failed with an error.
    Failure,
    /// Completed, but surfaced a finding worth flagging (e.g. a chain break).
    FlaggedFinding,
}

/// A single structured audit log entry for a core operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreAuditEntry {
    /// Unique entry ID.
    pub id: String,
    /// Timestamp when the operation occurred.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Agent or component that initiated the operation.
    pub actor: String,
    /// Operation category.
    pub kind: OperationKind,
    /// Target resource (entry ID, session ID, etc.).
    pub resource_id: Option<String>,
    /// Operation outcome.
    pub outcome: OperationOutcome,
    /// Duration of the operation in milliseconds.
    pub duration_ms: Option<u64>,
    /// Additional structured details.
    pub details: HashMap<String, String>,
}

/// Structured JSON audit logger for core operations.
///
/// Maintains an in-memory log with thread-safe access. Emits structured
/// tracing events for each logged entry.
pub struct AuditLogger {
    entries: RwLock<Vec<CoreAuditEntry>>,
    /// Maximum number of entries to retain in memory.
    max_entries: usize,
}

impl AuditLogger {
    /// Create a new audit logger retaining up to `max_entries` in memory.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            max_entries,
        }
    }

    /// Create with default capacity (10,000 entries).
    pub fn default_capacity() -> Self {
        Self::new(10_000)
    }

    /// Log a core operation.
    pub fn log(
        &self,
        actor: impl Into<String>,
        kind: OperationKind,
        resource_id: Option<&str>,
        outcome: OperationOutcome,
        duration_ms: Option<u64>,
        details: HashMap<String, String>,
    ) {
        let entry = CoreAuditEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            actor: actor.into(),
            kind,
            resource_id: resource_id.map(String::from),
            outcome,
            duration_ms,
            details,
        };

        let details_json = serde_json::to_string(&entry.details).unwrap_or_default();
        match outcome {
            OperationOutcome::Success => {
                info!(
                    audit_id = %entry.id,
                    actor = %entry.actor,
                    kind = ?entry.kind,
                    resource_id = ?entry.resource_id,
                    duration_ms = ?entry.duration_ms,
                    details = %details_json,
                    "core operation succeeded"
                );
            }
            OperationOutcome::Failure => {
                error!(
                    audit_id = %entry.id,
                    actor = %entry.actor,
                    kind = ?entry.kind,
                    resource_id = ?entry.resource_id,
                    details = %details_json,
                    "core operation failed"
                );
            }
            OperationOutcome::FlaggedFinding => {
                warn!(
                    audit_id = %entry.id,
                    actor = %entry.actor,
                    kind = ?entry.kind,
                    resource_id = ?entry.resource_id,
                    details = %details_json,
                    "core operation surfaced a finding"
                );
            }
        }

        let mut entries = self.entries.write();
        entries.push(entry);
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(0..excess);
        }
    }

    /// Query entries filtered by kind and/or actor.
    pub fn query(
        &self,
        kind: Option<OperationKind>,
        actor: Option<&str>,
        limit: usize,
    ) -> Vec<CoreAuditEntry> {
        let entries = self.entries.read();
        entries
            .iter()
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .filter(|e| actor.is_none_or(|a| e.actor == a))
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Return all entries as a JSON array string.
    pub fn to_json(&self) -> String {
        let entries = self.entries.read();
        serde_json::to_string_pretty(&*entries).unwrap_or_else(|_| "[]".to_string())
    }

    /// Total number of entries logged.
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operations_metrics_counters() {
        let m = OperationsMetrics::new();
        assert_eq!(m.executions_appended.get(), 0);

        m.record_execution_append();
        m.record_execution_append();
        assert_eq!(m.executions_appended.get(), 2);

        m.record_append_error();
        assert_eq!(m.append_errors.get(), 1);

        m.record_verification(false);
        m.record_verification(true);
        assert_eq!(m.verifications_total.get(), 2);
        assert_eq!(m.verification_failures.get(), 1);

        m.record_rule_batch(3);
        assert_eq!(m.rule_batches_evaluated.get(), 1);
        assert_eq!(m.rule_matches_total.get(), 3);
    }

    #[test]
    fn test_metrics_exporter_prometheus_format() {
        let metrics = Arc::new(OperationsMetrics::new());
        metrics.record_execution_append();
        metrics.record_execution_append();
        metrics.record_append_error();

        let exporter = MetricsExporter::new(metrics);
        let output = exporter.render();

        assert!(
            output.contains("# HELP agenttrust_executions_appended"),
            "must have HELP line"
        );
        assert!(
            output.contains("# TYPE agenttrust_executions_appended counter"),
            "must have TYPE line"
        );
        assert!(
            output.contains("agenttrust_executions_appended 2"),
            "must have correct count"
        );
        assert!(
            output.contains("agenttrust_append_errors 1"),
            "must have error count"
        );
        assert!(
            output.contains("agenttrust_verdicts_computed 0"),
            "zero counters must appear"
        );
    }

    #[test]
    fn test_metrics_exporter_custom_prefix() {
        let metrics = Arc::new(OperationsMetrics::new());
        let exporter = MetricsExporter::with_prefix(metrics, "myapp");
        let output = exporter.render();
        assert!(
            output.contains("myapp_executions_appended"),
            "custom prefix must be used"
        );
        assert!(
            !output.contains("agenttrust_executions_appended"),
            "default prefix must not appear"
        );
    }

    #[test]
    fn test_audit_logger_log_and_query() {
        let logger = AuditLogger::new(100);

        logger.log(
            "agent-1",
            OperationKind::ExecutionAppend,
            Some("01HF00TESTEXEC"),
            OperationOutcome::Success,
            Some(5),
            HashMap::from([("actionType".to_string(), "file.write".to_string())]),
        );

        logger.log(
            "agent-2",
            OperationKind::Verification,
            None,
            OperationOutcome::FlaggedFinding,
            Some(30),
            HashMap::new(),
        );

        assert_eq!(logger.count(), 2);

        let all = logger.query(None, None, 10);
        assert_eq!(all.len(), 2);

        let by_actor = logger.query(None, Some("agent-1"), 10);
        assert_eq!(by_actor.len(), 1);
        assert_eq!(by_actor[0].outcome, OperationOutcome::Success);

        let verifications = logger.query(Some(OperationKind::Verification), None, 10);
        assert_eq!(verifications.len(), 1);
        assert_eq!(verifications[0].outcome, OperationOutcome::FlaggedFinding);
    }

    #[test]
    fn test_audit_logger_json_output() {
        let logger = AuditLogger::new(100);
        logger.log(
            "witness-daemon",
            OperationKind::WitnessFlush,
            None,
            OperationOutcome::Success,
            Some(12),
            HashMap::new(),
        );

        let json = logger.to_json();
        assert!(
            json.contains("witness_flush"),
            "JSON must contain operation kind"
        );
        assert!(json.contains("success"), "JSON must contain outcome");
        assert!(json.contains("witness-daemon"), "JSON must contain actor");
    }

    #[test]
    fn test_audit_logger_evicts_old_entries() {
        let logger = AuditLogger::new(5);

        for i in 0..10 {
            logger.log(
                "agent",
                OperationKind::ExecutionAppend,
                Some(&format!("entry-{i}")),
                OperationOutcome::Success,
                None,
                HashMap::new(),
            );
        }

        assert_eq!(
            logger.count(),
            5,
            "logger must evict old entries over max_entries"
        );
    }

    #[test]
    fn test_audit_logger_failure_logged() {
        let logger = AuditLogger::new(100);
        logger.log(
            "agent-3",
            OperationKind::ClaimAppend,
            Some("01HF00TESTCLAIM"),
            OperationOutcome::Failure,
            None,
            HashMap::from([("reason".to_string(), "storage write error".to_string())]),
        );

        let failed = logger.query(None, None, 1);
        assert_eq!(failed[0].outcome, OperationOutcome::Failure);
        assert_eq!(failed[0].details["reason"], "storage write error");
    }
}
