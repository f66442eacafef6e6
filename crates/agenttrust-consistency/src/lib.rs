//! Claim/execution consistency engine: a four-pass matcher, divergence
//! classification over matched and unmatched pairs, and penalty-table
//! scoring.

#![forbid(unsafe_code)]

use agenttrust_proto::{ActionType, ClaimRecord, ExecutionRecord, ExpectedOutcome, OutcomeStatus};
use chrono::{DateTime, Utc};

/// Which pass of the matcher produced a [`Match`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Explicit,
    Temporal,
    UnmatchedExecution,
    UnmatchedClaim,
}

/// One element of the claim/execution partition: exactly one of `claim` /
/// `execution` is absent only for the two `Unmatched*` kinds.
#[derive(Debug, Clone)]
pub struct Match {
    pub kind: MatchKind,
    pub claim: Option<ClaimRecord>,
    pub execution: Option<ExecutionRecord>,
}

/// Match every execution whose `meta.claimId` names a claim (pass 1), then
/// every remaining execution to the best remaining same-action claim within
/// 30s (pass 2), then emit everything still unconsumed as unmatched (passes
/// 3-4). Every input claim and execution appears in exactly one result
/// element.
pub fn match_claims_to_executions(claims: &[ClaimRecord], executions: &[ExecutionRecord]) -> Vec<Match> {
    let mut claim_consumed = vec![false; claims.len()];
    let mut exec_consumed = vec![false; executions.len()];
    let mut results = Vec::new();

    // Pass 1: explicit.
    for (ei, exec) in executions.iter().enumerate() {
        let Some(claim_id) = exec
            .payload
            .meta
            .as_ref()
            .and_then(|m| m.get("claimId"))
            .and_then(|v| v.as_str())
        else {
            continue;
        };
        if let Some(ci) = claims
            .iter()
            .enumerate()
            .position(|(ci, c)| !claim_consumed[ci] && c.id.to_string() == claim_id)
        {
            results.push(Match {
                kind: MatchKind::Explicit,
                claim: Some(claims[ci].clone()),
                execution: Some(exec.clone()),
            });
            claim_consumed[ci] = true;
            exec_consumed[ei] = true;
        }
    }

    // Pass 2: temporal — smallest positive delta within 30s, ties broken by
    // earliest claim timestamp, then by claim id.
    for (ei, exec) in executions.iter().enumerate() {
        if exec_consumed[ei] {
            continue;
        }
        let mut best: Option<usize> = None;
        for (ci, claim) in claims.iter().enumerate() {
            if claim_consumed[ci] {
                continue;
            }
            if claim.payload.intent.planned_action != exec.payload.action.action_type {
                continue;
            }
            let delta_ms = (exec.ts - claim.ts).num_milliseconds();
            if delta_ms < 0 || delta_ms > 30_000 {
                continue;
            }
            best = Some(match best {
                None => ci,
                Some(current_best) => {
                    if better_temporal_candidate(exec, claim, &claims[current_best]) {
                        ci
                    } else {
                        current_best
                    }
                }
            });
        }
        if let Some(ci) = best {
            results.push(Match {
                kind: MatchKind::Temporal,
                claim: Some(claims[ci].clone()),
                execution: Some(exec.clone()),
            });
            claim_consumed[ci] = true;
            exec_consumed[ei] = true;
        }
    }

    // Pass 3: unmatched executions.
    for (ei, exec) in executions.iter().enumerate() {
        if !exec_consumed[ei] {
            results.push(Match {
                kind: MatchKind::UnmatchedExecution,
                claim: None,
                execution: Some(exec.clone()),
            });
        }
    }

    // Pass 4: unmatched claims.
    for (ci, claim) in claims.iter().enumerate() {
        if !claim_consumed[ci] {
            results.push(Match {
                kind: MatchKind::UnmatchedClaim,
                claim: Some(claim.clone()),
                execution: None,
            });
        }
    }

    results
}

/// `true` if `candidate` beats the current best pick for `exec`: smaller
/// delta, then earlier claim timestamp, then lexicographically smaller id.
fn better_temporal_candidate(exec: &ExecutionRecord, candidate: &ClaimRecord, current_best: &ClaimRecord) -> bool {
    let candidate_delta = (exec.ts - candidate.ts).num_milliseconds();
    let best_delta = (exec.ts - current_best.ts).num_milliseconds();
    match candidate_delta.cmp(&best_delta) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => match candidate.ts.cmp(&current_best.ts) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => candidate.id.to_string() < current_best.id.to_string(),
        },
    }
}

/// Divergence classes, one per consistency-breaking condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceType {
    UnclaimedExecution,
    UnfulfilledClaim,
    TargetMismatch,
    ActionTypeMismatch,
    RiskUnderestimate,
    ScopeViolation,
    EscalationUndeclared,
    OutcomeUnexpected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DivergenceSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Divergence {
    pub kind: DivergenceType,
    pub severity: DivergenceSeverity,
    pub claim_id: Option<String>,
    pub execution_id: Option<String>,
    pub detail: String,
}

const ESCALATION_OR_PAYMENT: [ActionType; 4] = [
    ActionType::ElevatedEnable,
    ActionType::ElevatedCommand,
    ActionType::PaymentInitiate,
    ActionType::PaymentConfirm,
];

/// Classify every matched result into zero or more divergences.
pub fn detect_divergences(matches: &[Match]) -> Vec<Divergence> {
    let mut out = Vec::new();
    for m in matches {
        match (&m.claim, &m.execution) {
            (None, Some(exec)) => {
                let severity = if exec.payload.risk.score < 3 {
                    DivergenceSeverity::Info
                } else {
                    DivergenceSeverity::Warning
                };
                out.push(Divergence {
                    kind: DivergenceType::UnclaimedExecution,
                    severity,
                    claim_id: None,
                    execution_id: Some(exec.id.to_string()),
                    detail: "execution has no paired claim".to_string(),
                });
            }
            (Some(claim), None) => {
                out.push(Divergence {
                    kind: DivergenceType::UnfulfilledClaim,
                    severity: DivergenceSeverity::Warning,
                    claim_id: Some(claim.id.to_string()),
                    execution_id: None,
                    detail: "claim was never fulfilled by an execution".to_string(),
                });
            }
            (Some(claim), Some(exec)) => {
                out.extend(detect_pair_divergences(claim, exec));
            }
            (None, None) => {}
        }
    }
    out
}

fn detect_pair_divergences(claim: &ClaimRecord, exec: &ExecutionRecord) -> Vec<Divergence> {
    let mut out = Vec::new();
    let claim_id = Some(claim.id.to_string());
    let execution_id = Some(exec.id.to_string());

    if claim.payload.intent.planned_target != exec.payload.action.target {
        let severity = if exec.payload.risk.score >= 7 {
            DivergenceSeverity::Critical
        } else {
            DivergenceSeverity::Warning
        };
        out.push(Divergence {
            kind: DivergenceType::TargetMismatch,
            severity,
            claim_id: claim_id.clone(),
            execution_id: execution_id.clone(),
            detail: format!(
                "claimed target {:?} does not match executed target {:?}",
                claim.payload.intent.planned_target, exec.payload.action.target
            ),
        });
    }

    if claim.payload.intent.planned_action != exec.payload.action.action_type {
        out.push(Divergence {
            kind: DivergenceType::ActionTypeMismatch,
            severity: DivergenceSeverity::Critical,
            claim_id: claim_id.clone(),
            execution_id: execution_id.clone(),
            detail: format!(
                "claimed action {} does not match executed action {}",
                claim.payload.intent.planned_action, exec.payload.action.action_type
            ),
        });
    }

    if exec.payload.risk.score as i32 - claim.payload.intent.self_assessed_risk as i32 >= 3 {
        out.push(Divergence {
            kind: DivergenceType::RiskUnderestimate,
            severity: DivergenceSeverity::Warning,
            claim_id: claim_id.clone(),
            execution_id: execution_id.clone(),
            detail: "executed risk exceeds self-assessed risk by 3 or more".to_string(),
        });
    }

    let action_type = exec.payload.action.action_type;
    let scope_violated = claim.payload.constraints.within_scope
        && (ESCALATION_OR_PAYMENT.contains(&action_type)
            || ((action_type == ActionType::MessageSend || action_type == ActionType::SessionSend)
                && !claim.payload.constraints.involves_external_comms));
    if scope_violated {
        out.push(Divergence {
            kind: DivergenceType::ScopeViolation,
            severity: DivergenceSeverity::Critical,
            claim_id: claim_id.clone(),
            execution_id: execution_id.clone(),
            detail: "claim asserted in-scope but the execution escalates, pays, or reaches outside declared comms".to_string(),
        });
    }

    if !claim.payload.constraints.requires_elevation
        && matches!(action_type, ActionType::ElevatedEnable | ActionType::ElevatedCommand)
    {
        out.push(Divergence {
            kind: DivergenceType::EscalationUndeclared,
            severity: DivergenceSeverity::Critical,
            claim_id: claim_id.clone(),
            execution_id: execution_id.clone(),
            detail: "execution escalates privileges but the claim did not declare requiresElevation".to_string(),
        });
    }

    if claim.payload.intent.expected_outcome == ExpectedOutcome::Success
        && matches!(exec.payload.outcome.status, OutcomeStatus::Failure | OutcomeStatus::Blocked)
    {
        out.push(Divergence {
            kind: DivergenceType::OutcomeUnexpected,
            severity: DivergenceSeverity::Info,
            claim_id,
            execution_id,
            detail: "claim expected success but the execution failed or was blocked".to_string(),
        });
    }

    out
}

fn penalty(divergence: &Divergence) -> i32 {
    use DivergenceSeverity::{Critical, Info, Warning};
    use DivergenceType::*;
    match (divergence.kind, divergence.severity) {
        (ActionTypeMismatch, _) => 15,
        (ScopeViolation, _) => 15,
        (EscalationUndeclared, _) => 20,
        (TargetMismatch, Critical) => 10,
        (TargetMismatch, Warning) | (TargetMismatch, Info) => 5,
        (RiskUnderestimate, _) => 5,
        (UnclaimedExecution, Info) => 2,
        (UnclaimedExecution, Warning) | (UnclaimedExecution, Critical) => 5,
        (UnfulfilledClaim, _) => 3,
        (OutcomeUnexpected, _) => 1,
    }
}

/// Start at 100, subtract each divergence's fixed penalty, floor at 0.
pub fn consistency_score(divergences: &[Divergence]) -> u8 {
    let mut score: i32 = 100;
    for d in divergences {
        score -= penalty(d);
    }
    score.clamp(0, 100) as u8
}

/// Bundled matcher + divergence + score output for a date range.
#[derive(Debug, Clone)]
pub struct ConsistencyReport {
    pub matches: Vec<Match>,
    pub divergences: Vec<Divergence>,
    pub score: u8,
}

/// Run the full consistency pipeline, optionally restricting both inputs to
/// a `[from, to]` window first.
pub fn generate_consistency_report(
    claims: &[ClaimRecord],
    executions: &[ExecutionRecord],
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> ConsistencyReport {
    let (claims, executions): (Vec<ClaimRecord>, Vec<ExecutionRecord>) = match range {
        Some((from, to)) => (
            claims.iter().filter(|c| c.ts >= from && c.ts <= to).cloned().collect(),
            executions.iter().filter(|e| e.ts >= from && e.ts <= to).cloned().collect(),
        ),
        None => (claims.to_vec(), executions.to_vec()),
    };
    let matches = match_claims_to_executions(&claims, &executions);
    let divergences = detect_divergences(&matches);
    let score = consistency_score(&divergences);
    ConsistencyReport { matches, divergences, score }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrust_proto::{ClaimPayload, ExecutionPayload};
    use chrono::Duration;

    fn claim_at(ts: DateTime<Utc>) -> ClaimRecord {
        let mut r = ClaimRecord::new(ClaimPayload::test_fixture(), String::new());
        r.ts = ts;
        r
    }

    fn exec_at(ts: DateTime<Utc>) -> ExecutionRecord {
        let mut r = ExecutionRecord::new(ExecutionPayload::test_fixture(), String::new());
        r.ts = ts;
        r
    }

    #[test]
    fn test_explicit_match_via_claim_id() {
        let claim = claim_at(Utc::now());
        let mut exec = exec_at(Utc::now());
        exec.payload.meta = Some(serde_json::json!({ "claimId": claim.id.to_string() }));

        let matches = match_claims_to_executions(&[claim.clone()], &[exec.clone()]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].kind, MatchKind::Explicit);
    }

    #[test]
    fn test_temporal_match_within_window() {
        let now = Utc::now();
        let claim = claim_at(now);
        let exec = exec_at(now + Duration::seconds(10));
        let matches = match_claims_to_executions(&[claim], &[exec]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].kind, MatchKind::Temporal);
    }

    #[test]
    fn test_partition_covers_every_input_exactly_once() {
        let now = Utc::now();
        let claims = vec![claim_at(now), claim_at(now + Duration::minutes(5))];
        let executions = vec![exec_at(now + Duration::seconds(5))];
        let matches = match_claims_to_executions(&claims, &executions);

        let claim_count: usize = matches.iter().filter(|m| m.claim.is_some()).count();
        let exec_count: usize = matches.iter().filter(|m| m.execution.is_some()).count();
        assert_eq!(claim_count, claims.len());
        assert_eq!(exec_count, executions.len());
    }

    #[test]
    fn test_scope_violation_and_action_type_mismatch_s3() {
        let now = Utc::now();
        let mut claim_payload = ClaimPayload::test_fixture();
        claim_payload.intent.planned_target = "/tmp/safe".to_string();
        claim_payload.constraints.within_scope = true;
        claim_payload.constraints.involves_external_comms = false;
        let mut claim = ClaimRecord::new(claim_payload, String::new());
        claim.ts = now;

        let mut exec_payload = ExecutionPayload::test_fixture();
        exec_payload.action.action_type = ActionType::MessageSend;
        exec_payload.action.target = "user@x.com".to_string();
        exec_payload.session = claim.payload.session.clone();
        exec_payload.meta = Some(serde_json::json!({ "claimId": claim.id.to_string() }));
        let mut exec = ExecutionRecord::new(exec_payload, String::new());
        exec.ts = now + Duration::seconds(5);

        let matches = match_claims_to_executions(&[claim], &[exec]);
        let divergences = detect_divergences(&matches);
        assert!(divergences.iter().any(|d| d.kind == DivergenceType::ActionTypeMismatch && d.severity == DivergenceSeverity::Critical));
        assert!(divergences.iter().any(|d| d.kind == DivergenceType::ScopeViolation && d.severity == DivergenceSeverity::Critical));
    }

    #[test]
    fn test_consistency_score_rollup_s6() {
        // integrity/witness aren't scored here; this exercises the penalty table in isolation.
        let divergences = vec![Divergence {
            kind: DivergenceType::RiskUnderestimate,
            severity: DivergenceSeverity::Warning,
            claim_id: None,
            execution_id: None,
            detail: String::new(),
        }];
        assert_eq!(consistency_score(&divergences), 95);
    }
}
