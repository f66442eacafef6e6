//! Date-range digest assembly: run the rule and consistency engines over a
//! window of executions and claims, then summarize counts by action type,
//! risk bucket, and outcome status for the out-of-core renderer.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use agenttrust_consistency::generate_consistency_report;
use agenttrust_proto::{ClaimRecord, ExecutionRecord, OutcomeStatus};
use agenttrust_rules::RuleMatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBucket {
    Low,
    Medium,
    High,
    Critical,
}

/// `low<4, medium<7, high<9, critical>=9`.
pub fn risk_bucket(score: u8) -> RiskBucket {
    if score < 4 {
        RiskBucket::Low
    } else if score < 7 {
        RiskBucket::Medium
    } else if score < 9 {
        RiskBucket::High
    } else {
        RiskBucket::Critical
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub success: usize,
    pub failure: usize,
    pub partial: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub execution_count: usize,
    pub claim_count: usize,
    pub by_action_type: BTreeMap<String, usize>,
    pub by_risk_bucket: BTreeMap<RiskBucket, usize>,
    pub by_status: StatusCounts,
    pub consistency_score: u8,
    pub divergence_count: usize,
    pub rule_match_count: usize,
}

/// Collect executions and claims for `[range_start, range_end]`, run the
/// consistency engine over them, and fold in rule-match counts the caller
/// already computed for that same window.
pub fn generate_digest(
    executions: &[ExecutionRecord],
    claims: &[ClaimRecord],
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    rule_matches: &[RuleMatch],
) -> Digest {
    let windowed_executions: Vec<ExecutionRecord> = executions.iter().filter(|e| e.ts >= range_start && e.ts <= range_end).cloned().collect();
    let windowed_claims: Vec<ClaimRecord> = claims.iter().filter(|c| c.ts >= range_start && c.ts <= range_end).cloned().collect();

    let mut by_action_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_risk_bucket: BTreeMap<RiskBucket, usize> = BTreeMap::new();
    let mut by_status = StatusCounts::default();

    for execution in &windowed_executions {
        *by_action_type.entry(execution.payload.action.action_type.as_str().to_string()).or_insert(0) += 1;
        *by_risk_bucket.entry(risk_bucket(execution.payload.risk.score)).or_insert(0) += 1;
        match execution.payload.outcome.status {
            OutcomeStatus::Success => by_status.success += 1,
            OutcomeStatus::Failure => by_status.failure += 1,
            OutcomeStatus::Partial => by_status.partial += 1,
            OutcomeStatus::Blocked => by_status.blocked += 1,
        }
    }

    let consistency_report = generate_consistency_report(&windowed_claims, &windowed_executions, Some((range_start, range_end)));

    Digest {
        range_start,
        range_end,
        execution_count: windowed_executions.len(),
        claim_count: windowed_claims.len(),
        by_action_type,
        by_risk_bucket,
        by_status,
        consistency_score: consistency_report.score,
        divergence_count: consistency_report.divergences.len(),
        rule_match_count: rule_matches.len(),
    }
}
