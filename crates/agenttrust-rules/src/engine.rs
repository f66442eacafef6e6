//! Batch rule evaluation and the three canonical config presets.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};

use agenttrust_proto::{ClaimRecord, ExecutionRecord};
use chrono::Duration;
use tracing::warn;

use crate::catalog::{Rule, default_catalog};
use crate::types::{RuleCategory, RuleConfig, RuleContext, RuleMatch, Severity};

/// Aggregate result of running every enabled rule over every entry.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub entries_evaluated: usize,
    pub total_matches: usize,
    pub matches_by_severity: HashMap<Severity, u32>,
    pub matches_by_category: HashMap<RuleCategory, u32>,
    pub matches: Vec<RuleMatch>,
}

fn rule_enabled(rule: &dyn Rule, config: &RuleConfig) -> bool {
    config
        .rule_overrides
        .get(rule.id())
        .copied()
        .unwrap_or_else(|| rule.enabled_by_default())
}

fn claim_for_entry<'a>(entry: &ExecutionRecord, claims: &'a [ClaimRecord]) -> Option<&'a ClaimRecord> {
    let claim_id = entry.payload.meta.as_ref()?.get("claimId")?.as_str()?;
    claims.iter().find(|c| c.id.to_string() == claim_id)
}

/// Evaluate `rules` against `entries` in input order, building each entry's
/// context (session history, recent-entries window, paired claim, known
/// targets) as it goes. A rule that panics is logged and skipped; it never
/// aborts the batch.
pub fn evaluate_batch(
    entries: &[ExecutionRecord],
    claims: &[ClaimRecord],
    rules: &[Box<dyn Rule>],
    config: &RuleConfig,
) -> BatchReport {
    let sensitive_patterns = config.compiled_sensitive_patterns();
    let mut known_targets: HashSet<String> = HashSet::new();
    let mut report = BatchReport {
        entries_evaluated: entries.len(),
        ..Default::default()
    };

    for (i, entry) in entries.iter().enumerate() {
        let session_history: Vec<ExecutionRecord> = entries[..=i]
            .iter()
            .filter(|e| e.payload.session == entry.payload.session)
            .cloned()
            .collect();
        let window_start = entry.ts - Duration::hours(1);
        let recent_entries: Vec<ExecutionRecord> = entries[..=i]
            .iter()
            .filter(|e| e.ts >= window_start && e.ts <= entry.ts)
            .cloned()
            .collect();
        let paired_claim = claim_for_entry(entry, claims);

        let ctx = RuleContext {
            session_history: &session_history,
            recent_entries: &recent_entries,
            paired_claim,
            known_targets: &known_targets,
            config,
            sensitive_patterns: &sensitive_patterns,
        };

        for rule in rules {
            if !rule_enabled(rule.as_ref(), config) {
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(entry, &ctx)));
            match outcome {
                Ok(Some(m)) => {
                    *report.matches_by_severity.entry(m.severity).or_insert(0) += 1;
                    *report.matches_by_category.entry(m.category).or_insert(0) += 1;
                    report.matches.push(m);
                }
                Ok(None) => {}
                Err(_) => {
                    warn!(rule_id = rule.id(), entry_id = %entry.id, "rule evaluation panicked, skipping");
                }
            }
        }

        known_targets.insert(entry.payload.action.target.clone());
    }

    report.total_matches = report.matches.len();
    report
}

const DEFAULT_SENSITIVE_PATTERNS: &[&str] = &[
    r"\.ssh/",
    r"\.pem$",
    r"\.key$",
    r"\.env",
    r"credentials",
    r"secrets",
    r"password",
    r"keychain",
    r"vault",
];

impl RuleConfig {
    /// Balanced defaults: every rule enabled, moderate thresholds.
    pub fn default_preset() -> Self {
        Self {
            risk_threshold: 7,
            max_actions_per_minute: 30,
            sensitive_path_patterns: DEFAULT_SENSITIVE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            sensitive_domains: Vec::new(),
            rule_overrides: HashMap::new(),
        }
    }

    /// Lower thresholds, every rule enabled — for higher-scrutiny deployments.
    pub fn strict_preset() -> Self {
        Self {
            risk_threshold: 5,
            max_actions_per_minute: 15,
            ..Self::default_preset()
        }
    }

    /// Only escalation, credential, and destructive rules enabled; everything
    /// else disabled and thresholds relaxed — for low-noise deployments.
    pub fn minimal_preset() -> Self {
        let mut overrides = HashMap::new();
        for rule in default_catalog() {
            let keep = matches!(rule.category(), RuleCategory::Escalation | RuleCategory::Credential | RuleCategory::Destructive);
            overrides.insert(rule.id().to_string(), keep);
        }
        Self {
            risk_threshold: 9,
            max_actions_per_minute: 100,
            rule_overrides: overrides,
            ..Self::default_preset()
        }
    }
}
