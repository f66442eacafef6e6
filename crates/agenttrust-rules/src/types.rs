//! Rule catalog's shared vocabulary: category/severity enums, a rule match,
//! engine configuration, and the evaluation context passed to every rule.

use std::collections::{HashMap, HashSet};

use agenttrust_proto::{ClaimRecord, ExecutionRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Financial,
    Credential,
    Communication,
    Escalation,
    DataExfil,
    ScopeDrift,
    Frequency,
    Destructive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A single rule's positive evaluation against one entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: String,
    pub rule_name: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub risk_contribution: u8,
    pub description: String,
    pub entry_id: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub evidence: serde_json::Map<String, serde_json::Value>,
}

/// Engine-wide configuration: thresholds, sensitive patterns, and per-rule
/// enable/disable overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub risk_threshold: u8,
    pub max_actions_per_minute: u32,
    /// Regex strings, matched case-insensitively against action targets.
    pub sensitive_path_patterns: Vec<String>,
    pub sensitive_domains: Vec<String>,
    pub rule_overrides: HashMap<String, bool>,
}

impl RuleConfig {
    /// Compile `sensitive_path_patterns` once per batch; invalid patterns are
    /// dropped rather than failing the whole batch.
    pub fn compiled_sensitive_patterns(&self) -> Vec<Regex> {
        self.sensitive_path_patterns
            .iter()
            .filter_map(|p| regex::RegexBuilder::new(p).case_insensitive(true).build().ok())
            .collect()
    }
}

/// Per-entry evaluation context built fresh for each entry in a batch.
pub struct RuleContext<'a> {
    /// All prior entries in the same session, up to and including the current one.
    pub session_history: &'a [ExecutionRecord],
    /// All prior entries in the trailing one-hour window.
    pub recent_entries: &'a [ExecutionRecord],
    /// The claim referenced by `entry.meta.claimId`, if any.
    pub paired_claim: Option<&'a ClaimRecord>,
    /// Targets seen in entries strictly before this one.
    pub known_targets: &'a HashSet<String>,
    pub config: &'a RuleConfig,
    pub sensitive_patterns: &'a [Regex],
}
