//! The 14-rule detector catalog.

use agenttrust_proto::{ActionType, ExecutionRecord};
use serde_json::json;

use crate::types::{RuleCategory, RuleContext, RuleMatch, Severity};

/// A pluggable risk detector.
pub trait Rule: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn category(&self) -> RuleCategory;
    fn severity(&self) -> Severity;
    fn description(&self) -> &'static str;
    fn enabled_by_default(&self) -> bool {
        true
    }
    fn evaluate(&self, entry: &ExecutionRecord, ctx: &RuleContext) -> Option<RuleMatch>;
}

fn base_match(rule: &dyn Rule, entry: &ExecutionRecord, severity: Severity, contribution: u8) -> RuleMatch {
    RuleMatch {
        rule_id: rule.id().to_string(),
        rule_name: rule.name().to_string(),
        category: rule.category(),
        severity,
        risk_contribution: contribution,
        description: rule.description().to_string(),
        entry_id: entry.id.to_string(),
        evidence: serde_json::Map::new(),
    }
}

const FINANCIAL_API_TERMS: [&str; 9] = [
    "payment", "stripe", "paypal", "venmo", "banking", "checkout", "billing", "invoice", "transaction",
];

fn matches_any_pattern(patterns: &[regex::Regex], haystack: &str) -> bool {
    patterns.iter().any(|p| p.is_match(haystack))
}

// ─── fin-001 ───────────────────────────────────────────────────────────────

pub struct Fin001;
impl Rule for Fin001 {
    fn id(&self) -> &'static str {
        "fin-001"
    }
    fn name(&self) -> &'static str {
        "payment action"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Financial
    }
    fn severity(&self) -> Severity {
        Severity::High
    }
    fn description(&self) -> &'static str {
        "action type is a payment operation"
    }
    fn evaluate(&self, entry: &ExecutionRecord, _ctx: &RuleContext) -> Option<RuleMatch> {
        entry
            .payload
            .action
            .action_type
            .starts_with("payment.")
            .then(|| base_match(self, entry, self.severity(), 8))
    }
}

// ─── fin-002 ───────────────────────────────────────────────────────────────

pub struct Fin002;
impl Rule for Fin002 {
    fn id(&self) -> &'static str {
        "fin-002"
    }
    fn name(&self) -> &'static str {
        "api call to financial-looking target"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Financial
    }
    fn severity(&self) -> Severity {
        Severity::High
    }
    fn description(&self) -> &'static str {
        "api.call target references a payment provider or financial term"
    }
    fn evaluate(&self, entry: &ExecutionRecord, _ctx: &RuleContext) -> Option<RuleMatch> {
        if entry.payload.action.action_type != ActionType::ApiCall {
            return None;
        }
        let target = entry.payload.action.target.to_lowercase();
        FINANCIAL_API_TERMS
            .iter()
            .any(|term| target.contains(term))
            .then(|| base_match(self, entry, self.severity(), 7))
    }
}

// ─── cred-001 ──────────────────────────────────────────────────────────────

pub struct Cred001;
impl Rule for Cred001 {
    fn id(&self) -> &'static str {
        "cred-001"
    }
    fn name(&self) -> &'static str {
        "ssh key or private key file read"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Credential
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
    fn description(&self) -> &'static str {
        "file.read targets an SSH directory entry or a .pem/.key file"
    }
    fn evaluate(&self, entry: &ExecutionRecord, _ctx: &RuleContext) -> Option<RuleMatch> {
        if entry.payload.action.action_type != ActionType::FileRead {
            return None;
        }
        let target = entry.payload.action.target.to_lowercase();
        (target.contains(".ssh/") || target.ends_with(".pem") || target.ends_with(".key"))
            .then(|| base_match(self, entry, self.severity(), 9))
    }
}

// ─── cred-002 ──────────────────────────────────────────────────────────────

pub struct Cred002;
impl Rule for Cred002 {
    fn id(&self) -> &'static str {
        "cred-002"
    }
    fn name(&self) -> &'static str {
        "credential-like file read"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Credential
    }
    fn severity(&self) -> Severity {
        Severity::High
    }
    fn description(&self) -> &'static str {
        "file.read targets a .env, credentials, secrets, or tokens file"
    }
    fn evaluate(&self, entry: &ExecutionRecord, _ctx: &RuleContext) -> Option<RuleMatch> {
        if entry.payload.action.action_type != ActionType::FileRead {
            return None;
        }
        let target = entry.payload.action.target.to_lowercase();
        [".env", "credentials", "secrets", "tokens"]
            .iter()
            .any(|term| target.contains(term))
            .then(|| base_match(self, entry, self.severity(), 8))
    }
}

// ─── cred-003 ──────────────────────────────────────────────────────────────

pub struct Cred003;
impl Rule for Cred003 {
    fn id(&self) -> &'static str {
        "cred-003"
    }
    fn name(&self) -> &'static str {
        "password store file read"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Credential
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
    fn description(&self) -> &'static str {
        "file.read targets a password, keychain, or vault file"
    }
    fn evaluate(&self, entry: &ExecutionRecord, _ctx: &RuleContext) -> Option<RuleMatch> {
        if entry.payload.action.action_type != ActionType::FileRead {
            return None;
        }
        let target = entry.payload.action.target.to_lowercase();
        ["password", "keychain", "vault"]
            .iter()
            .any(|term| target.contains(term))
            .then(|| base_match(self, entry, self.severity(), 9))
    }
}

// ─── comm-001 ──────────────────────────────────────────────────────────────

pub struct Comm001;
impl Rule for Comm001 {
    fn id(&self) -> &'static str {
        "comm-001"
    }
    fn name(&self) -> &'static str {
        "outbound message"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Communication
    }
    fn severity(&self) -> Severity {
        Severity::Medium
    }
    fn description(&self) -> &'static str {
        "action type is message.send"
    }
    fn evaluate(&self, entry: &ExecutionRecord, _ctx: &RuleContext) -> Option<RuleMatch> {
        (entry.payload.action.action_type == ActionType::MessageSend)
            .then(|| base_match(self, entry, self.severity(), 5))
    }
}

// ─── comm-002 ──────────────────────────────────────────────────────────────

pub struct Comm002;
impl Rule for Comm002 {
    fn id(&self) -> &'static str {
        "comm-002"
    }
    fn name(&self) -> &'static str {
        "message to new target"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Communication
    }
    fn severity(&self) -> Severity {
        Severity::High
    }
    fn description(&self) -> &'static str {
        "message.send to a target not previously seen in this log"
    }
    fn evaluate(&self, entry: &ExecutionRecord, ctx: &RuleContext) -> Option<RuleMatch> {
        if entry.payload.action.action_type != ActionType::MessageSend {
            return None;
        }
        (!ctx.known_targets.contains(&entry.payload.action.target)).then(|| base_match(self, entry, self.severity(), 7))
    }
}

// ─── esc-001 ───────────────────────────────────────────────────────────────

pub struct Esc001;
impl Rule for Esc001 {
    fn id(&self) -> &'static str {
        "esc-001"
    }
    fn name(&self) -> &'static str {
        "privilege escalation"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Escalation
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
    fn description(&self) -> &'static str {
        "action type enables or invokes elevated privileges"
    }
    fn evaluate(&self, entry: &ExecutionRecord, _ctx: &RuleContext) -> Option<RuleMatch> {
        matches!(
            entry.payload.action.action_type,
            ActionType::ElevatedEnable | ActionType::ElevatedCommand
        )
        .then(|| base_match(self, entry, self.severity(), 9))
    }
}

// ─── esc-002 ───────────────────────────────────────────────────────────────

pub struct Esc002;
impl Rule for Esc002 {
    fn id(&self) -> &'static str {
        "esc-002"
    }
    fn name(&self) -> &'static str {
        "sudo invocation"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Escalation
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
    fn description(&self) -> &'static str {
        "exec.command target or detail invokes sudo"
    }
    fn evaluate(&self, entry: &ExecutionRecord, _ctx: &RuleContext) -> Option<RuleMatch> {
        if entry.payload.action.action_type != ActionType::ExecCommand {
            return None;
        }
        let target = entry.payload.action.target.to_lowercase();
        let detail = entry.payload.action.detail.to_lowercase();
        (target.contains("sudo") || detail.contains("sudo")).then(|| base_match(self, entry, self.severity(), 9))
    }
}

// ─── exfil-001 ─────────────────────────────────────────────────────────────

pub struct Exfil001;
impl Rule for Exfil001 {
    fn id(&self) -> &'static str {
        "exfil-001"
    }
    fn name(&self) -> &'static str {
        "sensitive read followed by outbound call"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::DataExfil
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
    fn description(&self) -> &'static str {
        "an outbound api/web call within 60s of a sensitive-path file read in this session"
    }
    fn evaluate(&self, entry: &ExecutionRecord, ctx: &RuleContext) -> Option<RuleMatch> {
        if !matches!(
            entry.payload.action.action_type,
            ActionType::ApiCall | ActionType::WebFetch | ActionType::WebSearch
        ) {
            return None;
        }
        let window_start = entry.ts - chrono::Duration::seconds(60);
        let sensitive_read = ctx
            .session_history
            .iter()
            .filter(|e| e.id != entry.id)
            .filter(|e| e.payload.action.action_type == ActionType::FileRead)
            .filter(|e| e.ts >= window_start && e.ts <= entry.ts)
            .find(|e| matches_any_pattern(ctx.sensitive_patterns, &e.payload.action.target))?;

        let mut m = base_match(self, entry, self.severity(), 10);
        let delta_ms = (entry.ts - sensitive_read.ts).num_milliseconds();
        m.evidence.insert("sensitiveEntryId".to_string(), json!(sensitive_read.id.to_string()));
        m.evidence.insert("sensitiveTarget".to_string(), json!(sensitive_read.payload.action.target));
        m.evidence.insert("timeDeltaMs".to_string(), json!(delta_ms));
        Some(m)
    }
}

// ─── scope-001 ─────────────────────────────────────────────────────────────

pub struct Scope001;
impl Rule for Scope001 {
    fn id(&self) -> &'static str {
        "scope-001"
    }
    fn name(&self) -> &'static str {
        "claimed in-scope but escalation/sensitive action"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::ScopeDrift
    }
    fn severity(&self) -> Severity {
        Severity::High
    }
    fn description(&self) -> &'static str {
        "paired claim asserts in-scope, but the action escalates or touches a sensitive path"
    }
    fn evaluate(&self, entry: &ExecutionRecord, ctx: &RuleContext) -> Option<RuleMatch> {
        let claim = ctx.paired_claim?;
        if !claim.payload.constraints.within_scope {
            return None;
        }
        let action_type = entry.payload.action.action_type;
        let is_escalation_or_payment = action_type.starts_with("elevated.") || action_type.starts_with("payment.");
        let touches_sensitive = matches_any_pattern(ctx.sensitive_patterns, &entry.payload.action.target);
        (is_escalation_or_payment || touches_sensitive).then(|| base_match(self, entry, self.severity(), 8))
    }
}

// ─── freq-001 ──────────────────────────────────────────────────────────────

pub struct Freq001;
impl Rule for Freq001 {
    fn id(&self) -> &'static str {
        "freq-001"
    }
    fn name(&self) -> &'static str {
        "action rate exceeds per-minute threshold"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Frequency
    }
    fn severity(&self) -> Severity {
        Severity::Medium
    }
    fn description(&self) -> &'static str {
        "more than the configured max actions occurred in the trailing 60 seconds"
    }
    fn evaluate(&self, entry: &ExecutionRecord, ctx: &RuleContext) -> Option<RuleMatch> {
        let window_start = entry.ts - chrono::Duration::seconds(60);
        let count = ctx
            .recent_entries
            .iter()
            .filter(|e| e.ts >= window_start && e.ts <= entry.ts)
            .count();
        (count as u32 > ctx.config.max_actions_per_minute).then(|| {
            let mut m = base_match(self, entry, self.severity(), 6);
            m.evidence.insert("countInWindow".to_string(), json!(count));
            m
        })
    }
}

// ─── destr-001 ─────────────────────────────────────────────────────────────

pub struct Destr001;
impl Rule for Destr001 {
    fn id(&self) -> &'static str {
        "destr-001"
    }
    fn name(&self) -> &'static str {
        "file deletion"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Destructive
    }
    fn severity(&self) -> Severity {
        Severity::Medium
    }
    fn description(&self) -> &'static str {
        "action type is file.delete; severity escalates if the target matches a sensitive path"
    }
    fn evaluate(&self, entry: &ExecutionRecord, ctx: &RuleContext) -> Option<RuleMatch> {
        if entry.payload.action.action_type != ActionType::FileDelete {
            return None;
        }
        let sensitive = matches_any_pattern(ctx.sensitive_patterns, &entry.payload.action.target);
        let (severity, contribution) = if sensitive { (Severity::High, 8) } else { (Severity::Medium, 5) };
        Some(base_match(self, entry, severity, contribution))
    }
}

// ─── destr-002 ─────────────────────────────────────────────────────────────

pub struct Destr002;
impl Rule for Destr002 {
    fn id(&self) -> &'static str {
        "destr-002"
    }
    fn name(&self) -> &'static str {
        "recursive force delete via shell"
    }
    fn category(&self) -> RuleCategory {
        RuleCategory::Destructive
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
    fn description(&self) -> &'static str {
        "exec.command target or detail contains rm -rf or rm -r"
    }
    fn evaluate(&self, entry: &ExecutionRecord, _ctx: &RuleContext) -> Option<RuleMatch> {
        if entry.payload.action.action_type != ActionType::ExecCommand {
            return None;
        }
        let target = entry.payload.action.target.to_lowercase();
        let detail = entry.payload.action.detail.to_lowercase();
        let contains_rm = |s: &str| s.contains("rm -rf") || s.contains("rm -r");
        (contains_rm(&target) || contains_rm(&detail)).then(|| base_match(self, entry, self.severity(), 9))
    }
}

/// The full 14-rule catalog.
pub fn default_catalog() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(Fin001),
        Box::new(Fin002),
        Box::new(Cred001),
        Box::new(Cred002),
        Box::new(Cred003),
        Box::new(Comm001),
        Box::new(Comm002),
        Box::new(Esc001),
        Box::new(Esc002),
        Box::new(Exfil001),
        Box::new(Scope001),
        Box::new(Freq001),
        Box::new(Destr001),
        Box::new(Destr002),
    ]
}
