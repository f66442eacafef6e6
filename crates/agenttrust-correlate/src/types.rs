use agenttrust_proto::{ExecutionRecord, WitnessRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseClass {
    BackgroundNoise,
    Infrastructure,
    AgentRelevant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    TargetDiscrepancy,
    EvidenceMismatch,
    TimingDiscrepancy,
    UnwitnessedExecution,
    PhantomProcess,
    SilentNetwork,
    SilentFileAccess,
    UnloggedObservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingType,
    pub severity: FindingSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub detail: String,
    pub sensitive: bool,
}

impl Finding {
    pub fn new(kind: FindingType, severity: FindingSeverity, detail: impl Into<String>) -> Self {
        Self { kind, severity, witness_id: None, execution_id: None, detail: detail.into(), sensitive: false }
    }
}

/// A witness/execution pair established by one of the three correlators.
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub witness: WitnessRecord,
    pub execution: ExecutionRecord,
    pub confidence: u8,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone)]
pub struct InfrastructurePattern {
    pub host: String,
    pub port: Option<u16>,
    pub label: String,
}

#[derive(Debug, Clone, Default)]
pub struct CorrelationOptions {
    pub sensitive_path_substrings: Vec<String>,
    pub custom_infrastructure_patterns: Vec<InfrastructurePattern>,
    pub background_noise_commands: Vec<String>,
}

pub const BUILTIN_SENSITIVE_PATH_SUBSTRINGS: &[&str] =
    &["/.ssh/", "/.env", "/.gnupg/", "/credentials", "/.aws/", "/.config/", "/id_rsa", "/id_ed25519", "/authorized_keys"];

pub fn builtin_infrastructure_patterns() -> Vec<InfrastructurePattern> {
    vec![
        InfrastructurePattern { host: "api.anthropic.com".to_string(), port: None, label: "anthropic-api".to_string() },
        InfrastructurePattern { host: "*.githubusercontent.com".to_string(), port: None, label: "github-content".to_string() },
    ]
}

#[derive(Debug, Clone)]
pub struct CorrelationReport {
    pub matched: Vec<MatchedPair>,
    pub findings: Vec<Finding>,
    pub witness_confidence: u8,
}
