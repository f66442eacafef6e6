//! Payload types for the three record kinds: execution, claim, and witness.
//!
//! These are pure data definitions. Construction (`createExecution`,
//! `createClaim`), field validation, and line parsing live in
//! `agenttrust-audit`; this crate only defines the shapes and their wire
//! encoding.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Action types ─────────────────────────────────────────────────────────────

/// The 23 action types an execution or a claim's planned action can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "file.read")]
    FileRead,
    #[serde(rename = "file.write")]
    FileWrite,
    #[serde(rename = "file.delete")]
    FileDelete,
    #[serde(rename = "api.call")]
    ApiCall,
    #[serde(rename = "web.fetch")]
    WebFetch,
    #[serde(rename = "web.search")]
    WebSearch,
    #[serde(rename = "web.browse")]
    WebBrowse,
    #[serde(rename = "exec.command")]
    ExecCommand,
    #[serde(rename = "exec.script")]
    ExecScript,
    #[serde(rename = "message.send")]
    MessageSend,
    #[serde(rename = "message.read")]
    MessageRead,
    #[serde(rename = "payment.initiate")]
    PaymentInitiate,
    #[serde(rename = "payment.confirm")]
    PaymentConfirm,
    #[serde(rename = "elevated.enable")]
    ElevatedEnable,
    #[serde(rename = "elevated.command")]
    ElevatedCommand,
    #[serde(rename = "calendar.create")]
    CalendarCreate,
    #[serde(rename = "calendar.modify")]
    CalendarModify,
    #[serde(rename = "skill.invoke")]
    SkillInvoke,
    #[serde(rename = "memory.read")]
    MemoryRead,
    #[serde(rename = "memory.write")]
    MemoryWrite,
    #[serde(rename = "session.spawn")]
    SessionSpawn,
    #[serde(rename = "session.send")]
    SessionSend,
    #[serde(rename = "api.auth")]
    ApiAuth,
}

impl ActionType {
    /// The wire string for this action type, e.g. `file.read`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileRead => "file.read",
            Self::FileWrite => "file.write",
            Self::FileDelete => "file.delete",
            Self::ApiCall => "api.call",
            Self::WebFetch => "web.fetch",
            Self::WebSearch => "web.search",
            Self::WebBrowse => "web.browse",
            Self::ExecCommand => "exec.command",
            Self::ExecScript => "exec.script",
            Self::MessageSend => "message.send",
            Self::MessageRead => "message.read",
            Self::PaymentInitiate => "payment.initiate",
            Self::PaymentConfirm => "payment.confirm",
            Self::ElevatedEnable => "elevated.enable",
            Self::ElevatedCommand => "elevated.command",
            Self::CalendarCreate => "calendar.create",
            Self::CalendarModify => "calendar.modify",
            Self::SkillInvoke => "skill.invoke",
            Self::MemoryRead => "memory.read",
            Self::MemoryWrite => "memory.write",
            Self::SessionSpawn => "session.spawn",
            Self::SessionSend => "session.send",
            Self::ApiAuth => "api.auth",
        }
    }

    /// Whether this action's wire string starts with `prefix` (e.g. `"payment."`).
    pub fn starts_with(self, prefix: &str) -> bool {
        self.as_str().starts_with(prefix)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action execution outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
    Partial,
    Blocked,
}

/// The claim's self-declared expected outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutcome {
    Success,
    Partial,
    Unknown,
}

/// Risk label set members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    Financial,
    DataAccess,
    Communication,
    Escalation,
    Execution,
    UnknownTarget,
    HighFrequency,
}

// ─── Execution payload ────────────────────────────────────────────────────────

/// `{ type, target, detail }` — the action an execution performed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub target: String,
    pub detail: String,
}

/// `{ goal, trigger, parentAction? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub goal: String,
    /// Free-form, though `inbound_message` and `chain` carry special meaning
    /// for blame-factor detection.
    pub trigger: String,
    #[serde(rename = "parentAction", skip_serializing_if = "Option::is_none")]
    pub parent_action: Option<ulid::Ulid>,
}

/// `{ status, detail?, durationMs? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(rename = "durationMs", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// `{ score, labels, autoFlagged }`. `autoFlagged` is `score >= 7`; callers
/// should set it via [`Risk::new`] rather than by hand to keep that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    pub score: u8,
    pub labels: BTreeSet<RiskLabel>,
    #[serde(rename = "autoFlagged")]
    pub auto_flagged: bool,
}

impl Risk {
    pub fn new(score: u8, labels: BTreeSet<RiskLabel>) -> Self {
        Self {
            score,
            auto_flagged: score >= 7,
            labels,
        }
    }
}

/// Execution record payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPayload {
    pub agent: String,
    pub session: String,
    pub action: Action,
    pub context: ExecutionContext,
    pub outcome: Outcome,
    pub risk: Risk,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl ExecutionPayload {
    /// A minimal, always-valid execution payload for tests and fixtures.
    pub fn test_fixture() -> Self {
        Self {
            agent: "agent-1".to_string(),
            session: "session-1".to_string(),
            action: Action {
                action_type: ActionType::FileRead,
                target: "/tmp/example".to_string(),
                detail: "read file".to_string(),
            },
            context: ExecutionContext {
                goal: "test".to_string(),
                trigger: "chain".to_string(),
                parent_action: None,
            },
            outcome: Outcome {
                status: OutcomeStatus::Success,
                detail: None,
                duration_ms: Some(5),
            },
            risk: Risk::new(1, BTreeSet::new()),
            meta: None,
        }
    }
}

// ─── Claim payload ─────────────────────────────────────────────────────────────

/// `{ plannedAction, plannedTarget, goal, expectedOutcome, selfAssessedRisk }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "plannedAction")]
    pub planned_action: ActionType,
    #[serde(rename = "plannedTarget")]
    pub planned_target: String,
    pub goal: String,
    #[serde(rename = "expectedOutcome")]
    pub expected_outcome: ExpectedOutcome,
    #[serde(rename = "selfAssessedRisk")]
    pub self_assessed_risk: u8,
}

/// `{ withinScope, requiresElevation, involvesExternalComms, involvesFinancial }`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(rename = "withinScope")]
    pub within_scope: bool,
    #[serde(rename = "requiresElevation")]
    pub requires_elevation: bool,
    #[serde(rename = "involvesExternalComms")]
    pub involves_external_comms: bool,
    #[serde(rename = "involvesFinancial")]
    pub involves_financial: bool,
}

/// Claim record payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimPayload {
    pub agent: String,
    pub session: String,
    pub intent: Intent,
    pub constraints: Constraints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl ClaimPayload {
    /// A minimal, always-valid claim payload for tests and fixtures.
    pub fn test_fixture() -> Self {
        Self {
            agent: "agent-1".to_string(),
            session: "session-1".to_string(),
            intent: Intent {
                planned_action: ActionType::FileRead,
                planned_target: "/tmp/example".to_string(),
                goal: "test".to_string(),
                expected_outcome: ExpectedOutcome::Success,
                self_assessed_risk: 1,
            },
            constraints: Constraints {
                within_scope: true,
                requires_elevation: false,
                involves_external_comms: false,
                involves_financial: false,
            },
            meta: None,
        }
    }
}

// ─── Witness payload ──────────────────────────────────────────────────────────

/// Which observer produced a witness record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WitnessSource {
    Filesystem,
    Process,
    Network,
}

/// `stat` attached to file-creation/modification events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStat {
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    /// Unix permission bits, e.g. `0o644`.
    pub mode: u32,
    pub mtime: DateTime<Utc>,
    /// SHA-256 hex of up to the first 4096 bytes of file content.
    #[serde(rename = "contentHashPrefix", skip_serializing_if = "Option::is_none")]
    pub content_hash_prefix: Option<String>,
}

/// Fields shared by `file_created` / `file_modified` / `file_deleted` / `file_accessed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEventData {
    pub path: String,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<FileStat>,
}

/// Fields shared by `process_spawned` / `process_exited`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEventData {
    pub command: String,
    pub pid: u32,
    pub ppid: u32,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
    #[serde(rename = "exitCode", skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// Transport protocol for a network observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Fields shared by `connection_opened` / `connection_closed` / `dns_query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEventData {
    #[serde(rename = "remoteHost")]
    pub remote_host: String,
    #[serde(rename = "remotePort", skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

/// A single host-level observation. Internally tagged on `type` so the wire
/// shape is one flat object per event, not a nested `{"File": {...}}`
/// wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WitnessEvent {
    #[serde(rename = "file_created")]
    FileCreated(FileEventData),
    #[serde(rename = "file_modified")]
    FileModified(FileEventData),
    #[serde(rename = "file_deleted")]
    FileDeleted(FileEventData),
    #[serde(rename = "file_accessed")]
    FileAccessed(FileEventData),
    #[serde(rename = "process_spawned")]
    ProcessSpawned(ProcessEventData),
    #[serde(rename = "process_exited")]
    ProcessExited(ProcessEventData),
    #[serde(rename = "connection_opened")]
    ConnectionOpened(NetworkEventData),
    #[serde(rename = "connection_closed")]
    ConnectionClosed(NetworkEventData),
    #[serde(rename = "dns_query")]
    DnsQuery(NetworkEventData),
}

impl WitnessEvent {
    /// The timestamp every event variant carries, regardless of family.
    pub fn observed_at(&self) -> DateTime<Utc> {
        match self {
            Self::FileCreated(d) | Self::FileModified(d) | Self::FileDeleted(d) | Self::FileAccessed(d) => {
                d.observed_at
            }
            Self::ProcessSpawned(d) | Self::ProcessExited(d) => d.observed_at,
            Self::ConnectionOpened(d) | Self::ConnectionClosed(d) | Self::DnsQuery(d) => d.observed_at,
        }
    }
}

/// Witness record payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessPayload {
    pub source: WitnessSource,
    pub event: WitnessEvent,
    pub correlated: bool,
    #[serde(rename = "correlatedEntryId", skip_serializing_if = "Option::is_none")]
    pub correlated_entry_id: Option<String>,
}
