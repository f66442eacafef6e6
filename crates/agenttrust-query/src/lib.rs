//! Query filters over execution and claim logs: time range, action type,
//! agent, session, risk score, and risk label intersection.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::path::PathBuf;

use agenttrust_persist::RecordStore;
use agenttrust_proto::{ActionType, ClaimPayload, ExecutionPayload, HashChainRecord, RiskLabel};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid time range spec {0:?}: expected `<n>h`, `<n>d`, or `<n>w`")]
    InvalidTimeRange(String),
}

/// An inclusive `[from, to]` timestamp window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Parse a relative time-range spec of the form `<n>{h|d|w}` into a window
/// ending now.
pub fn parse_time_range(spec: &str) -> Result<TimeRange, QueryError> {
    if spec.len() < 2 {
        return Err(QueryError::InvalidTimeRange(spec.to_string()));
    }
    let (num_part, unit) = spec.split_at(spec.len() - 1);
    let n: i64 = num_part
        .parse()
        .map_err(|_| QueryError::InvalidTimeRange(spec.to_string()))?;
    let duration = match unit {
        "h" => Duration::hours(n),
        "d" => Duration::days(n),
        "w" => Duration::weeks(n),
        _ => return Err(QueryError::InvalidTimeRange(spec.to_string())),
    };
    let to = Utc::now();
    let from = to - duration;
    Ok(TimeRange { from, to })
}

/// Accessors a record payload must provide to be queryable. Executions and
/// claims expose the same logical fields under different names (`action` vs
/// `intent.plannedAction`, `risk.score` vs `intent.selfAssessedRisk`).
pub trait QueryFields {
    fn agent(&self) -> &str;
    fn session(&self) -> &str;
    fn action_type(&self) -> ActionType;
    fn risk_score(&self) -> u8;
    fn risk_labels(&self) -> BTreeSet<RiskLabel>;
}

impl QueryFields for ExecutionPayload {
    fn agent(&self) -> &str {
        &self.agent
    }
    fn session(&self) -> &str {
        &self.session
    }
    fn action_type(&self) -> ActionType {
        self.action.action_type
    }
    fn risk_score(&self) -> u8 {
        self.risk.score
    }
    fn risk_labels(&self) -> BTreeSet<RiskLabel> {
        self.risk.labels.clone()
    }
}

impl QueryFields for ClaimPayload {
    fn agent(&self) -> &str {
        &self.agent
    }
    fn session(&self) -> &str {
        &self.session
    }
    fn action_type(&self) -> ActionType {
        self.intent.planned_action
    }
    fn risk_score(&self) -> u8 {
        self.intent.self_assessed_risk
    }
    fn risk_labels(&self) -> BTreeSet<RiskLabel> {
        BTreeSet::new()
    }
}

/// A filter over queryable records. Every populated field must match;
/// `None` fields impose no constraint.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub time_range: Option<TimeRange>,
    pub action_types: Option<BTreeSet<ActionType>>,
    pub agent: Option<String>,
    pub session: Option<String>,
    pub min_risk: Option<u8>,
    pub max_risk: Option<u8>,
    pub risk_labels: Option<BTreeSet<RiskLabel>>,
}

impl EntryFilter {
    pub fn matches<T: QueryFields>(&self, record: &HashChainRecord<T>) -> bool {
        if let Some(tr) = &self.time_range {
            if record.ts < tr.from || record.ts > tr.to {
                return false;
            }
        }
        if let Some(types) = &self.action_types {
            if !types.contains(&record.payload.action_type()) {
                return false;
            }
        }
        if let Some(agent) = &self.agent {
            if record.payload.agent() != agent {
                return false;
            }
        }
        if let Some(session) = &self.session {
            if record.payload.session() != session {
                return false;
            }
        }
        if let Some(min) = self.min_risk {
            if record.payload.risk_score() < min {
                return false;
            }
        }
        if let Some(max) = self.max_risk {
            if record.payload.risk_score() > max {
                return false;
            }
        }
        if let Some(labels) = &self.risk_labels {
            if labels.is_disjoint(&record.payload.risk_labels()) {
                return false;
            }
        }
        true
    }
}

/// Prune candidate files to those whose `YYYY-MM-DD` filename prefix falls
/// inside `range`, so short-window queries don't scan historical files.
/// Files whose name doesn't parse as a date are kept (fail open).
pub fn prune_files_by_date(files: &[PathBuf], range: &TimeRange) -> Vec<PathBuf> {
    let from_date = range.from.date_naive();
    let to_date = range.to.date_naive();
    files
        .iter()
        .filter(|f| {
            let name = match f.file_name().and_then(|n| n.to_str()) {
                Some(n) if n.len() >= 10 => n,
                _ => return true,
            };
            match NaiveDate::parse_from_str(&name[..10], "%Y-%m-%d") {
                Ok(d) => d >= from_date && d <= to_date,
                Err(_) => true,
            }
        })
        .cloned()
        .collect()
}

/// Run `filter` over every record in `store`, pruning files by date first
/// when the filter has a time range.
pub fn query<T: QueryFields + serde::de::DeserializeOwned>(
    store: &RecordStore,
    filter: &EntryFilter,
) -> Vec<HashChainRecord<T>> {
    let files = store.list_files();
    let candidates = match &filter.time_range {
        Some(tr) => prune_files_by_date(&files, tr),
        None => files,
    };
    candidates
        .iter()
        .flat_map(|f| RecordStore::read_file::<T>(f))
        .filter(|r| filter.matches(r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrust_persist::LEDGER_SUFFIX;
    use agenttrust_proto::ExecutionRecord;

    #[test]
    fn test_parse_time_range_units() {
        let r = parse_time_range("2h").unwrap();
        assert!((r.to - r.from) == Duration::hours(2));
        let r = parse_time_range("3d").unwrap();
        assert!((r.to - r.from) == Duration::days(3));
        let r = parse_time_range("1w").unwrap();
        assert!((r.to - r.from) == Duration::weeks(1));
    }

    #[test]
    fn test_parse_time_range_rejects_bad_unit() {
        assert!(parse_time_range("5x").is_err());
        assert!(parse_time_range("").is_err());
    }

    #[test]
    fn test_entry_filter_agent_and_risk() {
        let mut record = ExecutionRecord::new(ExecutionPayload::test_fixture(), String::new());
        record.payload.agent = "agent-a".to_string();
        record.payload.risk.score = 8;

        let filter = EntryFilter {
            agent: Some("agent-a".to_string()),
            min_risk: Some(5),
            ..Default::default()
        };
        assert!(filter.matches(&record));

        let filter_wrong_agent = EntryFilter {
            agent: Some("agent-b".to_string()),
            ..Default::default()
        };
        assert!(!filter_wrong_agent.matches(&record));
    }

    #[test]
    fn test_prune_files_by_date_keeps_files_in_range() {
        let files = vec![
            PathBuf::from("/x/2026-01-01.agenttrust.jsonl"),
            PathBuf::from("/x/2026-02-15.agenttrust.jsonl"),
            PathBuf::from("/x/2026-03-01.agenttrust.jsonl"),
        ];
        let range = TimeRange {
            from: DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z").unwrap().into(),
            to: DateTime::parse_from_rfc3339("2026-02-28T00:00:00Z").unwrap().into(),
        };
        let pruned = prune_files_by_date(&files, &range);
        assert_eq!(pruned, vec![PathBuf::from("/x/2026-02-15.agenttrust.jsonl")]);
    }

    #[test]
    fn test_query_executions_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RecordStore::new(tmp.path(), LEDGER_SUFFIX);
        let mut a = ExecutionPayload::test_fixture();
        a.agent = "agent-a".to_string();
        let mut b = ExecutionPayload::test_fixture();
        b.agent = "agent-b".to_string();
        store.append(&ExecutionRecord::new(a, String::new())).unwrap();
        store.append(&ExecutionRecord::new(b, store.last_hash::<ExecutionPayload>())).unwrap();

        let filter = EntryFilter {
            agent: Some("agent-a".to_string()),
            ..Default::default()
        };
        let results = query::<ExecutionPayload>(&store, &filter);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload.agent, "agent-a");
    }
}
