use agenttrust_proto::{ActionType, ExecutionRecord, FileEventData, WitnessEvent, WitnessRecord};

use crate::types::{Finding, FindingSeverity, FindingType, MatchedPair, BUILTIN_SENSITIVE_PATH_SUBSTRINGS};

const TIME_GATE_SECS: i64 = 10;
const TIMING_DISCREPANCY_THRESHOLD_SECS: i64 = 5;
const TIMING_CRITICAL_THRESHOLD_SECS: i64 = 30;

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    trimmed.strip_suffix('/').unwrap_or(trimmed).to_string()
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn paths_match(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_path(a), normalize_path(b));
    if a == b || a.ends_with(&b) || b.ends_with(&a) {
        return true;
    }
    let (ba, bb) = (basename(&a), basename(&b));
    !ba.is_empty() && ba == bb
}

fn expected_action_for_event(event: &WitnessEvent) -> Option<ActionType> {
    match event {
        WitnessEvent::FileCreated(_) | WitnessEvent::FileModified(_) => Some(ActionType::FileWrite),
        WitnessEvent::FileDeleted(_) => Some(ActionType::FileDelete),
        WitnessEvent::FileAccessed(_) => Some(ActionType::FileRead),
        _ => None,
    }
}

fn file_event_data(event: &WitnessEvent) -> Option<&FileEventData> {
    match event {
        WitnessEvent::FileCreated(d) | WitnessEvent::FileModified(d) | WitnessEvent::FileDeleted(d) | WitnessEvent::FileAccessed(d) => Some(d),
        _ => None,
    }
}

fn is_sensitive_path(path: &str) -> bool {
    BUILTIN_SENSITIVE_PATH_SUBSTRINGS.iter().any(|s| path.contains(s))
}

/// Pair filesystem witnesses against `file.read|write|delete` executions.
/// Each returned pair carries its confidence and any discrepancy findings;
/// callers aggregate unmatched items separately.
pub fn correlate(witnesses: &[WitnessRecord], executions: &[ExecutionRecord]) -> Vec<MatchedPair> {
    let mut matched = Vec::new();

    for witness in witnesses {
        let Some(event_data) = file_event_data(&witness.payload.event) else { continue };
        for execution in executions {
            if !matches!(execution.payload.action.action_type, ActionType::FileRead | ActionType::FileWrite | ActionType::FileDelete) {
                continue;
            }
            if !paths_match(&event_data.path, &execution.payload.action.target) {
                continue;
            }
            let delta = (witness.ts - execution.ts).num_seconds().abs();
            if delta > TIME_GATE_SECS {
                continue;
            }

            let mut findings = Vec::new();
            let mut confidence: i32 = 100;

            if let Some(expected) = expected_action_for_event(&witness.payload.event) {
                if expected != execution.payload.action.action_type {
                    findings.push(Finding::new(
                        FindingType::TargetDiscrepancy,
                        FindingSeverity::Critical,
                        format!("witness implies {expected} but execution recorded {}", execution.payload.action.action_type),
                    ));
                    confidence -= 30;
                }
            }

            if let (Some(stat), Some(meta)) = (&event_data.stat, &execution.payload.meta) {
                let mut evidence_mismatch = false;

                if let Some(exec_hash) = meta.pointer("/fileEvidence/contentHashPrefix").and_then(|v| v.as_str()) {
                    if let Some(witness_hash) = &stat.content_hash_prefix {
                        if witness_hash != exec_hash {
                            let severity = if is_sensitive_path(&event_data.path) { FindingSeverity::Critical } else { FindingSeverity::Warning };
                            findings.push(Finding::new(FindingType::EvidenceMismatch, severity, "content hash prefix mismatch"));
                            evidence_mismatch = true;
                        }
                    }
                }
                if let Some(exec_size) = meta.pointer("/fileEvidence/sizeBytes").and_then(|v| v.as_u64()) {
                    if exec_size != stat.size_bytes {
                        findings.push(Finding::new(FindingType::EvidenceMismatch, FindingSeverity::Warning, "file size mismatch"));
                        evidence_mismatch = true;
                    }
                }

                // A single flat penalty per pair regardless of how many evidence
                // sub-fields disagree; each disagreement still gets its own finding.
                if evidence_mismatch {
                    confidence -= 20;
                }
            }

            if delta > TIMING_DISCREPANCY_THRESHOLD_SECS {
                let severity = if delta > TIMING_CRITICAL_THRESHOLD_SECS { FindingSeverity::Critical } else { FindingSeverity::Info };
                findings.push(Finding::new(FindingType::TimingDiscrepancy, severity, format!("{delta}s between witness and execution")));
                confidence -= 10;
            }

            matched.push(MatchedPair { witness: witness.clone(), execution: execution.clone(), confidence: confidence.clamp(0, 100) as u8, findings });
        }
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrust_proto::{ExecutionPayload, FileStat, WitnessPayload, WitnessRecord, WitnessSource};
    use chrono::Duration;

    fn witness_at(path: &str, ts: chrono::DateTime<chrono::Utc>) -> WitnessRecord {
        let mut r = WitnessRecord::new(
            WitnessPayload {
                source: WitnessSource::Filesystem,
                event: WitnessEvent::FileModified(FileEventData {
                    path: path.to_string(),
                    observed_at: ts,
                    stat: Some(FileStat { size_bytes: 10, mode: 0o644, mtime: ts, content_hash_prefix: Some("abc".to_string()) }),
                }),
                correlated: false,
                correlated_entry_id: None,
            },
            String::new(),
        );
        r.ts = ts;
        r
    }

    fn execution_at(target: &str, ts: chrono::DateTime<chrono::Utc>) -> ExecutionRecord {
        let mut payload = ExecutionPayload::test_fixture();
        payload.action.action_type = ActionType::FileWrite;
        payload.action.target = target.to_string();
        let mut r = ExecutionRecord::new(payload, String::new());
        r.ts = ts;
        r
    }

    #[test]
    fn test_matching_path_and_time_window_yields_full_confidence() {
        let now = chrono::Utc::now();
        let witnesses = vec![witness_at("/tmp/example", now)];
        let executions = vec![execution_at("/tmp/example", now + Duration::seconds(1))];
        let matched = correlate(&witnesses, &executions);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].confidence, 100);
        assert!(matched[0].findings.is_empty());
    }

    #[test]
    fn test_action_type_mismatch_is_critical_target_discrepancy() {
        let now = chrono::Utc::now();
        let witnesses = vec![witness_at("/tmp/example", now)]; // implies file.write
        let mut executions = vec![execution_at("/tmp/example", now)];
        executions[0].payload.action.action_type = ActionType::FileRead;
        let matched = correlate(&witnesses, &executions);
        assert_eq!(matched[0].findings[0].kind, FindingType::TargetDiscrepancy);
        assert_eq!(matched[0].findings[0].severity, FindingSeverity::Critical);
    }

    #[test]
    fn test_basename_match_across_different_directories() {
        assert!(paths_match("/home/agent/notes.txt", "/tmp/workdir/notes.txt"));
        assert!(!paths_match("/home/agent/a.txt", "/home/agent/b.txt"));
    }
}
