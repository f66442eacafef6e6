use agenttrust_proto::{ActionType, ExecutionRecord, WitnessEvent, WitnessRecord};

use crate::types::{Finding, FindingSeverity, FindingType, MatchedPair};

const TIME_GATE_SECS: i64 = 5;
const TIMING_DISCREPANCY_THRESHOLD_SECS: i64 = 2;

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_token(s: &str) -> &str {
    s.split_whitespace().next().unwrap_or(s)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn commands_match(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_whitespace(a), normalize_whitespace(b));
    if a == b || a.contains(&b) || b.contains(&a) {
        return true;
    }
    basename(first_token(&a)) == basename(first_token(&b))
}

/// Pair `process_spawned` witnesses against `exec.command|exec.script`
/// executions by fuzzy command match within a 5s window.
pub fn correlate(witnesses: &[WitnessRecord], executions: &[ExecutionRecord]) -> Vec<MatchedPair> {
    let mut matched = Vec::new();

    for witness in witnesses {
        let WitnessEvent::ProcessSpawned(event_data) = &witness.payload.event else { continue };
        for execution in executions {
            if !matches!(execution.payload.action.action_type, ActionType::ExecCommand | ActionType::ExecScript) {
                continue;
            }
            if !commands_match(&event_data.command, &execution.payload.action.target) && !commands_match(&event_data.command, &execution.payload.action.detail) {
                continue;
            }
            let delta = (witness.ts - execution.ts).num_seconds().abs();
            if delta > TIME_GATE_SECS {
                continue;
            }

            let mut findings = Vec::new();
            let mut confidence: i32 = 100;

            if let Some(meta) = &execution.payload.meta {
                if let Some(exec_pid) = meta.pointer("/processEvidence/pid").and_then(|v| v.as_u64()) {
                    if exec_pid != event_data.pid as u64 {
                        findings.push(Finding::new(FindingType::EvidenceMismatch, FindingSeverity::Warning, "process id mismatch"));
                        confidence -= 20;
                    }
                }
            }

            if delta > TIMING_DISCREPANCY_THRESHOLD_SECS {
                findings.push(Finding::new(FindingType::TimingDiscrepancy, FindingSeverity::Info, format!("{delta}s between spawn and execution record")));
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
    use agenttrust_proto::{ExecutionPayload, ProcessEventData, WitnessPayload, WitnessSource};

    fn witness_at(command: &str, pid: u32, ts: chrono::DateTime<chrono::Utc>) -> WitnessRecord {
        let mut r = WitnessRecord::new(
            WitnessPayload {
                source: WitnessSource::Process,
                event: WitnessEvent::ProcessSpawned(ProcessEventData { command: command.to_string(), pid, ppid: 1, observed_at: ts, exit_code: None, user: None, cwd: None }),
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
        payload.action.action_type = ActionType::ExecCommand;
        payload.action.target = target.to_string();
        let mut r = ExecutionRecord::new(payload, String::new());
        r.ts = ts;
        r
    }

    #[test]
    fn test_fuzzy_command_match_via_basename() {
        assert!(commands_match("/usr/bin/curl https://x.com", "curl https://x.com"));
        assert!(commands_match("ls -la /tmp", "ls -la /tmp /var"));
        assert!(!commands_match("curl https://x.com", "wget https://y.com"));
    }

    #[test]
    fn test_correlate_matches_within_time_gate() {
        let now = chrono::Utc::now();
        let witnesses = vec![witness_at("curl https://x.com", 500, now)];
        let executions = vec![execution_at("curl https://x.com", now)];
        let matched = correlate(&witnesses, &executions);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].confidence, 100);
    }
}
