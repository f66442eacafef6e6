use agenttrust_proto::{ActionType, ExecutionRecord, WitnessEvent, WitnessRecord};

use crate::types::{Finding, FindingSeverity, FindingType, MatchedPair};

const TIME_GATE_SECS: i64 = 10;
const TIMING_DISCREPANCY_THRESHOLD_SECS: i64 = 5;

/// Extract a bare hostname from a full URL, a `host:port` pair, or a bare
/// host string.
pub fn extract_hostname(target: &str) -> String {
    let without_scheme = target.split_once("://").map(|(_, rest)| rest).unwrap_or(target);
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
    let authority = authority.split('?').next().unwrap_or(authority);
    authority.rsplit_once(':').map(|(host, _)| host).unwrap_or(authority).to_string()
}

fn hosts_match(a: &str, b: &str) -> bool {
    a == b || a.contains(b) || b.contains(a)
}

/// Pair `connection_opened` witnesses against `api.call|web.*` executions
/// by hostname match within a 10s window.
pub fn correlate(witnesses: &[WitnessRecord], executions: &[ExecutionRecord]) -> Vec<MatchedPair> {
    let mut matched = Vec::new();

    for witness in witnesses {
        let WitnessEvent::ConnectionOpened(event_data) = &witness.payload.event else { continue };
        for execution in executions {
            if !matches!(
                execution.payload.action.action_type,
                ActionType::ApiCall | ActionType::WebFetch | ActionType::WebSearch | ActionType::WebBrowse
            ) {
                continue;
            }
            let exec_host = extract_hostname(&execution.payload.action.target);
            if !hosts_match(&event_data.remote_host, &exec_host) {
                continue;
            }
            let delta = (witness.ts - execution.ts).num_seconds().abs();
            if delta > TIME_GATE_SECS {
                continue;
            }

            let mut findings = Vec::new();
            let mut confidence: i32 = 100;

            if let Some(meta) = &execution.payload.meta {
                let mismatch_host = meta
                    .pointer("/networkEvidence/url")
                    .and_then(|v| v.as_str())
                    .map(extract_hostname)
                    .map(|h| !hosts_match(&h, &event_data.remote_host))
                    .unwrap_or(false);
                let mismatch_port = match (meta.pointer("/networkEvidence/port").and_then(|v| v.as_u64()), event_data.remote_port) {
                    (Some(expected), Some(actual)) => expected != actual as u64,
                    _ => false,
                };
                if mismatch_host || mismatch_port {
                    findings.push(Finding::new(FindingType::EvidenceMismatch, FindingSeverity::Warning, "host or port mismatch vs network evidence"));
                    confidence -= 15;
                }
            }

            if delta > TIMING_DISCREPANCY_THRESHOLD_SECS {
                findings.push(Finding::new(FindingType::TimingDiscrepancy, FindingSeverity::Info, format!("{delta}s between connection and execution record")));
                confidence -= 10;
            }

            matched.push(MatchedPair { witness: witness.clone(), execution: execution.clone(), confidence: confidence.clamp(0, 100) as u8, findings });
        }
    }

    matched
}
