use std::collections::HashSet;

use agenttrust_proto::{ActionType, ExecutionRecord, WitnessEvent, WitnessRecord};

use crate::confidence::witness_confidence;
use crate::noise::classify;
use crate::types::{CorrelationOptions, CorrelationReport, Finding, FindingSeverity, FindingType, MatchedPair, NoiseClass};
use crate::{file, network, process};

fn is_witnessable(action_type: ActionType) -> bool {
    action_type.as_str().starts_with("file.")
        || action_type.as_str().starts_with("exec.")
        || matches!(action_type, ActionType::ApiCall | ActionType::WebFetch | ActionType::WebSearch | ActionType::WebBrowse)
}

/// Run all three per-family correlators, classify uncorrelated witnesses as
/// noise or agent-relevant, and compute overall witness confidence.
pub fn aggregate(witnesses: &[WitnessRecord], executions: &[ExecutionRecord], opts: &CorrelationOptions) -> CorrelationReport {
    let mut matched: Vec<MatchedPair> = Vec::new();
    matched.extend(file::correlate(witnesses, executions));
    matched.extend(process::correlate(witnesses, executions));
    matched.extend(network::correlate(witnesses, executions));

    let matched_execution_ids: HashSet<String> = matched.iter().map(|m| m.execution.id.to_string()).collect();
    let matched_witness_ids: HashSet<String> = matched.iter().map(|m| m.witness.id.to_string()).collect();

    let mut findings: Vec<Finding> = matched.iter().flat_map(|m| m.findings.clone()).collect();

    for execution in executions {
        if matched_execution_ids.contains(&execution.id.to_string()) {
            continue;
        }
        let action_type = execution.payload.action.action_type;
        if matches!(action_type, ActionType::ExecCommand | ActionType::ExecScript) {
            let mut finding = Finding::new(FindingType::PhantomProcess, FindingSeverity::Critical, "command execution has no corresponding process witness");
            finding.execution_id = Some(execution.id.to_string());
            findings.push(finding);
        } else if is_witnessable(action_type) {
            let severity = if execution.payload.risk.score >= 7 { FindingSeverity::Critical } else { FindingSeverity::Warning };
            let mut finding = Finding::new(FindingType::UnwitnessedExecution, severity, "execution has no corresponding witness observation");
            finding.execution_id = Some(execution.id.to_string());
            findings.push(finding);
        }
    }

    let mut background_noise = 0usize;
    let mut infrastructure_traffic = 0usize;

    for witness in witnesses {
        match classify(witness, opts) {
            NoiseClass::BackgroundNoise => background_noise += 1,
            NoiseClass::Infrastructure => infrastructure_traffic += 1,
            NoiseClass::AgentRelevant => {
                if matched_witness_ids.contains(&witness.id.to_string()) {
                    continue;
                }
                match &witness.payload.event {
                    WitnessEvent::ConnectionOpened(_) => {
                        let mut finding = Finding::new(FindingType::SilentNetwork, FindingSeverity::Warning, "outbound connection observed with no paired execution");
                        finding.witness_id = Some(witness.id.to_string());
                        findings.push(finding);
                    }
                    WitnessEvent::FileAccessed(d) => {
                        let sensitive = crate::types::BUILTIN_SENSITIVE_PATH_SUBSTRINGS.iter().any(|s| d.path.contains(s));
                        let mut finding = Finding::new(FindingType::SilentFileAccess, FindingSeverity::Warning, "sensitive file accessed with no paired execution");
                        finding.witness_id = Some(witness.id.to_string());
                        finding.sensitive = sensitive;
                        if sensitive {
                            findings.push(finding);
                        }
                    }
                    WitnessEvent::ProcessSpawned(_) => {
                        let mut finding = Finding::new(FindingType::UnloggedObservation, FindingSeverity::Info, "process spawn observed with no paired execution");
                        finding.witness_id = Some(witness.id.to_string());
                        findings.push(finding);
                    }
                    _ => {}
                }
            }
        }
    }

    let confidence = witness_confidence(witnesses.len(), background_noise, infrastructure_traffic, executions.len(), &findings);

    CorrelationReport { matched, findings, witness_confidence: confidence }
}
