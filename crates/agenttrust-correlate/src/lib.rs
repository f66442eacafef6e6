#![forbid(unsafe_code)]

mod aggregate;
mod confidence;
mod file;
mod network;
mod noise;
mod process;
mod types;

pub use aggregate::aggregate;
pub use confidence::witness_confidence;
pub use noise::classify;
pub use types::{
    builtin_infrastructure_patterns, CorrelationOptions, CorrelationReport, Finding, FindingSeverity, FindingType, InfrastructurePattern, MatchedPair,
    NoiseClass, BUILTIN_SENSITIVE_PATH_SUBSTRINGS,
};

use agenttrust_proto::{ExecutionRecord, WitnessRecord};

/// Correlate witnessed activity against claimed/recorded executions and
/// produce a single report: matched pairs, discrepancy findings, and an
/// overall witness confidence score.
pub fn correlate(witnesses: &[WitnessRecord], executions: &[ExecutionRecord], options: &CorrelationOptions) -> CorrelationReport {
    aggregate::aggregate(witnesses, executions, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrust_proto::{ExecutionPayload, WitnessPayload};

    #[test]
    fn test_correlate_empty_inputs_yields_full_confidence() {
        let report = correlate(&[], &[], &CorrelationOptions::default());
        assert!(report.matched.is_empty());
        assert!(report.findings.is_empty());
        assert_eq!(report.witness_confidence, 100);
    }

    #[test]
    fn test_correlate_unwitnessed_high_risk_execution_is_critical() {
        let mut payload = ExecutionPayload::test_fixture();
        payload.action.target = "/tmp/nothing-witnessed".to_string();
        payload.risk.score = 9;
        let execution = ExecutionRecord::new(payload, String::new());
        let report = correlate(&[], &[execution], &CorrelationOptions::default());
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind, FindingType::UnwitnessedExecution);
        assert_eq!(report.findings[0].severity, FindingSeverity::Critical);
    }

    #[test]
    fn test_correlate_background_noise_process_produces_no_finding() {
        use agenttrust_proto::{ProcessEventData, WitnessEvent, WitnessSource};
        let witness = WitnessRecord::new(
            WitnessPayload {
                source: WitnessSource::Process,
                event: WitnessEvent::ProcessSpawned(ProcessEventData {
                    command: "launchd".to_string(),
                    pid: 1,
                    ppid: 0,
                    observed_at: chrono::Utc::now(),
                    exit_code: None,
                    user: None,
                    cwd: None,
                }),
                correlated: false,
                correlated_entry_id: None,
            },
            String::new(),
        );
        let report = correlate(&[witness], &[], &CorrelationOptions::default());
        assert!(report.findings.is_empty());
    }
}
