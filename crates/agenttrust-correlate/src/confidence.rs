use crate::types::{Finding, FindingSeverity, FindingType};

/// `T = totalWitnessEvents - backgroundNoise - infrastructureTraffic`.
/// If there's effectively nothing to correlate (`T <= 0`), confidence is
/// 100 when there were no executions to witness at all, else 50 (no
/// signal either way). Otherwise confidence degrades with the fraction of
/// agent-relevant events that produced a warning/critical finding, plus a
/// fixed penalty for phantom-process and evidence-mismatch findings.
pub fn witness_confidence(total_witness_events: usize, background_noise: usize, infrastructure_traffic: usize, execution_count: usize, findings: &[Finding]) -> u8 {
    let t = total_witness_events as i64 - background_noise as i64 - infrastructure_traffic as i64;
    if t <= 0 {
        return if execution_count == 0 { 100 } else { 50 };
    }

    let u = findings.iter().filter(|f| matches!(f.severity, FindingSeverity::Warning | FindingSeverity::Critical)).count() as f64;
    let r = u / (t as f64).max(1.0);

    let proportional = if r < 0.05 {
        0.0
    } else if r <= 0.20 {
        r * 100.0
    } else {
        20.0 + (r - 0.20) * 200.0
    };

    let fixed = 15.0 * findings.iter().filter(|f| matches!(f.kind, FindingType::PhantomProcess | FindingType::EvidenceMismatch)).count() as f64;

    (100.0 - proportional - fixed).round().clamp(0.0, 100.0) as u8
}
