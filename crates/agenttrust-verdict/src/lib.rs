//! Trust verdict computation: a single weighted score and level blended
//! from the three independent report components.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Untrusted,
    Low,
    Moderate,
    High,
    Verified,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustVerdict {
    pub score: u8,
    pub level: TrustLevel,
    pub integrity: u8,
    pub consistency: u8,
    pub witness_confidence: u8,
}

/// `trustScore = round(0.30*integrity + 0.35*consistency + 0.35*witnessConfidence)`,
/// with a level derived from the blended score and the weakest component.
pub fn compute_trust_verdict(integrity: u8, consistency: u8, witness_confidence: u8) -> TrustVerdict {
    let score = (0.30 * integrity as f64 + 0.35 * consistency as f64 + 0.35 * witness_confidence as f64).round().clamp(0.0, 100.0) as u8;
    let min_component = integrity.min(consistency).min(witness_confidence);

    let level = if integrity == 0 || consistency == 0 || witness_confidence == 0 || score < 40 {
        TrustLevel::Untrusted
    } else if integrity >= 95 && consistency >= 95 && witness_confidence >= 95 {
        TrustLevel::Verified
    } else if score >= 85 && min_component >= 70 {
        TrustLevel::High
    } else if score >= 65 && min_component >= 40 {
        TrustLevel::Moderate
    } else {
        TrustLevel::Low
    };

    TrustVerdict { score, level, integrity, consistency, witness_confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verified_requires_all_components_at_95() {
        let verdict = compute_trust_verdict(95, 95, 95);
        assert_eq!(verdict.level, TrustLevel::Verified);
        assert_eq!(verdict.score, 95);
    }

    #[test]
    fn test_any_zero_component_is_untrusted() {
        let verdict = compute_trust_verdict(0, 90, 90);
        assert_eq!(verdict.level, TrustLevel::Untrusted);
    }

    #[test]
    fn test_low_score_is_untrusted() {
        let verdict = compute_trust_verdict(30, 30, 30);
        assert_eq!(verdict.level, TrustLevel::Untrusted);
    }

    #[test]
    fn test_high_requires_min_component_70() {
        let verdict = compute_trust_verdict(100, 100, 50);
        // score = 0.30*100 + 0.35*100 + 0.35*50 = 30+35+17.5 = 82.5 -> round 83 (below 85)
        assert_ne!(verdict.level, TrustLevel::High);
    }

    #[test]
    fn test_high_when_score_and_min_component_qualify() {
        let verdict = compute_trust_verdict(90, 90, 75);
        assert_eq!(verdict.level, TrustLevel::High);
    }

    #[test]
    fn test_moderate_band() {
        let verdict = compute_trust_verdict(70, 70, 60);
        assert_eq!(verdict.level, TrustLevel::Moderate);
    }

    #[test]
    fn test_low_when_neither_high_nor_moderate_bounds_met() {
        let verdict = compute_trust_verdict(60, 60, 45);
        assert_eq!(verdict.level, TrustLevel::Low);
    }

    #[test]
    fn test_trust_level_ordering() {
        assert!(TrustLevel::Verified > TrustLevel::High);
        assert!(TrustLevel::High > TrustLevel::Moderate);
        assert!(TrustLevel::Moderate > TrustLevel::Low);
        assert!(TrustLevel::Low > TrustLevel::Untrusted);
    }
}
