//! YAML configuration consumed (not owned) by the core: a risk threshold,
//! a log retention window, and witness infrastructure patterns. Never
//! throws — a missing or malformed file just yields defaults.

#![forbid(unsafe_code)]

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfrastructurePatternConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WitnessSettings {
    #[serde(default, rename = "infrastructurePatterns")]
    pub infrastructure_patterns: Vec<InfrastructurePatternConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTrustConfig {
    #[serde(rename = "riskThreshold", default = "default_risk_threshold")]
    pub risk_threshold: u8,
    #[serde(rename = "logRetentionDays", default = "default_log_retention_days")]
    pub log_retention_days: u32,
    #[serde(default)]
    pub witness: WitnessSettings,
}

fn default_risk_threshold() -> u8 {
    7
}

fn default_log_retention_days() -> u32 {
    90
}

impl Default for AgentTrustConfig {
    fn default() -> Self {
        Self { risk_threshold: default_risk_threshold(), log_retention_days: default_log_retention_days(), witness: WitnessSettings::default() }
    }
}

/// Load `path` as YAML. Missing file or parse failure both yield
/// [`AgentTrustConfig::default`] rather than erroring.
pub fn load_config(path: &Path) -> AgentTrustConfig {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return AgentTrustConfig::default(),
    };
    match serde_yaml::from_str(&contents) {
        Ok(config) => config,
        Err(error) => {
            warn!(path = %path.display(), %error, "malformed config file, falling back to defaults");
            AgentTrustConfig::default()
        }
    }
}

/// `loadInfrastructurePatterns(path) → list`. Never throws.
pub fn load_infrastructure_patterns(path: &Path) -> Vec<InfrastructurePatternConfig> {
    load_config(path).witness.infrastructure_patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/agenttrust.yaml"));
        assert_eq!(config.risk_threshold, 7);
        assert_eq!(config.log_retention_days, 90);
        assert!(config.witness.infrastructure_patterns.is_empty());
    }

    #[test]
    fn test_malformed_file_yields_defaults_not_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "riskThreshold: [this is not valid: :: yaml").unwrap();
        let config = load_config(&path);
        assert_eq!(config.risk_threshold, 7);
    }

    #[test]
    fn test_parses_full_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agenttrust.yaml");
        fs::write(
            &path,
            r#"
riskThreshold: 5
logRetentionDays: 30
witness:
  infrastructurePatterns:
    - host: "*.internal.example.com"
      label: "internal"
    - host: "api.example.com"
      port: 443
      label: "example-api"
"#,
        )
        .unwrap();

        let config = load_config(&path);
        assert_eq!(config.risk_threshold, 5);
        assert_eq!(config.log_retention_days, 30);
        assert_eq!(config.witness.infrastructure_patterns.len(), 2);
        assert_eq!(config.witness.infrastructure_patterns[1].port, Some(443));
    }

    #[test]
    fn test_load_infrastructure_patterns_delegates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agenttrust.yaml");
        fs::write(&path, "witness:\n  infrastructurePatterns:\n    - host: x.com\n      label: x\n").unwrap();
        let patterns = load_infrastructure_patterns(&path);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].host, "x.com");
    }

    #[test]
    fn test_load_infrastructure_patterns_empty_on_missing_file() {
        let patterns = load_infrastructure_patterns(Path::new("/nonexistent/agenttrust.yaml"));
        assert!(patterns.is_empty());
    }
}
