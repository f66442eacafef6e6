use agenttrust_proto::{WitnessEvent, WitnessRecord};

use crate::types::{CorrelationOptions, InfrastructurePattern, NoiseClass, builtin_infrastructure_patterns};

fn matches_infrastructure_pattern(host: &str, port: Option<u16>, pattern: &InfrastructurePattern) -> bool {
    if let Some(expected_port) = pattern.port {
        if port != Some(expected_port) {
            return false;
        }
    }
    if let Some(suffix) = pattern.host.strip_prefix('*') {
        return host.ends_with(suffix);
    }
    if let Some(prefix) = pattern.host.strip_suffix(".*") {
        return host == prefix || host.starts_with(&format!("{prefix}."));
    }
    host == pattern.host
}

fn is_infrastructure(host: &str, port: Option<u16>, opts: &CorrelationOptions) -> bool {
    builtin_infrastructure_patterns()
        .iter()
        .chain(opts.custom_infrastructure_patterns.iter())
        .any(|p| matches_infrastructure_pattern(host, port, p))
}

fn is_background_noise_command(command: &str, opts: &CorrelationOptions) -> bool {
    opts.background_noise_commands.iter().any(|n| command.contains(n.as_str()))
}

/// Classify one witness entry as background noise, known infrastructure
/// traffic, or agent-relevant activity worth correlating.
pub fn classify(witness: &WitnessRecord, opts: &CorrelationOptions) -> NoiseClass {
    match &witness.payload.event {
        WitnessEvent::ProcessSpawned(d) | WitnessEvent::ProcessExited(d) => {
            if is_background_noise_command(&d.command, opts) {
                return NoiseClass::BackgroundNoise;
            }
            NoiseClass::AgentRelevant
        }
        WitnessEvent::ConnectionOpened(d) | WitnessEvent::ConnectionClosed(d) | WitnessEvent::DnsQuery(d) => {
            if is_infrastructure(&d.remote_host, d.remote_port, opts) {
                return NoiseClass::Infrastructure;
            }
            NoiseClass::AgentRelevant
        }
        WitnessEvent::FileCreated(_) | WitnessEvent::FileModified(_) | WitnessEvent::FileDeleted(_) | WitnessEvent::FileAccessed(_) => {
            NoiseClass::AgentRelevant
        }
    }
}
