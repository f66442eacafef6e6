use std::path::PathBuf;

/// Tunables shared by the three monitors and the daemon that owns them.
#[derive(Debug, Clone)]
pub struct WitnessConfig {
    pub watch_dirs: Vec<PathBuf>,
    pub exclude_patterns: Vec<String>,
    pub file_polling_ms: u64,
    pub process_polling_ms: u64,
    pub network_polling_ms: u64,
    pub buffer_size: usize,
    pub gateway_pid_file: Option<PathBuf>,
    pub gateway_process_name: Option<String>,
    /// Command substrings that identify background noise (launchd, system
    /// daemons, desktop helpers) rather than agent-relevant activity.
    pub background_noise_commands: Vec<String>,
}

impl Default for WitnessConfig {
    fn default() -> Self {
        Self {
            watch_dirs: Vec::new(),
            exclude_patterns: Vec::new(),
            file_polling_ms: 1000,
            process_polling_ms: 500,
            network_polling_ms: 2000,
            buffer_size: 50,
            gateway_pid_file: None,
            gateway_process_name: None,
            background_noise_commands: vec![
                "launchd".to_string(),
                "systemd".to_string(),
                "kernel_task".to_string(),
                "Finder".to_string(),
                "WindowServer".to_string(),
            ],
        }
    }
}
