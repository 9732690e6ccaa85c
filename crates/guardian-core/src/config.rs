use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime settings for the probe engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianConfig {
    /// Time between the start of two consecutive cycles (default: 60s).
    pub check_interval: Duration,
    /// Upper bound for a single TCP connect or UDP read (default: 5s).
    pub probe_timeout: Duration,
    /// Maximum number of probes in flight within one cycle.
    pub max_concurrent_probes: usize,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
            max_concurrent_probes: 16,
        }
    }
}

impl GuardianConfig {
    pub fn with_check_interval(mut self, secs: u64) -> Self {
        self.check_interval = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_probe_timeout(mut self, secs: u64) -> Self {
        self.probe_timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_max_concurrent_probes(mut self, max: usize) -> Self {
        self.max_concurrent_probes = max.max(1);
        self
    }
}
