//! Enforcement tunables.

use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

fn default_bucket_ttl_factor() -> u32 {
    2
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_slot_idle_secs() -> u64 {
    300
}

/// Tunables for the enforcement pipeline and its maintenance tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementConfig {
    /// Master switch; when false every request is allowed untouched.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Bucket idle TTL as a multiple of each bucket's window.
    #[serde(default = "default_bucket_ttl_factor")]
    pub bucket_ttl_factor: u32,

    /// Interval between maintenance sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Idle age after which a zero-count concurrency slot is reclaimed.
    #[serde(default = "default_slot_idle_secs")]
    pub slot_idle_secs: u64,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bucket_ttl_factor: default_bucket_ttl_factor(),
            sweep_interval_secs: default_sweep_interval_secs(),
            slot_idle_secs: default_slot_idle_secs(),
        }
    }
}

impl EnforcementConfig {
    /// Create a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the master switch.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the bucket TTL factor.
    #[must_use]
    pub fn with_bucket_ttl_factor(mut self, factor: u32) -> Self {
        self.bucket_ttl_factor = factor;
        self
    }

    /// Set the sweep interval.
    #[must_use]
    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket_ttl_factor == 0 {
            return Err("bucket_ttl_factor must be > 0".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be > 0".to_string());
        }
        Ok(())
    }
}
