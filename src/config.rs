//! Runtime configuration for the emulation core.
//!
//! Defaults suit an interactive HUD; every field can be overridden from the
//! environment with [`CoreConfig::from_env`].

use std::time::Duration;

use crate::debug_flags::{env_flag, env_u64};
use crate::memory::{RDRAM_EXPANDED_SIZE, RDRAM_SIZE};

#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// How often the worker publishes a telemetry snapshot.
    pub report_interval: Duration,
    /// Instructions executed between two safe points.
    pub steps_per_slice: u64,
    /// Throttle target; `None` runs as fast as the host allows.
    pub target_ips: Option<u64>,
    /// Number of log lines kept for telemetry.
    pub log_capacity: usize,
    pub expansion_pak: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            report_interval: Duration::from_secs(1),
            steps_per_slice: 4096,
            target_ips: None,
            log_capacity: 64,
            expansion_pak: false,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Self {
        let mut config = CoreConfig::default();
        if let Some(ms) = env_u64("N64_REPORT_MS").filter(|&ms| ms > 0) {
            config.report_interval = Duration::from_millis(ms);
        }
        if let Some(steps) = env_u64("N64_SLICE_STEPS").filter(|&s| s > 0) {
            config.steps_per_slice = steps;
        }
        if let Some(ips) = env_u64("N64_TARGET_IPS").filter(|&ips| ips > 0) {
            config.target_ips = Some(ips);
        }
        if let Some(lines) = env_u64("N64_LOG_LINES").filter(|&l| l > 0) {
            config.log_capacity = lines as usize;
        }
        config.expansion_pak = env_flag("N64_EXPANSION_PAK", config.expansion_pak);
        config
    }

    pub fn rdram_size(&self) -> usize {
        if self.expansion_pak {
            RDRAM_EXPANDED_SIZE
        } else {
            RDRAM_SIZE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.report_interval, Duration::from_secs(1));
        assert_eq!(config.rdram_size(), RDRAM_SIZE);
        assert!(config.target_ips.is_none());
    }

    #[test]
    fn test_expansion_pak_doubles_rdram() {
        let config = CoreConfig {
            expansion_pak: true,
            ..CoreConfig::default()
        };
        assert_eq!(config.rdram_size(), 2 * RDRAM_SIZE);
    }
}
