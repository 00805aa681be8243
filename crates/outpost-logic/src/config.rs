//! Per-base policy switches.
//!
//! The defaults reproduce the stock ruleset; mods flip individual switches.

use serde::{Deserialize, Serialize};

/// Policy knobs consulted by the ledger, validator and cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    /// Allow placing next to unfinished facilities; the new build waits in
    /// the queue until a neighbour completes.
    pub allow_build_queue: bool,
    /// Strict storage limiting: a transitional facility's storage is not
    /// counted as available, so an upgrade cannot hide a shortfall.
    pub storage_limits_enforced: bool,
    /// Count quarters and storage of facilities mid-upgrade as available.
    pub count_transitional_capacity: bool,
    /// Radar range at or above which a radar counts as long range.
    pub long_range_radar_threshold: i32,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            allow_build_queue: true,
            storage_limits_enforced: false,
            count_transitional_capacity: true,
            long_range_radar_threshold: 1500,
        }
    }
}

/// Configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Long-range threshold must be positive.
    InvalidRadarThreshold(i32),
    /// Strict storage limiting has no effect without transitional capacity.
    StrictStorageWithoutTransitional,
}

/// Validate a config, returning every problem found.
pub fn validate_config(config: &BaseConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    if config.long_range_radar_threshold <= 0 {
        errors.push(ConfigError::InvalidRadarThreshold(
            config.long_range_radar_threshold,
        ));
    }
    if config.storage_limits_enforced && !config.count_transitional_capacity {
        errors.push(ConfigError::StrictStorageWithoutTransitional);
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&BaseConfig::default()).is_empty());
    }

    #[test]
    fn test_all_problems_are_reported() {
        let config = BaseConfig {
            long_range_radar_threshold: 0,
            storage_limits_enforced: true,
            count_transitional_capacity: false,
            ..BaseConfig::default()
        };
        let errors = validate_config(&config);
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ConfigError::InvalidRadarThreshold(0)));
        assert!(errors.contains(&ConfigError::StrictStorageWithoutTransitional));
    }
}
