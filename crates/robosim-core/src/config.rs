//! Engine-wide settings, passed explicitly at factory construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Timing and spatial resolution of a simulation run. Missing fields fall
/// back to [`SimulationConfig::default`] when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Delay between two behavior steps of one execution context.
    pub tick_interval_ms: u64,
    /// Spacing of the free-space grid used by path finding.
    pub grid_step: u32,
    /// Per-axis step cap for robots built from layouts.
    pub robot_speed: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            grid_step: 5,
            robot_speed: 5,
        }
    }
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.grid_step == 0 {
            return Err(ConfigurationError::ZeroSetting { field: "grid_step" });
        }
        if self.robot_speed == 0 {
            return Err(ConfigurationError::ZeroSetting {
                field: "robot_speed",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
    }

    #[test]
    fn zero_grid_step_is_rejected() {
        let config = SimulationConfig {
            grid_step: 0,
            ..SimulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::ZeroSetting { field: "grid_step" })
        );
    }
}
