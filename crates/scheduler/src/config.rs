//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_check_interval_secs() -> f64 {
    60.0
}

/// Tuning knobs for [`crate::WorkflowScheduler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the check loop scans jobs, in seconds.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_check_interval(interval: Duration) -> Self {
        Self {
            check_interval_secs: interval.as_secs_f64(),
        }
    }

    /// The check interval; never zero. Invalid values fall back to 60 s.
    pub fn check_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.check_interval_secs)
            .unwrap_or(Duration::from_secs(60))
            .max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_one_minute() {
        let config: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.check_interval(), Duration::from_secs(60));
    }

    #[test]
    fn nonsense_intervals_are_clamped() {
        let negative = SchedulerConfig { check_interval_secs: -5.0 };
        assert_eq!(negative.check_interval(), Duration::from_secs(60));
        let zero = SchedulerConfig { check_interval_secs: 0.0 };
        assert_eq!(zero.check_interval(), Duration::from_millis(1));
    }
}
