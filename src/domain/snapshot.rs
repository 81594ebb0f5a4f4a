use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last-known health reading of one target, written wholesale once per round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub online: bool,
    pub accessible: bool,
    pub cpu_utilization: f64,
    pub mem_utilization: f64,
    pub collected_at: DateTime<Utc>,
}

impl StatSnapshot {
    /// Zero reading: offline, not accessible, no utilization
    pub fn offline() -> Self {
        Self {
            online: false,
            accessible: false,
            cpu_utilization: 0.0,
            mem_utilization: 0.0,
            collected_at: Utc::now(),
        }
    }

    /// Reachable, but no session could be established
    pub fn unreachable_session() -> Self {
        Self {
            online: true,
            ..Self::offline()
        }
    }

    pub fn accessible() -> Self {
        Self {
            online: true,
            accessible: true,
            ..Self::offline()
        }
    }

    pub fn with_cpu(mut self, percent: f64) -> Self {
        self.cpu_utilization = clamp_percent(percent);
        self
    }

    pub fn with_mem(mut self, percent: f64) -> Self {
        self.mem_utilization = clamp_percent(percent);
        self
    }

    /// Readings only, ignoring when they were taken
    pub fn same_reading(&self, other: &Self) -> bool {
        self.online == other.online
            && self.accessible == other.accessible
            && self.cpu_utilization == other.cpu_utilization
            && self.mem_utilization == other.mem_utilization
    }
}

impl Default for StatSnapshot {
    fn default() -> Self {
        Self::offline()
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_value() {
        let snapshot = StatSnapshot::default();
        assert!(!snapshot.online);
        assert!(!snapshot.accessible);
        assert_eq!(snapshot.cpu_utilization, 0.0);
        assert_eq!(snapshot.mem_utilization, 0.0);
    }

    #[test]
    fn test_percentages_are_clamped() {
        let snapshot = StatSnapshot::accessible().with_cpu(130.0).with_mem(f64::NAN);
        assert_eq!(snapshot.cpu_utilization, 100.0);
        assert_eq!(snapshot.mem_utilization, 0.0);
        assert_eq!(StatSnapshot::accessible().with_cpu(-3.0).cpu_utilization, 0.0);
    }
}
