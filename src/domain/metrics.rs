use serde::Serialize;

use super::{OsKind, StatSnapshot};

/// Labels attached to every exported sample
pub const METRIC_LABELS: [&str; 2] = ["host", "type"];

/// The four gauges exported per host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Online,
    Accessible,
    CpuUtilization,
    MemUtilization,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        Self::Online,
        Self::Accessible,
        Self::CpuUtilization,
        Self::MemUtilization,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Accessible => "accessible",
            Self::CpuUtilization => "cpu_utilization",
            Self::MemUtilization => "mem_utilization",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Self::Online => "if the server answers on its management port: 1 - online, 0 - offline",
            Self::Accessible => {
                "if the server can be logged in with the configured credential: 1 - accessible, 0 - not accessible"
            }
            Self::CpuUtilization => "cpu utilization in percent",
            Self::MemUtilization => "memory utilization in percent",
        }
    }

    /// Read this metric out of a snapshot
    pub fn value_of(&self, snapshot: &StatSnapshot) -> f64 {
        match self {
            Self::Online => bool_gauge(snapshot.online),
            Self::Accessible => bool_gauge(snapshot.accessible),
            Self::CpuUtilization => snapshot.cpu_utilization,
            Self::MemUtilization => snapshot.mem_utilization,
        }
    }
}

fn bool_gauge(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

/// Static description of an exported metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDefinition {
    pub kind: MetricKind,
    pub name: &'static str,
    pub help: &'static str,
    pub labels: [&'static str; 2],
}

impl From<MetricKind> for MetricDefinition {
    fn from(kind: MetricKind) -> Self {
        Self {
            kind,
            name: kind.name(),
            help: kind.help(),
            labels: METRIC_LABELS,
        }
    }
}

/// One gauge reading for one host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub kind: MetricKind,
    pub host: String,
    pub os_kind: OsKind,
    pub value: f64,
}

impl MetricSample {
    pub fn new(kind: MetricKind, host: impl Into<String>, os_kind: OsKind, value: f64) -> Self {
        Self {
            kind,
            host: host.into(),
            os_kind,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_of_maps_flags_to_gauges() {
        let snapshot = StatSnapshot::accessible().with_cpu(12.5).with_mem(40.0);
        assert_eq!(MetricKind::Online.value_of(&snapshot), 1.0);
        assert_eq!(MetricKind::Accessible.value_of(&snapshot), 1.0);
        assert_eq!(MetricKind::CpuUtilization.value_of(&snapshot), 12.5);
        assert_eq!(MetricKind::MemUtilization.value_of(&snapshot), 40.0);
        assert_eq!(MetricKind::Online.value_of(&StatSnapshot::offline()), 0.0);
    }

    #[test]
    fn test_names_are_stable() {
        let names: Vec<&str> = MetricKind::ALL.iter().map(MetricKind::name).collect();
        assert_eq!(names, vec!["online", "accessible", "cpu_utilization", "mem_utilization"]);
    }
}
