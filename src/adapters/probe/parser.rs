use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::error::ProbeError;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing field: {0}")]
    MissingField(String),
}

impl From<ParseError> for ProbeError {
    fn from(err: ParseError) -> Self {
        ProbeError::Parse(err.to_string())
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Aggregate CPU counters from a `/proc/stat` cpu line
#[derive(Debug, Clone, Default)]
pub struct CpuStat {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuStat {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    pub fn busy(&self) -> u64 {
        self.total() - self.idle - self.iowait
    }

    /// Busy share of the interval between `previous` and `self`, in percent
    pub fn usage_since(&self, previous: &CpuStat) -> f64 {
        let total_delta = self.total().saturating_sub(previous.total());
        if total_delta == 0 {
            return 0.0;
        }
        let busy_delta = self.busy().saturating_sub(previous.busy());
        (busy_delta as f64 / total_delta as f64) * 100.0
    }
}

fn parse_cpu_line(line: &str) -> ParseResult<CpuStat> {
    let parts: Vec<&str> = line.split_whitespace().skip(1).collect();
    if parts.len() < 8 {
        return Err(ParseError::Parse("Incomplete cpu stat".to_string()));
    }

    let field = |i: usize, name: &str| -> ParseResult<u64> {
        parts[i]
            .parse()
            .map_err(|e| ParseError::Parse(format!("{}: {}", name, e)))
    };

    Ok(CpuStat {
        user: field(0, "user")?,
        nice: field(1, "nice")?,
        system: field(2, "system")?,
        idle: field(3, "idle")?,
        iowait: field(4, "iowait")?,
        irq: field(5, "irq")?,
        softirq: field(6, "softirq")?,
        steal: field(7, "steal")?,
    })
}

/// Parse every aggregate `cpu ` line in command output, in order
pub fn parse_cpu_samples(content: &str) -> ParseResult<Vec<CpuStat>> {
    let samples = content
        .lines()
        .filter(|line| line.starts_with("cpu "))
        .map(parse_cpu_line)
        .collect::<ParseResult<Vec<_>>>()?;

    if samples.is_empty() {
        return Err(ParseError::MissingField("cpu".to_string()));
    }
    Ok(samples)
}

/// CPU utilization from two consecutive samples
pub fn cpu_usage_percent(content: &str) -> ParseResult<f64> {
    let samples = parse_cpu_samples(content)?;
    match samples.as_slice() {
        [.., previous, current] => Ok(current.usage_since(previous)),
        _ => Err(ParseError::Parse("Need two cpu samples".to_string())),
    }
}

/// Parse `/proc/meminfo` into a map of kB values
pub fn parse_meminfo(content: &str) -> HashMap<String, u64> {
    let mut map = HashMap::new();

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value_str = value.trim().trim_end_matches(" kB");

        if let Ok(value) = value_str.parse::<u64>() {
            map.insert(key.trim().to_string(), value);
        }
    }

    map
}

/// Used memory in percent, preferring `MemAvailable` when the kernel has it
pub fn mem_usage_percent(content: &str) -> ParseResult<f64> {
    let meminfo = parse_meminfo(content);

    let total = *meminfo
        .get("MemTotal")
        .ok_or_else(|| ParseError::MissingField("MemTotal".to_string()))?;
    if total == 0 {
        return Err(ParseError::Parse("MemTotal is zero".to_string()));
    }

    let available = match meminfo.get("MemAvailable") {
        Some(available) => *available,
        None => {
            let free = *meminfo
                .get("MemFree")
                .ok_or_else(|| ParseError::MissingField("MemFree".to_string()))?;
            free + meminfo.get("Buffers").unwrap_or(&0) + meminfo.get("Cached").unwrap_or(&0)
        }
    };

    let used = total.saturating_sub(available);
    Ok((used as f64 / total as f64) * 100.0)
}

/// Usage percent per mount point from `df -P` output, block devices only
pub fn parse_df(content: &str) -> ParseResult<BTreeMap<String, f64>> {
    let mut disks = BTreeMap::new();

    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 || !parts[0].starts_with("/dev/") {
            continue;
        }

        let used: f64 = parts[2]
            .parse()
            .map_err(|e| ParseError::Parse(format!("used: {}", e)))?;
        let available: f64 = parts[3]
            .parse()
            .map_err(|e| ParseError::Parse(format!("available: {}", e)))?;
        if used + available == 0.0 {
            continue;
        }

        disks.insert(parts[5..].join(" "), used * 100.0 / (used + available));
    }

    Ok(disks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_usage_from_two_samples() {
        let content = "cpu  1000 0 500 8000 500 0 0 0\ncpu  1100 0 600 8700 600 0 0 0\n";
        // total delta 1000, busy delta 200
        let usage = cpu_usage_percent(content).unwrap();
        assert!((usage - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_usage_needs_two_samples() {
        assert!(cpu_usage_percent("cpu  1 2 3 4 5 6 7 8\n").is_err());
        assert!(cpu_usage_percent("garbage\n").is_err());
    }

    #[test]
    fn test_mem_usage_prefers_available() {
        let content = "MemTotal:       1000 kB\nMemFree:         100 kB\nMemAvailable:    250 kB\n";
        assert_eq!(mem_usage_percent(content).unwrap(), 75.0);
    }

    #[test]
    fn test_mem_usage_falls_back_to_free_buffers_cached() {
        let content = "MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 50 kB\nCached: 350 kB\n";
        assert_eq!(mem_usage_percent(content).unwrap(), 50.0);
        assert!(mem_usage_percent("MemFree: 1 kB\n").is_err());
    }

    #[test]
    fn test_parse_df() {
        let content = "Filesystem     1024-blocks    Used Available Capacity Mounted on\n\
                       /dev/sda1         1000       250       750      25% /\n\
                       tmpfs              100        10        90      10% /run\n\
                       /dev/sdb1          400       300       100      75% /data disk\n";
        let disks = parse_df(content).unwrap();
        assert_eq!(disks.len(), 2);
        assert_eq!(disks["/"], 25.0);
        assert_eq!(disks["/data disk"], 75.0);
    }
}
