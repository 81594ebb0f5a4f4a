use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::adapters::StatCache;
use crate::domain::{StatSnapshot, TargetDescriptor};
use crate::ports::Probe;

/// Fired once per round, after every target's snapshot has been written
#[derive(Debug, Clone, PartialEq)]
pub struct RoundCompletion {
    pub round: u64,
    pub targets: usize,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

/// Probe one target. Never fails: problems degrade to zeroed fields.
pub async fn poll_target(probe: &dyn Probe, target: &TargetDescriptor) -> StatSnapshot {
    if !probe.online(target).await {
        debug!(host = %target.host, "Target is offline");
        return StatSnapshot::offline();
    }

    let session = match probe.connect(target).await {
        Ok(session) => session,
        Err(e) => {
            warn!(host = %target.host, kind = %target.os_kind, error = %e, "Failed to log in");
            return StatSnapshot::unreachable_session();
        }
    };

    let (cpu, mem) = tokio::join!(session.cpu_utilization(), session.mem_utilization());
    session.close().await;

    let mut snapshot = StatSnapshot::accessible();
    match cpu {
        Ok(percent) => snapshot = snapshot.with_cpu(percent),
        Err(e) => warn!(host = %target.host, error = %e, "Failed to query CPU usage"),
    }
    match mem {
        Ok(percent) => snapshot = snapshot.with_mem(percent),
        Err(e) => warn!(host = %target.host, error = %e, "Failed to query memory usage"),
    }

    snapshot
}

/// Runs one poll round over the registered targets
pub struct PollRoundExecutor {
    targets: Arc<[TargetDescriptor]>,
    probe: Arc<dyn Probe>,
    cache: Arc<StatCache>,
    limit: Option<Arc<Semaphore>>,
}

impl PollRoundExecutor {
    pub fn new(
        targets: Vec<TargetDescriptor>,
        probe: Arc<dyn Probe>,
        cache: Arc<StatCache>,
    ) -> Self {
        Self {
            targets: targets.into(),
            probe,
            cache,
            limit: None,
        }
    }

    /// Cap on simultaneously probed targets; 0 means unbounded
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.limit = (max > 0).then(|| Arc::new(Semaphore::new(max)));
        self
    }

    pub fn targets(&self) -> &[TargetDescriptor] {
        &self.targets
    }

    /// Fan out one task per target and wait for all of them
    pub async fn run_round(&self, round: u64) -> RoundCompletion {
        let started = Instant::now();
        debug!(round, targets = self.targets.len(), "Starting poll round");

        let mut tasks = JoinSet::new();
        for target in self.targets.iter().cloned() {
            let probe = Arc::clone(&self.probe);
            let cache = Arc::clone(&self.cache);
            let limit = self.limit.clone();

            tasks.spawn(async move {
                let _permit = match limit {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                let snapshot = poll_target(probe.as_ref(), &target).await;
                cache.store(target.host, snapshot);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(round, error = %e, "Poll task did not finish, previous snapshot kept");
            }
        }

        let completion = RoundCompletion {
            round,
            targets: self.targets.len(),
            elapsed: started.elapsed(),
            finished_at: Utc::now(),
        };
        info!(
            round,
            targets = completion.targets,
            elapsed_ms = completion.elapsed.as_millis() as u64,
            "Poll round complete"
        );
        completion
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::Rng;

    use super::*;
    use crate::domain::OsKind;
    use crate::testing::{FakeHost, FakeProbe};

    fn linux(host: &str) -> TargetDescriptor {
        TargetDescriptor::new(host, "root", "secret", 22, OsKind::Linux)
    }

    #[tokio::test]
    async fn test_offline_target_is_all_zero() {
        let probe = FakeProbe::new().with_host("h", FakeHost::offline());
        let snapshot = poll_target(&probe, &linux("h")).await;

        assert!(snapshot.same_reading(&StatSnapshot::offline()));
        assert_eq!(probe.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_login_failure_is_online_only() {
        let locked = FakeHost::healthy(10.0, 20.0).accepting("root", "other");
        let probe = FakeProbe::new().with_host("h", locked);
        let snapshot = poll_target(&probe, &linux("h")).await;

        assert!(snapshot.online);
        assert!(!snapshot.accessible);
        assert_eq!(snapshot.cpu_utilization, 0.0);
        assert_eq!(snapshot.mem_utilization, 0.0);
    }

    #[tokio::test]
    async fn test_cpu_failure_keeps_memory() {
        let probe = FakeProbe::new().with_host("h", FakeHost::healthy(10.0, 55.0).failing_cpu());
        let snapshot = poll_target(&probe, &linux("h")).await;

        assert!(snapshot.online && snapshot.accessible);
        assert_eq!(snapshot.cpu_utilization, 0.0);
        assert_eq!(snapshot.mem_utilization, 55.0);
        assert_eq!(probe.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn test_every_opened_session_is_closed() {
        let probe = FakeProbe::new()
            .with_host("a", FakeHost::healthy(1.0, 2.0))
            .with_host("b", FakeHost::healthy(3.0, 4.0).failing_mem())
            .with_host("locked", FakeHost::healthy(1.0, 1.0).accepting("nobody", "x"));

        for host in ["a", "b", "locked"] {
            poll_target(&probe, &linux(host)).await;
        }

        assert_eq!(probe.connect_attempts(), 3);
        assert_eq!(probe.closed_sessions(), 2);
    }

    #[tokio::test]
    async fn test_memory_failure_keeps_cpu() {
        let probe = FakeProbe::new().with_host("h", FakeHost::healthy(33.0, 55.0).failing_mem());
        let snapshot = poll_target(&probe, &linux("h")).await;

        assert!(snapshot.online && snapshot.accessible);
        assert_eq!(snapshot.cpu_utilization, 33.0);
        assert_eq!(snapshot.mem_utilization, 0.0);
    }

    #[tokio::test]
    async fn test_round_writes_every_target_and_isolates_failures() {
        let probe = FakeProbe::new()
            .with_host("up", FakeHost::healthy(10.0, 20.0))
            .with_host("down", FakeHost::offline())
            .with_host("locked", FakeHost::healthy(10.0, 20.0).accepting("nobody", "x"));
        let cache = Arc::new(StatCache::new());
        let targets = vec![linux("up"), linux("down"), linux("locked")];
        let executor = PollRoundExecutor::new(targets, Arc::new(probe), Arc::clone(&cache));

        let completion = executor.run_round(1).await;

        assert_eq!(completion.round, 1);
        assert_eq!(completion.targets, 3);
        assert_eq!(cache.len(), 3);
        assert!(cache.get("up").unwrap().accessible);
        assert!(!cache.get("down").unwrap().online);
        let locked = cache.get("locked").unwrap();
        assert!(locked.online && !locked.accessible);
    }

    #[tokio::test]
    async fn test_fifty_targets_with_random_latency() {
        let mut rng = rand::rng();
        let mut probe = FakeProbe::new();
        let mut targets = Vec::new();
        for i in 0..50 {
            let host = format!("10.0.0.{}", i);
            let latency = Duration::from_millis(rng.random_range(0..40));
            let fake = FakeHost::healthy(i as f64, 100.0 - i as f64).with_latency(latency);
            probe = probe.with_host(&host, fake);
            targets.push(linux(&host));
        }

        let cache = Arc::new(StatCache::new());
        let executor = PollRoundExecutor::new(targets, Arc::new(probe), Arc::clone(&cache));
        let completion = tokio::time::timeout(Duration::from_secs(10), executor.run_round(7))
            .await
            .expect("round must terminate");

        assert_eq!(completion.targets, 50);
        assert_eq!(cache.len(), 50);
        for i in 0..50 {
            let snapshot = cache.get(&format!("10.0.0.{}", i)).unwrap();
            assert!(snapshot.online && snapshot.accessible);
            assert_eq!(snapshot.cpu_utilization, i as f64);
            assert_eq!(snapshot.mem_utilization, 100.0 - i as f64);
        }
    }

    #[tokio::test]
    async fn test_concurrency_bound_still_completes() {
        let mut probe = FakeProbe::new();
        let mut targets = Vec::new();
        for i in 0..10 {
            let host = format!("h{}", i);
            let fake = FakeHost::healthy(1.0, 1.0).with_latency(Duration::from_millis(5));
            probe = probe.with_host(&host, fake);
            targets.push(linux(&host));
        }
        let probe = Arc::new(probe);

        let cache = Arc::new(StatCache::new());
        let executor = PollRoundExecutor::new(targets, probe.clone(), Arc::clone(&cache))
            .with_max_concurrency(2);
        executor.run_round(1).await;

        assert_eq!(cache.len(), 10);
        assert!(probe.max_in_flight() <= 2);
    }
}
