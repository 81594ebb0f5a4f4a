use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{PollRoundExecutor, RoundCompletion};

/// Runs a poll round on every tick of a fixed interval.
///
/// A round is awaited before the next tick is taken, so rounds never
/// overlap; ticks missed during a long round are skipped.
pub struct Scheduler {
    executor: PollRoundExecutor,
    interval: Duration,
}

impl Scheduler {
    pub fn new(executor: PollRoundExecutor, interval: Duration) -> Self {
        Self { executor, interval }
    }

    /// Loop until `shutdown` resolves or the completion receiver goes away
    pub async fn run<F>(self, completions: mpsc::Sender<RoundCompletion>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.interval.as_secs_f64(),
            targets = self.executor.targets().len(),
            "Scheduler started"
        );

        let mut round = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            round += 1;
            let completion = self.executor.run_round(round).await;
            if completions.send(completion).await.is_err() {
                debug!(round, "Round completion receiver closed");
                break;
            }
        }

        info!(rounds = round, "Scheduler stopped");
    }
}
