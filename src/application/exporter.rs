use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::adapters::StatCache;
use crate::domain::{MetricDefinition, MetricKind, MetricSample, OsKind, TargetDescriptor};
use crate::error::TransportError;
use crate::ports::MetricSink;

use super::RoundCompletion;

/// Reads the stat cache as labelled gauge samples
pub struct MetricsExporter {
    cache: Arc<StatCache>,
    kinds: HashMap<String, OsKind>,
}

impl MetricsExporter {
    pub fn new(cache: Arc<StatCache>, targets: &[TargetDescriptor]) -> Self {
        let kinds = targets
            .iter()
            .map(|target| (target.host.clone(), target.os_kind))
            .collect();
        Self { cache, kinds }
    }

    /// The fixed set of exported gauges
    pub fn describe(&self) -> Vec<MetricDefinition> {
        MetricKind::ALL.iter().copied().map(MetricDefinition::from).collect()
    }

    /// One sample per gauge per cached host, ordered by host then gauge.
    ///
    /// The cache lock is held only while copying; samples are built from the copy.
    pub fn collect(&self) -> Vec<MetricSample> {
        let snapshots = self.cache.snapshot();

        let mut samples = Vec::with_capacity(snapshots.len() * MetricKind::ALL.len());
        for (host, snapshot) in &snapshots {
            let os_kind = self.kinds.get(host).copied().unwrap_or(OsKind::Unknown);
            for kind in MetricKind::ALL {
                let value = kind.value_of(snapshot);
                samples.push(MetricSample::new(kind, host.clone(), os_kind, value));
            }
        }
        samples
    }

    pub fn cache(&self) -> &StatCache {
        &self.cache
    }

    pub fn os_kind(&self, host: &str) -> OsKind {
        self.kinds.get(host).copied().unwrap_or(OsKind::Unknown)
    }
}

/// Push one batch per completed round until the channel closes.
///
/// The first transport failure is returned; the caller treats it as fatal.
pub async fn push_rounds(
    exporter: Arc<MetricsExporter>,
    sink: Arc<dyn MetricSink>,
    mut completions: mpsc::Receiver<RoundCompletion>,
) -> Result<(), TransportError> {
    while let Some(completion) = completions.recv().await {
        let samples = exporter.collect();

        if let Err(e) = sink.push(&samples).await {
            error!(round = completion.round, error = %e, "Failed to push metrics");
            return Err(e);
        }
        info!(round = completion.round, samples = samples.len(), "Pushed metrics");
    }
    Ok(())
}
