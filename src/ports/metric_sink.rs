use async_trait::async_trait;

use crate::domain::MetricSample;
use crate::error::TransportError;

/// Port for shipping a batch of samples to a push backend
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Replace the job's metrics with this batch
    async fn push(&self, samples: &[MetricSample]) -> Result<(), TransportError>;

    /// Remove the job's metrics from the backend
    async fn delete(&self) -> Result<(), TransportError>;
}
