pub mod credentials;
pub mod metrics;
pub mod snapshot;
pub mod target;

pub use credentials::{Credential, CredentialDatabase};
pub use metrics::{MetricDefinition, MetricKind, MetricSample, METRIC_LABELS};
pub use snapshot::StatSnapshot;
pub use target::{OsKind, TargetDescriptor};
