pub mod exporter;
pub mod poller;
pub mod scanner;
pub mod scheduler;

pub use exporter::{push_rounds, MetricsExporter};
pub use poller::{poll_target, PollRoundExecutor, RoundCompletion};
pub use scanner::{classify, DiscoveryScanner, FINGERPRINT_PORTS};
pub use scheduler::Scheduler;
