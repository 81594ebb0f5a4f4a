pub mod metric_sink;
pub mod port_check;
pub mod probe;

pub use metric_sink::MetricSink;
pub use port_check::PortCheck;
pub use probe::{NicCounters, Probe, Session};
