pub mod exposition;
pub mod inventory;
pub mod probe;
pub mod pushgateway;
pub mod store;

pub use exposition::ServerCollector;
pub use probe::{OsProbe, ProbeConfig, TcpPortCheck};
pub use pushgateway::PushgatewayClient;
pub use store::StatCache;
