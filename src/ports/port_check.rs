use async_trait::async_trait;

/// Port for TCP reachability tests
#[async_trait]
pub trait PortCheck: Send + Sync {
    /// Whether a TCP connection to `host:port` succeeds within the checker's timeout
    async fn is_open(&self, host: &str, port: u16) -> bool;
}
