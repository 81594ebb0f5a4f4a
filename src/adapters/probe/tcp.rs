use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use crate::ports::PortCheck;

/// Connect-and-close TCP reachability check
#[derive(Debug, Clone)]
pub struct TcpPortCheck {
    timeout: Duration,
}

impl TcpPortCheck {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpPortCheck {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait]
impl PortCheck for TcpPortCheck {
    async fn is_open(&self, host: &str, port: u16) -> bool {
        let open = matches!(
            timeout(self.timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        );
        trace!(host, port, open, "Port check");
        open
    }
}
