mod hypervisor;
mod linux;
mod parser;
mod tcp;
mod windows;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{OsKind, TargetDescriptor};
use crate::error::{ConnectError, ProbeError};
use crate::ports::{NicCounters, PortCheck, Probe, Session};

pub use hypervisor::VsphereSession;
pub use linux::SshSession;
pub use tcp::TcpPortCheck;
pub use windows::WinRmSession;

/// Timeouts for the remote-execution adapters
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Bound on the reachability check
    pub online_timeout: Duration,
    /// Bound on login and on each metric query
    pub session_timeout: Duration,
}

impl ProbeConfig {
    pub fn new(online_timeout: Duration, session_timeout: Duration) -> Self {
        Self {
            online_timeout,
            session_timeout,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_secs(10))
    }
}

/// A live session on one of the supported platforms
pub enum Connection {
    Linux(SshSession),
    Windows(WinRmSession),
    Hypervisor(VsphereSession),
}

#[async_trait]
impl Session for Connection {
    async fn cpu_utilization(&self) -> Result<f64, ProbeError> {
        match self {
            Self::Linux(session) => session.cpu_utilization().await,
            Self::Windows(session) => session.cpu_utilization().await,
            Self::Hypervisor(session) => session.cpu_utilization().await,
        }
    }

    async fn mem_utilization(&self) -> Result<f64, ProbeError> {
        match self {
            Self::Linux(session) => session.mem_utilization().await,
            Self::Windows(session) => session.mem_utilization().await,
            Self::Hypervisor(session) => session.mem_utilization().await,
        }
    }

    async fn disk_utilization(&self) -> Result<Option<BTreeMap<String, f64>>, ProbeError> {
        match self {
            Self::Linux(session) => session.disk_utilization().await,
            Self::Windows(session) => session.disk_utilization().await,
            Self::Hypervisor(session) => session.disk_utilization().await,
        }
    }

    async fn nic_utilization(&self) -> Result<Option<BTreeMap<String, NicCounters>>, ProbeError> {
        match self {
            Self::Linux(session) => session.nic_utilization().await,
            Self::Windows(session) => session.nic_utilization().await,
            Self::Hypervisor(session) => session.nic_utilization().await,
        }
    }

    async fn close(&self) {
        match self {
            Self::Linux(session) => session.close().await,
            Self::Windows(session) => session.close().await,
            Self::Hypervisor(session) => session.close().await,
        }
    }
}

/// Probe that picks the adapter from the descriptor's OS kind
pub struct OsProbe {
    config: ProbeConfig,
    port_check: TcpPortCheck,
}

impl OsProbe {
    pub fn new(config: ProbeConfig) -> Self {
        let port_check = TcpPortCheck::new(config.online_timeout);
        Self { config, port_check }
    }

    pub async fn open(&self, target: &TargetDescriptor) -> Result<Connection, ConnectError> {
        let timeout = self.config.session_timeout;
        debug!(host = %target.host, kind = %target.os_kind, "Opening session");

        match target.os_kind {
            OsKind::Linux => SshSession::connect(target, timeout).await.map(Connection::Linux),
            OsKind::Windows => WinRmSession::connect(target, timeout)
                .await
                .map(Connection::Windows),
            OsKind::Hypervisor => VsphereSession::connect(target, timeout)
                .await
                .map(Connection::Hypervisor),
            OsKind::Unknown => Err(ConnectError::Unsupported {
                host: target.host.clone(),
                kind: target.os_kind.to_string(),
            }),
        }
    }
}

impl Default for OsProbe {
    fn default() -> Self {
        Self::new(ProbeConfig::default())
    }
}

#[async_trait]
impl Probe for OsProbe {
    /// TCP connect to the management port; needs no privileges, unlike ICMP
    async fn online(&self, target: &TargetDescriptor) -> bool {
        self.port_check.is_open(&target.host, target.port).await
    }

    async fn connect(&self, target: &TargetDescriptor) -> Result<Box<dyn Session>, ConnectError> {
        let connection = self.open(target).await?;
        Ok(Box::new(connection))
    }
}
