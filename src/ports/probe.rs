use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::TargetDescriptor;
use crate::error::{ConnectError, ProbeError};

/// Cumulative traffic counters for one network adapter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NicCounters {
    pub received_bytes: f64,
    pub sent_bytes: f64,
}

/// Port for reaching a target and opening a credentialed session on it
#[async_trait]
pub trait Probe: Send + Sync {
    /// Cheap reachability check that needs no credential
    async fn online(&self, target: &TargetDescriptor) -> bool;

    /// Log in with the descriptor's credential
    async fn connect(&self, target: &TargetDescriptor) -> Result<Box<dyn Session>, ConnectError>;
}

/// An established session able to answer metric queries
#[async_trait]
pub trait Session: Send + Sync {
    /// CPU utilization in percent
    async fn cpu_utilization(&self) -> Result<f64, ProbeError>;

    /// Memory utilization in percent
    async fn mem_utilization(&self) -> Result<f64, ProbeError>;

    /// Usage percent per local disk. `None` when the platform does not report it.
    async fn disk_utilization(&self) -> Result<Option<BTreeMap<String, f64>>, ProbeError> {
        Ok(None)
    }

    /// Traffic counters per adapter. `None` when the platform does not report it.
    async fn nic_utilization(&self) -> Result<Option<BTreeMap<String, NicCounters>>, ProbeError> {
        Ok(None)
    }

    /// End the remote session. Best effort: failures are logged, never returned.
    async fn close(&self) {}
}
