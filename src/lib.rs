//! Fleet health poller: probes Linux, Windows and ESXi hosts, keeps the
//! latest reading per host and exports it to Prometheus.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod interface;
pub mod logging;
pub mod ports;

#[cfg(test)]
pub(crate) mod testing;
