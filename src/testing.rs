//! In-memory probe and port check doubles shared by unit tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::TargetDescriptor;
use crate::error::{ConnectError, ProbeError};
use crate::ports::{PortCheck, Probe, Session};

/// Scripted behaviour of one fake host
#[derive(Debug, Clone)]
pub struct FakeHost {
    online: bool,
    accepted: Option<Vec<(String, String)>>,
    cpu: Option<f64>,
    mem: Option<f64>,
    latency: Duration,
}

impl FakeHost {
    pub fn offline() -> Self {
        Self {
            online: false,
            accepted: None,
            cpu: None,
            mem: None,
            latency: Duration::ZERO,
        }
    }

    /// Online, accepts any credential, answers both queries
    pub fn healthy(cpu: f64, mem: f64) -> Self {
        Self {
            online: true,
            cpu: Some(cpu),
            mem: Some(mem),
            ..Self::offline()
        }
    }

    /// Only this credential (and others added the same way) may log in
    pub fn accepting(mut self, user: &str, password: &str) -> Self {
        self.accepted
            .get_or_insert_with(Vec::new)
            .push((user.to_string(), password.to_string()));
        self
    }

    pub fn failing_cpu(mut self) -> Self {
        self.cpu = None;
        self
    }

    pub fn failing_mem(mut self) -> Self {
        self.mem = None;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn accepts(&self, target: &TargetDescriptor) -> bool {
        match &self.accepted {
            None => true,
            Some(accepted) => accepted
                .iter()
                .any(|(user, password)| *user == target.user && *password == target.password),
        }
    }
}

/// Probe over a fixed table of fake hosts; unknown hosts are offline
#[derive(Default)]
pub struct FakeProbe {
    hosts: HashMap<String, FakeHost>,
    attempts: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, fake: FakeHost) -> Self {
        self.hosts.insert(host.to_string(), fake);
        self
    }

    /// `(host, user)` of every connect call, in call order
    pub fn attempts(&self) -> Vec<(String, String)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    /// Sessions handed out and later closed
    pub fn closed_sessions(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `online` calls seen
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for FakeProbe {
    async fn online(&self, target: &TargetDescriptor) -> bool {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let online = match self.hosts.get(&target.host) {
            Some(fake) => {
                tokio::time::sleep(fake.latency).await;
                fake.online
            }
            None => false,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        online
    }

    async fn connect(&self, target: &TargetDescriptor) -> Result<Box<dyn Session>, ConnectError> {
        self.attempts
            .lock()
            .unwrap()
            .push((target.host.clone(), target.user.clone()));

        match self.hosts.get(&target.host) {
            Some(fake) if fake.online && fake.accepts(target) => Ok(Box::new(FakeSession {
                cpu: fake.cpu,
                mem: fake.mem,
                closed: Arc::clone(&self.closed),
            })),
            Some(fake) if fake.online => Err(ConnectError::Auth {
                host: target.host.clone(),
            }),
            _ => Err(ConnectError::Unreachable {
                host: target.host.clone(),
                detail: "no route".to_string(),
            }),
        }
    }
}

struct FakeSession {
    cpu: Option<f64>,
    mem: Option<f64>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Session for FakeSession {
    async fn cpu_utilization(&self) -> Result<f64, ProbeError> {
        self.cpu.ok_or_else(|| ProbeError::Command("cpu query failed".to_string()))
    }

    async fn mem_utilization(&self) -> Result<f64, ProbeError> {
        self.mem.ok_or_else(|| ProbeError::Command("memory query failed".to_string()))
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Port check answering from a fixed table of open ports
#[derive(Debug, Default)]
pub struct FakePortCheck {
    open: HashMap<String, BTreeSet<u16>>,
}

impl FakePortCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open(mut self, host: &str, ports: &[u16]) -> Self {
        self.open
            .entry(host.to_string())
            .or_default()
            .extend(ports.iter().copied());
        self
    }
}

#[async_trait]
impl PortCheck for FakePortCheck {
    async fn is_open(&self, host: &str, port: u16) -> bool {
        self.open.get(host).is_some_and(|ports| ports.contains(&port))
    }
}
