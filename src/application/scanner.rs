//! Inventory discovery: guess each host's OS from its open ports, then find
//! the first credential that logs in.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::domain::{Credential, CredentialDatabase, OsKind, TargetDescriptor};
use crate::ports::{PortCheck, Probe};

/// Ports whose reachability feeds the OS guess.
///
/// - 902/903: vSphere client to VM (ESXi 5.x+ / 3.5–4.x), 443: vSphere client to host
/// - 445: Windows sharing, 3389: RDP, 5985/5986: WinRM HTTP/HTTPS
/// - 22: SSH
pub const FINGERPRINT_PORTS: [u16; 8] = [22, 443, 445, 902, 903, 3389, 5985, 5986];

/// Apply the signature rules in priority order; the first match wins
pub fn classify(open: &BTreeSet<u16>) -> OsKind {
    let has = |port: u16| open.contains(&port);

    if has(443) && (has(902) || has(903)) {
        OsKind::Hypervisor
    } else if has(3389) && (has(5985) || has(5986) || has(445)) {
        OsKind::Windows
    } else if has(22) {
        OsKind::Linux
    } else {
        OsKind::Unknown
    }
}

#[derive(Clone)]
pub struct DiscoveryScanner {
    port_check: Arc<dyn PortCheck>,
    probe: Arc<dyn Probe>,
    credentials: Arc<CredentialDatabase>,
}

impl DiscoveryScanner {
    pub fn new(
        port_check: Arc<dyn PortCheck>,
        probe: Arc<dyn Probe>,
        credentials: Arc<CredentialDatabase>,
    ) -> Self {
        Self {
            port_check,
            probe,
            credentials,
        }
    }

    pub async fn fingerprint(&self, host: &str) -> OsKind {
        let checks = FINGERPRINT_PORTS.iter().map(|&port| async move {
            (port, self.port_check.is_open(host, port).await)
        });

        let open: BTreeSet<u16> = join_all(checks)
            .await
            .into_iter()
            .filter_map(|(port, open)| open.then_some(port))
            .collect();

        let kind = classify(&open);
        debug!(host, ?open, kind = %kind, "Fingerprinted host");
        kind
    }

    /// Try the kind's credentials in list order; stop at the first that can
    /// log in and answer a CPU query
    pub async fn match_credential(&self, host: &str, kind: OsKind) -> Option<Credential> {
        for credential in self.credentials.candidates(kind) {
            let candidate = TargetDescriptor::unmatched(host, kind)
                .with_credential(credential.user.clone(), credential.password.clone());

            let session = match self.probe.connect(&candidate).await {
                Ok(session) => session,
                Err(e) => {
                    debug!(host, user = %credential.user, error = %e, "Credential rejected");
                    continue;
                }
            };

            let answered = session.cpu_utilization().await;
            session.close().await;

            match answered {
                Ok(_) => return Some(credential.clone()),
                Err(e) => {
                    debug!(host, user = %credential.user, error = %e, "Query failed after login")
                }
            }
        }
        None
    }

    /// Build the descriptor for one host
    pub async fn discover(&self, host: &str) -> TargetDescriptor {
        let kind = self.fingerprint(host).await;
        let descriptor = TargetDescriptor::unmatched(host, kind);

        if !kind.is_known() {
            warn!(host, "Could not determine the operating system");
            return descriptor;
        }

        match self.match_credential(host, kind).await {
            Some(credential) => {
                info!(host, kind = %kind, user = %credential.user, "Matched credential");
                descriptor.with_credential(credential.user, credential.password)
            }
            None => {
                warn!(host, kind = %kind, "No credential matched");
                descriptor
            }
        }
    }

    /// Discover all hosts concurrently. Output follows input order.
    pub async fn scan(&self, hosts: Vec<String>) -> Vec<TargetDescriptor> {
        let results = Arc::new(Mutex::new(Vec::with_capacity(hosts.len())));
        let mut tasks = JoinSet::new();

        for (index, host) in hosts.into_iter().enumerate() {
            let scanner = self.clone();
            let results = Arc::clone(&results);
            tasks.spawn(async move {
                let descriptor = scanner.discover(&host).await;
                results
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((index, descriptor));
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Discovery task did not finish");
            }
        }

        let mut collected =
            std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
        collected.sort_by_key(|(index, _)| *index);
        collected.into_iter().map(|(_, descriptor)| descriptor).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeHost, FakePortCheck, FakeProbe};

    fn open(ports: &[u16]) -> BTreeSet<u16> {
        ports.iter().copied().collect()
    }

    #[test]
    fn test_classify_priority() {
        assert_eq!(classify(&open(&[443, 902, 22])), OsKind::Hypervisor);
        assert_eq!(classify(&open(&[443, 903])), OsKind::Hypervisor);
        assert_eq!(classify(&open(&[3389, 445, 22])), OsKind::Windows);
        assert_eq!(classify(&open(&[3389, 5986])), OsKind::Windows);
        assert_eq!(classify(&open(&[22, 443])), OsKind::Linux);
        assert_eq!(classify(&open(&[3389, 22])), OsKind::Linux);
        assert_eq!(classify(&open(&[3389])), OsKind::Unknown);
        assert_eq!(classify(&open(&[])), OsKind::Unknown);
    }

    fn scanner(
        ports: FakePortCheck,
        probe: Arc<FakeProbe>,
        db: CredentialDatabase,
    ) -> DiscoveryScanner {
        DiscoveryScanner::new(Arc::new(ports), probe, Arc::new(db))
    }

    #[tokio::test]
    async fn test_fingerprint_prefers_hypervisor_over_linux() {
        let ports = FakePortCheck::new().with_open("esx", &[443, 902, 22]);
        let scanner = scanner(ports, Arc::new(FakeProbe::new()), CredentialDatabase::new());

        assert_eq!(scanner.fingerprint("esx").await, OsKind::Hypervisor);
    }

    #[tokio::test]
    async fn test_first_working_credential_wins() {
        let db = CredentialDatabase::new()
            .with(OsKind::Linux, Credential::new("u1", "p1"))
            .with(OsKind::Linux, Credential::new("u2", "p2"))
            .with(OsKind::Linux, Credential::new("u3", "p3"));
        let probe = Arc::new(FakeProbe::new().with_host(
            "box",
            FakeHost::healthy(1.0, 1.0).accepting("u2", "p2").accepting("u3", "p3"),
        ));
        let scanner = scanner(FakePortCheck::new(), probe.clone(), db);

        let credential = scanner.match_credential("box", OsKind::Linux).await.unwrap();
        assert_eq!(credential, Credential::new("u2", "p2"));

        let users: Vec<String> = probe.attempts().into_iter().map(|(_, user)| user).collect();
        assert_eq!(users, vec!["u1", "u2"]);
        assert_eq!(probe.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn test_login_without_working_query_is_skipped() {
        let db = CredentialDatabase::new()
            .with(OsKind::Windows, Credential::new("a", "1"))
            .with(OsKind::Windows, Credential::new("b", "2"));
        let win = FakeHost::healthy(1.0, 1.0).failing_cpu();
        let probe = Arc::new(FakeProbe::new().with_host("win", win));
        let scanner = scanner(FakePortCheck::new(), probe.clone(), db);

        assert!(scanner.match_credential("win", OsKind::Windows).await.is_none());
        assert_eq!(probe.connect_attempts(), 2);
        assert_eq!(probe.closed_sessions(), 2);
    }

    #[tokio::test]
    async fn test_scan_builds_descriptors_in_input_order() {
        let ports = FakePortCheck::new()
            .with_open("linux-box", &[22])
            .with_open("win-box", &[3389, 5985])
            .with_open("esx-box", &[443, 902]);
        let db = CredentialDatabase::new()
            .with(OsKind::Linux, Credential::new("root", "toor"))
            .with(OsKind::Hypervisor, Credential::new("root", "vmware"));
        let probe = Arc::new(
            FakeProbe::new()
                .with_host("linux-box", FakeHost::healthy(1.0, 1.0))
                .with_host("win-box", FakeHost::healthy(1.0, 1.0))
                .with_host("esx-box", FakeHost::healthy(1.0, 1.0).accepting("root", "other")),
        );
        let scanner = scanner(ports, probe, db);

        let hosts = vec!["linux-box", "dark", "win-box", "esx-box"]
            .into_iter()
            .map(String::from)
            .collect();
        let descriptors = scanner.scan(hosts).await;

        assert_eq!(
            descriptors,
            vec![
                TargetDescriptor::new("linux-box", "root", "toor", 22, OsKind::Linux),
                TargetDescriptor::new("dark", "", "", 0, OsKind::Unknown),
                TargetDescriptor::new("win-box", "", "", 5985, OsKind::Windows),
                TargetDescriptor::new("esx-box", "", "", 443, OsKind::Hypervisor),
            ]
        );
    }
}
