use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::StatSnapshot;

/// In-memory map of host to its last-known snapshot.
///
/// Every method takes the lock for exactly one write or one copy, so it is
/// never held across an `.await`.
#[derive(Debug, Default)]
pub struct StatCache {
    snapshots: Mutex<HashMap<String, StatSnapshot>>,
}

impl StatCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StatSnapshot>> {
        // A panicking writer cannot leave a half-written snapshot behind
        // (insert is a single move), so the map is still consistent.
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the snapshot for a host
    pub fn store(&self, host: impl Into<String>, snapshot: StatSnapshot) {
        self.lock().insert(host.into(), snapshot);
    }

    pub fn get(&self, host: &str) -> Option<StatSnapshot> {
        self.lock().get(host).cloned()
    }

    /// Copy of the whole cache, sorted by host
    pub fn snapshot(&self) -> Vec<(String, StatSnapshot)> {
        let mut entries: Vec<(String, StatSnapshot)> = {
            let snapshots = self.lock();
            snapshots
                .iter()
                .map(|(host, snapshot)| (host.clone(), snapshot.clone()))
                .collect()
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
