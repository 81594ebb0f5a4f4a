//! JSON files on disk: server descriptors, credentials and scan input.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::domain::{CredentialDatabase, TargetDescriptor};
use crate::error::ConfigError;

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the server descriptor file. Entries that do not decode, are of an
/// unsupported type, miss fields or repeat an earlier host are logged and
/// skipped; only an unreadable file or one that is not a JSON array fails.
pub fn load_targets(path: &Path) -> Result<Vec<TargetDescriptor>, ConfigError> {
    let raw: Vec<serde_json::Value> = read_json(path)?;
    let total = raw.len();

    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(total);

    for (index, entry) in raw.into_iter().enumerate() {
        let target: TargetDescriptor = match serde_json::from_value(entry) {
            Ok(target) => target,
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed server descriptor");
                continue;
            }
        };

        if !target.os_kind.is_known() {
            warn!(
                "Server type {} is not supported ({}), please check the configuration",
                target.os_kind, target.host
            );
            continue;
        }

        let target = target.with_default_port();
        if !target.is_valid() {
            warn!(host = %target.host, "Skipping incomplete server descriptor");
            continue;
        }
        if !seen.insert(target.host.clone()) {
            warn!(host = %target.host, "Skipping duplicate server descriptor");
            continue;
        }

        targets.push(target);
    }

    info!(
        path = %path.display(),
        loaded = targets.len(),
        skipped = total - targets.len(),
        "Loaded server descriptors"
    );
    Ok(targets)
}

pub fn load_credentials(path: &Path) -> Result<CredentialDatabase, ConfigError> {
    let raw: HashMap<String, Vec<String>> = read_json(path)?;
    let db = CredentialDatabase::from_raw(raw);
    info!(path = %path.display(), credentials = db.len(), "Loaded credential database");
    Ok(db)
}

/// Scan input: a JSON array of host names or addresses
pub fn load_hosts(path: &Path) -> Result<Vec<String>, ConfigError> {
    let hosts: Vec<String> = read_json(path)?;
    Ok(hosts
        .into_iter()
        .map(|host| host.trim().to_string())
        .filter(|host| !host.is_empty())
        .collect())
}

/// Write descriptors as pretty-printed JSON, replacing the file
pub fn write_targets(path: &Path, targets: &[TargetDescriptor]) -> Result<(), ConfigError> {
    let encoded = serde_json::to_string_pretty(targets).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, encoded + "\n").map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
