use std::path::PathBuf;

use thiserror::Error;

/// Malformed or unreadable descriptor/credential files. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure to establish a credentialed session with a target.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("{host} is unreachable: {detail}")]
    Unreachable { host: String, detail: String },

    #[error("authentication rejected by {host}")]
    Auth { host: String },

    #[error("transport error talking to {host}: {detail}")]
    Transport { host: String, detail: String },

    #[error("timed out connecting to {host}")]
    Timeout { host: String },

    #[error("no probe available for {host} (type {kind})")]
    Unsupported { host: String, kind: String },
}

/// A single metric query failed on an otherwise reachable target.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("command failed: {0}")]
    Command(String),

    #[error("unexpected output: {0}")]
    Parse(String),

    #[error("query timed out")]
    Timeout,
}

/// Push or delete against the metrics backend failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("invalid push URL {0}")]
    Url(String),
}
