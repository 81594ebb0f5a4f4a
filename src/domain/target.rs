use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating system family of a monitored host
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OsKind {
    Linux,
    Windows,
    #[serde(rename = "esxi")]
    Hypervisor,
    #[default]
    #[serde(other)]
    Unknown,
}

impl OsKind {
    /// Label value used on the wire and in metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Hypervisor => "esxi",
            Self::Unknown => "unknown",
        }
    }

    /// Management port assumed for the kind, whichever signature port answered
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Linux => 22,
            Self::Windows => 5985,
            Self::Hypervisor => 443,
            Self::Unknown => 0,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "linux" => Self::Linux,
            "windows" => Self::Windows,
            "esxi" => Self::Hypervisor,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for OsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host under observation together with the credential used to log in
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub port: u16,
    #[serde(rename = "type", default)]
    pub os_kind: OsKind,
}

impl TargetDescriptor {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        port: u16,
        os_kind: OsKind,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            port,
            os_kind,
        }
    }

    /// Descriptor for a host whose kind was guessed but has no working credential yet
    pub fn unmatched(host: impl Into<String>, os_kind: OsKind) -> Self {
        Self::new(host, "", "", os_kind.default_port(), os_kind)
    }

    pub fn with_credential(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Fill in the kind's default port when the descriptor left it out
    pub fn with_default_port(mut self) -> Self {
        if self.port == 0 {
            self.port = self.os_kind.default_port();
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.host.is_empty()
            && !self.user.is_empty()
            && !self.password.is_empty()
            && self.port != 0
            && self.os_kind.is_known()
    }

    /// `host:port` for socket-level operations
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

// Keeps passwords out of log lines.
impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDescriptor")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("port", &self.port)
            .field("os_kind", &self.os_kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_wire_format() {
        let json = r#"[
            {"host": "10.0.0.1", "user": "root", "password": "pw", "port": 22, "type": "linux"},
            {"host": "10.0.0.2", "user": "admin", "password": "pw", "port": 5985, "type": "windows"},
            {"host": "10.0.0.3", "user": "root", "password": "pw", "port": 443, "type": "esxi"},
            {"host": "10.0.0.4", "user": "root", "password": "pw", "port": 22, "type": "solaris"}
        ]"#;
        let targets: Vec<TargetDescriptor> = serde_json::from_str(json).unwrap();

        let kinds: Vec<OsKind> = targets.iter().map(|t| t.os_kind).collect();
        assert_eq!(
            kinds,
            vec![OsKind::Linux, OsKind::Windows, OsKind::Hypervisor, OsKind::Unknown]
        );
        assert!(targets[2].is_valid());
        assert!(!targets[3].is_valid());
    }

    #[test]
    fn test_missing_fields_decode_to_invalid_descriptor() {
        let json = r#"{"user": "u", "password": "p"}"#;
        let target: TargetDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(target.os_kind, OsKind::Unknown);
        assert!(target.host.is_empty());
        assert!(!target.is_valid());
    }

    #[test]
    fn test_encode_uses_wire_names() {
        let target = TargetDescriptor::new("h", "u", "p", 443, OsKind::Hypervisor);
        let value = serde_json::to_value(&target).unwrap();
        assert_eq!(value["type"], "esxi");
        assert_eq!(value["password"], "p");

        let unknown = TargetDescriptor::unmatched("h", OsKind::Unknown);
        assert_eq!(serde_json::to_value(&unknown).unwrap()["type"], "unknown");
    }

    #[test]
    fn test_validity() {
        assert!(TargetDescriptor::new("h", "u", "p", 22, OsKind::Linux).is_valid());
        assert!(!TargetDescriptor::new("", "u", "p", 22, OsKind::Linux).is_valid());
        assert!(!TargetDescriptor::new("h", "", "p", 22, OsKind::Linux).is_valid());
        assert!(!TargetDescriptor::new("h", "u", "", 22, OsKind::Linux).is_valid());
        assert!(!TargetDescriptor::new("h", "u", "p", 0, OsKind::Linux).is_valid());
    }

    #[test]
    fn test_default_port_filled_only_when_missing() {
        let json = r#"{"host": "h", "user": "u", "password": "p", "type": "windows"}"#;
        let target: TargetDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(target.port, 0);
        assert_eq!(target.with_default_port().port, 5985);

        let explicit = TargetDescriptor::new("h", "u", "p", 5986, OsKind::Windows);
        assert_eq!(explicit.with_default_port().port, 5986);
    }

    #[test]
    fn test_debug_hides_password() {
        let target = TargetDescriptor::new("h", "u", "hunter2", 22, OsKind::Linux);
        assert!(!format!("{:?}", target).contains("hunter2"));
    }

    #[test]
    fn test_address_brackets_ipv6() {
        let target = TargetDescriptor::new("fe80::1", "u", "p", 22, OsKind::Linux);
        assert_eq!(target.address(), "[fe80::1]:22");
    }
}
