use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use super::OsKind;

/// One candidate login
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub password: String,
}

impl Credential {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Parse a `user:secret` entry. Splits at the first colon only.
    pub fn parse(entry: &str) -> Option<Self> {
        let (user, password) = entry.split_once(':')?;
        if user.is_empty() {
            return None;
        }
        Some(Self::new(user, password))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Ordered candidate logins per OS kind; the first working entry wins
#[derive(Debug, Clone, Default)]
pub struct CredentialDatabase {
    entries: HashMap<OsKind, Vec<Credential>>,
}

impl CredentialDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the on-disk shape `{"linux": ["user:secret", ...], ...}`
    pub fn from_raw(raw: HashMap<String, Vec<String>>) -> Self {
        let mut db = Self::new();

        for (label, entries) in raw {
            let kind = OsKind::from_label(&label);
            if !kind.is_known() {
                warn!(kind = %label, "Skipping credentials for unsupported server type");
                continue;
            }

            for (index, entry) in entries.iter().enumerate() {
                match Credential::parse(entry) {
                    Some(credential) => db.push(kind, credential),
                    None => warn!(
                        kind = %label,
                        index,
                        "Skipping malformed credential entry, expected user:secret"
                    ),
                }
            }
        }

        db
    }

    pub fn push(&mut self, kind: OsKind, credential: Credential) {
        self.entries.entry(kind).or_default().push(credential);
    }

    pub fn with(mut self, kind: OsKind, credential: Credential) -> Self {
        self.push(kind, credential);
        self
    }

    /// Candidates for a kind, in list order
    pub fn candidates(&self, kind: OsKind) -> &[Credential] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_first_colon() {
        let credential = Credential::parse("admin:pa:ss").unwrap();
        assert_eq!(credential.user, "admin");
        assert_eq!(credential.password, "pa:ss");

        assert!(Credential::parse("nocolon").is_none());
        assert!(Credential::parse(":secret").is_none());
    }

    #[test]
    fn test_from_raw_keeps_order_and_skips_bad_entries() {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(
            r#"{
                "linux": ["u1:p1", "broken", "u2:p2"],
                "esxi": ["root:vmware"],
                "plan9": ["glenda:x"]
            }"#,
        )
        .unwrap();

        let db = CredentialDatabase::from_raw(raw);

        let users: Vec<&str> = db
            .candidates(OsKind::Linux)
            .iter()
            .map(|c| c.user.as_str())
            .collect();
        assert_eq!(users, vec!["u1", "u2"]);
        assert_eq!(db.candidates(OsKind::Hypervisor).len(), 1);
        assert!(db.candidates(OsKind::Windows).is_empty());
        assert_eq!(db.len(), 3);
    }
}
