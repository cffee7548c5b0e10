//! Account and record types held by the ledger

use serde::{Deserialize, Serialize};

/// One DNS name bound to an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    /// Zone, e.g. `example.com`
    pub domain_name: String,
    /// Host record inside the zone, e.g. `home` or `@`
    pub rr: String,
    /// Provider-side record id; empty until the record exists upstream
    #[serde(default)]
    pub record_id: String,
}

impl DomainRecord {
    pub fn new(
        domain_name: impl Into<String>,
        rr: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            domain_name: domain_name.into(),
            rr: rr.into(),
            record_id: record_id.into(),
        }
    }

    /// True when this record is the (domain, rr) pair
    pub fn is(&self, domain_name: &str, rr: &str) -> bool {
        self.domain_name == domain_name && self.rr == rr
    }

    /// Fully-qualified name
    pub fn fqdn(&self) -> String {
        fqdn(&self.domain_name, &self.rr)
    }
}

/// Fully-qualified name of `rr` inside `domain_name`; `@` is the apex
pub fn fqdn(domain_name: &str, rr: &str) -> String {
    if rr == "@" {
        domain_name.to_string()
    } else {
        format!("{rr}.{domain_name}")
    }
}

/// A tenant of the relay
///
/// Values handed out by the ledger are snapshots; mutating one has no effect
/// on ledger state.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub secret_token: String,
    /// Raw 32-byte AES-256 key, stored as text
    pub encryption_key: String,
    /// Maximum number of bound records, always at least 1
    pub domain_limit: u32,
    pub records: Vec<DomainRecord>,
}

impl Account {
    /// True when the account holds (domain, rr)
    pub fn owns(&self, domain_name: &str, rr: &str) -> bool {
        self.records.iter().any(|r| r.is(domain_name, rr))
    }

    /// Key bytes for the envelope cipher
    pub fn key_bytes(&self) -> &[u8] {
        self.encryption_key.as_bytes()
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("secret_token", &"<REDACTED>")
            .field("encryption_key", &"<REDACTED>")
            .field("domain_limit", &self.domain_limit)
            .field("records", &self.records)
            .finish()
    }
}
