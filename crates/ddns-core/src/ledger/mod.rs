//! Record ownership ledger
//!
//! The authoritative map of accounts, their credentials, quotas and bound
//! records. All state sits behind one reader/writer lock that is held for the
//! whole of every operation, including the durable write that follows a
//! mutation. Two binds racing for the same name, from the same account or
//! from different ones, are therefore serialized and cannot both pass the
//! quota and ownership checks.
//!
//! Invariants after every successful operation:
//! - a (domain, rr) pair is held by at most one account
//! - an account never holds more records than its `domain_limit` allows
//! - every loaded account has a 32-byte encryption key

mod account;
mod store;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tokio::sync::RwLock;

pub use account::{Account, DomainRecord, fqdn};
use store::{AccountEntry, LedgerStore, StoreDocument};

use crate::crypto::KEY_LENGTH;
use crate::error::{Error, Result};

/// Concurrency-safe, durably persisted account ledger
#[derive(Debug)]
pub struct Ledger {
    store: LedgerStore,
    state: RwLock<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: BTreeMap<String, Account>,
    /// Entries rejected at load time, written back untouched so an operator
    /// can repair them
    quarantined: Vec<AccountEntry>,
}

impl LedgerState {
    fn document(&self) -> StoreDocument {
        let mut users: Vec<AccountEntry> = self.accounts.values().map(AccountEntry::from).collect();
        users.extend(self.quarantined.iter().cloned());
        StoreDocument::new(users)
    }

    fn owner_of(&self, domain_name: &str, rr: &str) -> Option<&str> {
        self.accounts
            .values()
            .find(|a| a.owns(domain_name, rr))
            .map(|a| a.username.as_str())
    }

    /// Quarantined entry still listing (domain, rr)
    ///
    /// Such names stay reserved so that repairing the entry cannot produce a
    /// cross-account duplicate at the next load.
    fn quarantined_holder(&self, domain_name: &str, rr: &str) -> Option<&str> {
        self.quarantined
            .iter()
            .find(|e| e.records.iter().any(|r| r.is(domain_name, rr)))
            .map(|e| e.username.as_str())
    }
}

/// Outcome of a removal that reached memory
///
/// `persisted` carries the store error when the removal could not be written;
/// the record is gone from memory either way.
#[derive(Debug)]
#[must_use]
pub struct Unbound {
    /// Provider record id, empty when the record never existed upstream
    pub record_id: String,
    pub persisted: Result<()>,
}

impl Ledger {
    /// Load the ledger from `path`, creating an empty store if none exists
    ///
    /// Malformed accounts are logged and excluded. A record claimed by two
    /// accounts is a fatal error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = LedgerStore::new(path);

        let (state, created) = match store.load().await? {
            Some(document) => (admit_all(document)?, false),
            None => {
                tracing::warn!(
                    "Ledger store {} not found, creating an empty one",
                    store.path().display()
                );
                (LedgerState::default(), true)
            }
        };

        if created {
            store.write(&state.document()).await?;
        }

        tracing::info!("Loaded {} accounts from ledger", state.accounts.len());
        Ok(Self {
            store,
            state: RwLock::new(state),
        })
    }

    /// Snapshot of one account
    pub async fn lookup(&self, username: &str) -> Result<Account> {
        let state = self.state.read().await;
        state
            .accounts
            .get(username)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Account '{username}' does not exist")))
    }

    /// Bind (domain, rr) to `username` with the provider's record id
    ///
    /// Re-binding a name the account already owns replaces its record id.
    pub async fn bind(
        &self,
        username: &str,
        domain_name: &str,
        rr: &str,
        record_id: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        let Some(account) = state.accounts.get(username) else {
            return Err(Error::not_found(format!(
                "Account '{username}' does not exist"
            )));
        };

        if !account.owns(domain_name, rr) {
            if account.records.len() >= account.domain_limit as usize {
                return Err(Error::QuotaExceeded {
                    username: username.to_string(),
                    limit: account.domain_limit,
                });
            }
            if let Some(owner) = state.owner_of(domain_name, rr) {
                tracing::warn!(
                    "Refusing to bind {} to '{}': already owned by '{}'",
                    fqdn(domain_name, rr),
                    username,
                    owner
                );
                return Err(Error::conflict(format!(
                    "{} is already registered by another account",
                    fqdn(domain_name, rr)
                )));
            }
            if let Some(holder) = state.quarantined_holder(domain_name, rr) {
                tracing::warn!(
                    "Refusing to bind {} to '{}': listed by quarantined account '{}'",
                    fqdn(domain_name, rr),
                    username,
                    holder
                );
                return Err(Error::conflict(format!(
                    "{} is already registered by another account",
                    fqdn(domain_name, rr)
                )));
            }
        }

        let Some(account) = state.accounts.get_mut(username) else {
            return Err(Error::internal("account vanished under write lock"));
        };
        match account.records.iter_mut().find(|r| r.is(domain_name, rr)) {
            Some(existing) => existing.record_id = record_id.to_string(),
            None => account
                .records
                .push(DomainRecord::new(domain_name, rr, record_id)),
        }

        self.persist_locked(&state, "bind").await
    }

    /// Remove (domain, rr) from `username`
    ///
    /// Fails only when the account or record is unknown. A failed write is
    /// reported through [`Unbound::persisted`] together with the removed
    /// record id, so the caller can still clean up upstream.
    pub async fn unbind(&self, username: &str, domain_name: &str, rr: &str) -> Result<Unbound> {
        let mut state = self.state.write().await;

        let account = state
            .accounts
            .get_mut(username)
            .ok_or_else(|| Error::not_found(format!("Account '{username}' does not exist")))?;

        let position = account
            .records
            .iter()
            .position(|r| r.is(domain_name, rr))
            .ok_or_else(|| {
                Error::not_found(format!(
                    "{} is not registered to this account",
                    fqdn(domain_name, rr)
                ))
            })?;
        let removed = account.records.remove(position);

        let persisted = self.persist_locked(&state, "unbind").await;
        Ok(Unbound {
            record_id: removed.record_id,
            persisted,
        })
    }

    /// Replace the account's encryption key
    pub async fn rotate_key(&self, username: &str, new_key: &str) -> Result<()> {
        let mut state = self.state.write().await;

        let account = state
            .accounts
            .get_mut(username)
            .ok_or_else(|| Error::not_found(format!("Account '{username}' does not exist")))?;
        if new_key.len() != KEY_LENGTH {
            return Err(Error::InvalidKeyLength(new_key.len()));
        }
        account.encryption_key = new_key.to_string();

        self.persist_locked(&state, "key rotation").await
    }

    /// Write the whole ledger to the store
    pub async fn persist_all(&self) -> Result<()> {
        let state = self.state.read().await;
        self.store.write(&state.document()).await
    }

    /// Number of loaded accounts
    pub async fn len(&self) -> usize {
        self.state.read().await.accounts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Account currently holding (domain, rr)
    pub async fn owner_of(&self, domain_name: &str, rr: &str) -> Option<String> {
        let state = self.state.read().await;
        state.owner_of(domain_name, rr).map(str::to_string)
    }

    /// Persist after a mutation, with the write lock still held
    ///
    /// The in-memory change stays in place when the write fails.
    async fn persist_locked(&self, state: &LedgerState, operation: &str) -> Result<()> {
        self.store.write(&state.document()).await.map_err(|e| {
            tracing::error!(
                "SEVERE: ledger {} applied in memory but not persisted to {}: {}",
                operation,
                self.store.path().display(),
                e
            );
            Error::persistence(format!("{operation}: {e}"))
        })
    }
}

/// Build the in-memory state from a loaded document
fn admit_all(document: StoreDocument) -> Result<LedgerState> {
    let mut state = LedgerState::default();
    let mut registry: HashMap<(String, String), String> = HashMap::new();

    for entry in document.users {
        if let Some(reason) = rejection_reason(&entry, &state.accounts) {
            tracing::warn!(
                "Skipping account '{}' from ledger store: {}",
                entry.username,
                reason
            );
            state.quarantined.push(entry);
            continue;
        }

        let domain_limit = normalize_limit(&entry);
        let mut records: Vec<DomainRecord> = Vec::with_capacity(entry.records.len());
        for record in entry.records {
            let key = (record.domain_name.clone(), record.rr.clone());
            match registry.get(&key) {
                Some(owner) if owner != &entry.username => {
                    return Err(Error::store(format!(
                        "{} is registered to both '{}' and '{}'",
                        record.fqdn(),
                        owner,
                        entry.username
                    )));
                }
                Some(_) => {
                    tracing::warn!(
                        "Dropping duplicate record {} of account '{}'",
                        record.fqdn(),
                        entry.username
                    );
                }
                None => {
                    registry.insert(key, entry.username.clone());
                    records.push(record);
                }
            }
        }

        if records.len() > domain_limit as usize {
            tracing::warn!(
                "Account '{}' holds {} records but its limit is {}; new binds will be refused",
                entry.username,
                records.len(),
                domain_limit
            );
        }

        state.accounts.insert(
            entry.username.clone(),
            Account {
                username: entry.username,
                secret_token: entry.secret_token,
                encryption_key: entry.encryption_key,
                domain_limit,
                records,
            },
        );
    }

    Ok(state)
}

fn rejection_reason(
    entry: &AccountEntry,
    accounts: &BTreeMap<String, Account>,
) -> Option<&'static str> {
    if entry.username.is_empty() {
        Some("missing username")
    } else if entry.secret_token.is_empty() {
        Some("missing secret_token")
    } else if entry.encryption_key.len() != KEY_LENGTH {
        Some("encryption_key must be exactly 32 bytes")
    } else if accounts.contains_key(&entry.username) {
        Some("duplicate username")
    } else {
        None
    }
}

fn normalize_limit(entry: &AccountEntry) -> u32 {
    if entry.domain_limit <= 0 {
        tracing::debug!(
            "Account '{}' has domain_limit {}; using 1",
            entry.username,
            entry.domain_limit
        );
        1
    } else {
        u32::try_from(entry.domain_limit).unwrap_or(u32::MAX)
    }
}
