//! Test doubles and common utilities for relay contract tests
//!
//! - [`MockDnsProvider`]: an in-memory zone that counts every call and can be
//!   told to fail a given operation
//! - ledger seeding in a temporary directory
//! - envelope sealing for request bodies

#![allow(dead_code)]

use ddns_core::error::{Error, Result};
use ddns_core::protocol::{
    DeleteRecordPayload, Envelope, RotateKeyPayload, SealedPayload, UpdateDnsPayload,
};
use ddns_core::traits::{DnsProvider, ProviderRecord};
use ddns_core::{Ledger, Relay};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Encryption key shared by seeded accounts
pub const KEY: &str = "0123456789abcdef0123456789abcdef";

/// Provider operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Find,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
struct ZoneRecord {
    domain: String,
    rr: String,
    value: String,
}

/// A mock DnsProvider backed by an in-memory zone
///
/// Clones share the zone, the counters and the failure set.
#[derive(Clone, Default)]
pub struct MockDnsProvider {
    zone: Arc<Mutex<HashMap<String, ZoneRecord>>>,
    next_id: Arc<AtomicUsize>,
    failing: Arc<Mutex<HashSet<Op>>>,
    find_calls: Arc<AtomicUsize>,
    create_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing record, returning its id
    pub fn with_record(&self, domain: &str, rr: &str, value: &str) -> String {
        let id = self.allocate_id();
        self.zone.lock().unwrap().insert(
            id.clone(),
            ZoneRecord {
                domain: domain.to_string(),
                rr: rr.to_string(),
                value: value.to_string(),
            },
        );
        id
    }

    /// Make every later call of `op` fail
    pub fn fail_on(&self, op: Op) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Current value of (domain, rr), if the record exists
    pub fn value_of(&self, domain: &str, rr: &str) -> Option<String> {
        self.zone
            .lock()
            .unwrap()
            .values()
            .find(|r| r.domain == domain && r.rr == rr)
            .map(|r| r.value.clone())
    }

    pub fn contains_id(&self, record_id: &str) -> bool {
        self.zone.lock().unwrap().contains_key(record_id)
    }

    pub fn record_count(&self) -> usize {
        self.zone.lock().unwrap().len()
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Total number of provider calls of any kind
    pub fn total_calls(&self) -> usize {
        self.find_calls() + self.create_calls() + self.update_calls() + self.delete_calls()
    }

    fn allocate_id(&self) -> String {
        format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check(&self, op: Op) -> Result<()> {
        if self.failing.lock().unwrap().contains(&op) {
            Err(Error::provider("mock", format!("{op:?} failed (injected)")))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn find_record(&self, domain: &str, rr: &str) -> Result<Option<ProviderRecord>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Op::Find)?;
        Ok(self
            .zone
            .lock()
            .unwrap()
            .iter()
            .find(|(_, r)| r.domain == domain && r.rr == rr)
            .map(|(id, r)| ProviderRecord {
                record_id: id.clone(),
                rr: r.rr.clone(),
                value: r.value.clone(),
            }))
    }

    async fn create_record(&self, domain: &str, rr: &str, value: Ipv4Addr) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Op::Create)?;
        Ok(self.with_record(domain, rr, &value.to_string()))
    }

    async fn update_record(&self, record_id: &str, rr: &str, value: Ipv4Addr) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Op::Update)?;
        let mut zone = self.zone.lock().unwrap();
        let record = zone
            .get_mut(record_id)
            .ok_or_else(|| Error::provider("mock", format!("no record {record_id}")))?;
        record.rr = rr.to_string();
        record.value = value.to_string();
        Ok(())
    }

    async fn delete_record(&self, record_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Op::Delete)?;
        self.zone
            .lock()
            .unwrap()
            .remove(record_id)
            .map(|_| ())
            .ok_or_else(|| Error::provider("mock", format!("no record {record_id}")))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Account JSON as it appears in the ledger store
pub fn account(username: &str, domain_limit: i64) -> serde_json::Value {
    serde_json::json!({
        "username": username,
        "secret_token": token_of(username),
        "encryption_key": KEY,
        "domain_limit": domain_limit,
        "records": [],
    })
}

/// Account JSON that already owns some records
pub fn account_owning(
    username: &str,
    domain_limit: i64,
    records: &[(&str, &str, &str)],
) -> serde_json::Value {
    let mut value = account(username, domain_limit);
    value["records"] = records
        .iter()
        .map(|(domain, rr, id)| {
            serde_json::json!({ "domain_name": domain, "rr": rr, "record_id": id })
        })
        .collect();
    value
}

/// The secret token seeded for `username`
pub fn token_of(username: &str) -> String {
    format!("tok-{username}")
}

/// Write a ledger store with `accounts` and open it
pub async fn seed_ledger(accounts: Vec<serde_json::Value>) -> (TempDir, Arc<Ledger>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    let document = serde_json::json!({ "users": accounts });
    tokio::fs::write(&path, serde_json::to_vec_pretty(&document).unwrap())
        .await
        .unwrap();
    let ledger = Ledger::open(&path).await.unwrap();
    (dir, Arc::new(ledger))
}

/// A relay over a seeded ledger and a fresh mock provider
pub async fn relay_with(
    accounts: Vec<serde_json::Value>,
) -> (TempDir, Relay, MockDnsProvider) {
    let (dir, ledger) = seed_ledger(accounts).await;
    let provider = MockDnsProvider::new();
    let relay = Relay::new(ledger, Arc::new(provider.clone()));
    (dir, relay, provider)
}

/// Serialized envelope body sealed with `key`
pub fn sealed<P: SealedPayload>(username: &str, key: &str, payload: &P) -> Vec<u8> {
    serde_json::to_vec(&Envelope::seal(username, key.as_bytes(), payload).unwrap()).unwrap()
}

/// `update-dns` body from a seeded account
pub fn update_body(username: &str, domain: &str, rr: &str, ip: &str) -> Vec<u8> {
    sealed(
        username,
        KEY,
        &UpdateDnsPayload {
            secret_token: token_of(username),
            domain_name: domain.to_string(),
            rr: rr.to_string(),
            new_ip: ip.to_string(),
        },
    )
}

/// `manage-records` delete body from a seeded account
pub fn delete_body(username: &str, domain: &str, rr: &str) -> Vec<u8> {
    sealed(
        username,
        KEY,
        &DeleteRecordPayload {
            secret_token: token_of(username),
            domain_name: domain.to_string(),
            rr: rr.to_string(),
        },
    )
}

/// `manage-key` rotation body sealed with `current_key`
pub fn rotate_body(username: &str, current_key: &str, new_key: &str) -> Vec<u8> {
    sealed(
        username,
        current_key,
        &RotateKeyPayload {
            secret_token: token_of(username),
            new_encryption_key: new_key.to_string(),
        },
    )
}

/// `Authorization` header value for a seeded account
pub fn bearer(username: &str) -> String {
    format!("Bearer {}", token_of(username))
}
