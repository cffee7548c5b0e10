//! Contract: listing, deletion and key rotation
//!
//! - deletion unbinds first; the ledger stays authoritative when the
//!   provider delete fails
//! - a removal that could not be persisted still deletes upstream, then
//!   reports the persistence failure
//! - a record never materialized upstream is unbound without a provider call
//! - a rotated key must be exactly 32 bytes and replaces the old one

mod common;

use common::*;
use ddns_core::{DomainRecord, Error};

#[tokio::test]
async fn list_and_view_return_account_state() {
    let (_dir, relay, _provider) = relay_with(vec![account_owning(
        "alice",
        2,
        &[("example.com", "home", "rec-9")],
    )])
    .await;

    let records = relay.list_records("alice", Some(bearer("alice").as_str())).await.unwrap();
    assert_eq!(records, vec![DomainRecord::new("example.com", "home", "rec-9")]);

    let view = relay.view_key("alice", Some(bearer("alice").as_str())).await.unwrap();
    assert_eq!(view.encryption_key, KEY);
}

#[tokio::test]
async fn delete_unbinds_and_removes_provider_record() {
    let (_dir, relay, provider) = relay_with(vec![account("alice", 1)]).await;
    relay
        .update_dns(&update_body("alice", "example.com", "home", "1.2.3.4"))
        .await
        .unwrap();

    let message = relay
        .delete_record(&delete_body("alice", "example.com", "home"))
        .await
        .unwrap();

    assert!(message.contains("home.example.com"));
    assert_eq!(provider.delete_calls(), 1);
    assert_eq!(provider.record_count(), 0);
    assert!(relay.ledger().lookup("alice").await.unwrap().records.is_empty());
}

#[tokio::test]
async fn provider_delete_failure_still_releases_the_name() {
    let (_dir, relay, provider) = relay_with(vec![account("alice", 1)]).await;
    relay
        .update_dns(&update_body("alice", "example.com", "home", "1.2.3.4"))
        .await
        .unwrap();
    provider.fail_on(Op::Delete);

    relay
        .delete_record(&delete_body("alice", "example.com", "home"))
        .await
        .unwrap();

    assert!(relay.ledger().lookup("alice").await.unwrap().records.is_empty());
    assert_eq!(provider.record_count(), 1);
}

#[tokio::test]
async fn unpersisted_delete_still_cleans_up_provider() {
    let (dir, relay, provider) = relay_with(vec![account("alice", 1)]).await;
    relay
        .update_dns(&update_body("alice", "example.com", "home", "1.2.3.4"))
        .await
        .unwrap();
    assert!(provider.contains_id("rec-1"));

    std::fs::create_dir(dir.path().join("users.json.tmp")).unwrap();

    let err = relay
        .delete_record(&delete_body("alice", "example.com", "home"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Persistence(_)));
    assert_eq!(provider.delete_calls(), 1);
    assert!(!provider.contains_id("rec-1"));
    assert!(relay.ledger().lookup("alice").await.unwrap().records.is_empty());
}

#[tokio::test]
async fn unmaterialized_record_skips_provider() {
    let (_dir, relay, provider) = relay_with(vec![account_owning(
        "alice",
        1,
        &[("example.com", "home", "")],
    )])
    .await;

    relay
        .delete_record(&delete_body("alice", "example.com", "home"))
        .await
        .unwrap();
    assert_eq!(provider.total_calls(), 0);
}

#[tokio::test]
async fn deleting_a_name_not_owned_is_not_found() {
    let (_dir, relay, provider) = relay_with(vec![
        account_owning("alice", 1, &[("example.com", "home", "rec-1")]),
        account("bob", 1),
    ])
    .await;

    let err = relay
        .delete_record(&delete_body("bob", "example.com", "home"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(provider.total_calls(), 0);
    assert!(relay.ledger().lookup("alice").await.unwrap().owns("example.com", "home"));
}

#[tokio::test]
async fn short_key_is_rejected_and_old_key_kept() {
    let (_dir, relay, _provider) = relay_with(vec![account("alice", 1)]).await;

    let err = relay
        .rotate_key(&rotate_body("alice", KEY, "0123456789abcdef"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidKeyLength(16)));
    assert!(err.is_client_error());
    assert_eq!(relay.ledger().lookup("alice").await.unwrap().encryption_key, KEY);
}

#[tokio::test]
async fn rotated_key_replaces_the_old_one() {
    let (_dir, relay, _provider) = relay_with(vec![account("alice", 1)]).await;
    let new_key = "fedcba9876543210fedcba9876543210";

    relay
        .rotate_key(&rotate_body("alice", KEY, new_key))
        .await
        .unwrap();

    // The old key no longer authenticates
    let err = relay
        .rotate_key(&rotate_body("alice", KEY, KEY))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailed(_)));

    // The new one does
    relay
        .rotate_key(&rotate_body("alice", new_key, KEY))
        .await
        .unwrap();
    assert_eq!(relay.ledger().lookup("alice").await.unwrap().encryption_key, KEY);
}
