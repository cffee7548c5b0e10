// # ddns-core
//
// Core library for the multi-tenant DDNS relay.
//
// ## Architecture Overview
//
// Agents on home networks keep an A record pointed at their public address
// by sending sealed requests to a shared relay, which holds the credentials
// of the upstream DNS provider:
// - **crypto**: AES-256-GCM envelope keyed per account
// - **validate**: format checks for usernames, zones, host records and IPv4
// - **ledger**: who owns which record, with quotas and global uniqueness,
//   persisted atomically after every mutation
// - **relay**: authenticates a request, reconciles with the provider and
//   binds the record, undoing orphaned provider records on refusal
// - **DnsProvider**: the upstream service, behind a trait
//
// ## Design Principles
//
// 1. **Ledger first**: the ledger is the authority on ownership; provider
//    state may briefly run ahead of or behind it
// 2. **One failure for all auth reasons**: unknown user, wrong token and bad
//    ciphertext are indistinguishable to the caller
// 3. **No retries**: failures propagate immediately; the agent retries on its
//    next tick
// 4. **Library-First**: the HTTP daemon is a thin layer over [`Relay`]

pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod protocol;
pub mod relay;
pub mod traits;
pub mod validate;

// Re-export core types for convenience
pub use config::RelayConfig;
pub use crypto::Cipher;
pub use error::{AuthChannel, Error, Result};
pub use ledger::{Account, DomainRecord, Ledger};
pub use protocol::{Ack, Envelope, KeyView};
pub use relay::{Relay, UpdateOutcome, UpdateReceipt};
pub use traits::{DnsProvider, ProviderRecord, Reconciled};
