//! Collaborator traits
//!
//! - [`DnsProvider`]: the upstream DNS service that stores A records

pub mod dns_provider;

pub use dns_provider::{DnsProvider, ProviderRecord, Reconciled};
