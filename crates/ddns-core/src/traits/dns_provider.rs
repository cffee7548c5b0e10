// # DNS Provider Trait
//
// Interface to the upstream DNS service that actually serves the records.
//
// ## Implementations
//
// - Aliyun Alidns: `ddns-provider-aliyun` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::DnsProvider;
//
// let reconciled = provider
//     .find_or_create("example.com", "home", "1.2.3.4".parse()?)
//     .await?;
// if reconciled.current_value != "1.2.3.4" {
//     provider
//         .update_record(&reconciled.record_id, "home", "1.2.3.4".parse()?)
//         .await?;
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// An A record as the provider reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRecord {
    /// Provider-assigned record id
    pub record_id: String,
    /// Host record
    pub rr: String,
    /// Current record value
    pub value: String,
}

/// Outcome of [`DnsProvider::find_or_create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Provider-assigned record id
    pub record_id: String,
    /// Value the record holds now
    pub current_value: String,
    /// True when the record did not exist and was created by this call
    pub created: bool,
}

/// Trait for DNS provider implementations
///
/// Only A records are managed. Every method is a single upstream call
/// bounded by the provider's own timeout; implementations do not retry.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up the A record `rr` in `domain`
    async fn find_record(
        &self,
        domain: &str,
        rr: &str,
    ) -> Result<Option<ProviderRecord>, crate::Error>;

    /// Create an A record and return its id
    async fn create_record(
        &self,
        domain: &str,
        rr: &str,
        value: Ipv4Addr,
    ) -> Result<String, crate::Error>;

    /// Point an existing record at `value`
    async fn update_record(
        &self,
        record_id: &str,
        rr: &str,
        value: Ipv4Addr,
    ) -> Result<(), crate::Error>;

    /// Delete a record by id
    async fn delete_record(&self, record_id: &str) -> Result<(), crate::Error>;

    /// Find the record, creating it with `value` when absent
    ///
    /// A freshly created record reports `created: true` and a current value
    /// equal to `value`. An existing record keeps its current value.
    async fn find_or_create(
        &self,
        domain: &str,
        rr: &str,
        value: Ipv4Addr,
    ) -> Result<Reconciled, crate::Error> {
        if let Some(record) = self.find_record(domain, rr).await? {
            return Ok(Reconciled {
                record_id: record.record_id,
                current_value: record.value,
                created: false,
            });
        }

        let record_id = self.create_record(domain, rr, value).await?;
        Ok(Reconciled {
            record_id,
            current_value: value.to_string(),
            created: true,
        })
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
