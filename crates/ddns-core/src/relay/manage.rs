//! Record listing, record deletion and key management

use super::Relay;
use crate::error::Result;
use crate::ledger::{DomainRecord, Unbound, fqdn};
use crate::protocol::{DeleteRecordPayload, KeyView, RotateKeyPayload};
use crate::validate;

impl Relay {
    /// Records owned by `username` (bearer-authenticated)
    pub async fn list_records(
        &self,
        username: &str,
        authorization: Option<&str>,
    ) -> Result<Vec<DomainRecord>> {
        let account = self.authenticate_bearer(username, authorization).await?;
        Ok(account.records)
    }

    /// Current encryption key of `username` (bearer-authenticated)
    pub async fn view_key(&self, username: &str, authorization: Option<&str>) -> Result<KeyView> {
        let account = self.authenticate_bearer(username, authorization).await?;
        tracing::info!("'{}' viewed their encryption key", username);
        Ok(KeyView {
            encryption_key: account.encryption_key,
        })
    }

    /// Handle a sealed record deletion
    ///
    /// The ledger is authoritative: once the record is unbound the request
    /// succeeds, even if the provider delete that follows fails. A record
    /// removed from memory but not persisted is still deleted upstream before
    /// the persistence failure is returned.
    pub async fn delete_record(&self, body: &[u8]) -> Result<String> {
        let auth = self.authenticate::<DeleteRecordPayload>(body).await?;
        let username = auth.account.username;
        let request = auth.payload;

        validate::domain_name(&request.domain_name)?;
        validate::host_record(&request.rr)?;

        let name = fqdn(&request.domain_name, &request.rr);
        let Unbound {
            record_id,
            persisted,
        } = self
            .ledger
            .unbind(&username, &request.domain_name, &request.rr)
            .await?;

        if record_id.is_empty() {
            tracing::warn!("{} had no provider record id, skipping provider delete", name);
        } else if let Err(e) = self.provider.delete_record(&record_id).await {
            tracing::error!(
                "SEVERE: {} unbound from '{}' but provider delete of {} failed: {}",
                name,
                username,
                record_id,
                e
            );
        }

        if let Err(e) = persisted {
            tracing::error!(
                "SEVERE: {} (provider record {:?}) released by '{}' in memory only: {}",
                name,
                record_id,
                username,
                e
            );
            return Err(e);
        }

        tracing::info!("'{}' released {}", username, name);
        Ok(format!("{name} has been removed"))
    }

    /// Handle a sealed key rotation
    ///
    /// The request is sealed with the current key; the new key applies to
    /// every request after it.
    pub async fn rotate_key(&self, body: &[u8]) -> Result<String> {
        let auth = self.authenticate::<RotateKeyPayload>(body).await?;
        let username = auth.account.username;

        self.ledger
            .rotate_key(&username, &auth.payload.new_encryption_key)
            .await?;

        tracing::info!("'{}' rotated their encryption key", username);
        Ok("Encryption key updated; use the new key for all further requests".to_string())
    }
}
