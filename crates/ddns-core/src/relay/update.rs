//! `update-dns`: reconcile a record with the provider, then bind it
//!
//! Stages, each of which may end the request:
//!
//! ```text
//! Received -> Authenticated -> Validated -> Reconciled -> Bound -> Applied -> Responded
//! ```
//!
//! The provider record is reconciled before the ledger is touched, so a bind
//! that the ledger refuses can leave a freshly created record behind. That
//! record is removed again by [`Relay::compensate_orphan`]. A record that
//! already existed upstream is never deleted on refusal.

use std::net::Ipv4Addr;

use super::Relay;
use crate::error::{Error, Result};
use crate::ledger::fqdn;
use crate::protocol::UpdateDnsPayload;
use crate::traits::Reconciled;
use crate::validate;

/// What the update did to the provider record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record did not exist and was created with the requested value
    Created,
    /// The record already held the requested value
    Unchanged,
    /// The record was pointed from `previous` to the requested value
    Updated { previous: String },
}

/// Acknowledgement of a successful update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReceipt {
    pub fqdn: String,
    pub value: Ipv4Addr,
    pub outcome: UpdateOutcome,
}

impl UpdateReceipt {
    /// Client-facing message
    pub fn message(&self) -> String {
        match &self.outcome {
            UpdateOutcome::Created => format!("{} created with {}", self.fqdn, self.value),
            UpdateOutcome::Unchanged => {
                format!("{} already points to {}, no change", self.fqdn, self.value)
            }
            UpdateOutcome::Updated { .. } => format!("{} updated to {}", self.fqdn, self.value),
        }
    }
}

impl Relay {
    /// Handle a sealed `update-dns` request body
    pub async fn update_dns(&self, body: &[u8]) -> Result<UpdateReceipt> {
        let auth = self.authenticate::<UpdateDnsPayload>(body).await?;
        let username = auth.account.username;
        let request = auth.payload;

        validate::domain_name(&request.domain_name)?;
        validate::host_record(&request.rr)?;
        let value = validate::ipv4(&request.new_ip)?;

        let name = fqdn(&request.domain_name, &request.rr);
        let reconciled = self
            .provider
            .find_or_create(&request.domain_name, &request.rr, value)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    "Provider lookup/creation of {} for '{}' failed: {}",
                    name,
                    username,
                    e
                );
            })?;

        if let Err(e) = self
            .ledger
            .bind(&username, &request.domain_name, &request.rr, &reconciled.record_id)
            .await
        {
            return Err(self.refuse_bind(&username, &name, &reconciled, e).await);
        }

        let outcome = if reconciled.created {
            UpdateOutcome::Created
        } else if reconciled.current_value.parse::<Ipv4Addr>().ok() == Some(value) {
            UpdateOutcome::Unchanged
        } else {
            self.provider
                .update_record(&reconciled.record_id, &request.rr, value)
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        "Provider update of {} for '{}' failed, binding kept: {}",
                        name,
                        username,
                        e
                    );
                })?;
            UpdateOutcome::Updated {
                previous: reconciled.current_value.clone(),
            }
        };

        let receipt = UpdateReceipt {
            fqdn: name,
            value,
            outcome,
        };
        tracing::info!("'{}': {}", username, receipt.message());
        Ok(receipt)
    }

    /// Handle a ledger refusal after reconciliation
    ///
    /// Quota and ownership refusals undo a record created by this request.
    /// A persistence failure means the binding is already in memory, so
    /// nothing is undone.
    async fn refuse_bind(
        &self,
        username: &str,
        name: &str,
        reconciled: &Reconciled,
        error: Error,
    ) -> Error {
        match &error {
            Error::QuotaExceeded { .. } | Error::Conflict(_) => {
                tracing::warn!("Bind of {} for '{}' refused: {}", name, username, error);
                if reconciled.created {
                    self.compensate_orphan(name, &reconciled.record_id).await;
                }
            }
            _ => {
                tracing::error!("Bind of {} for '{}' failed: {}", name, username, error);
            }
        }
        error
    }

    /// Best-effort delete of a record nobody owns
    ///
    /// Returns whether the delete succeeded. Failure never changes the
    /// response sent to the client.
    pub(crate) async fn compensate_orphan(&self, name: &str, record_id: &str) -> bool {
        tracing::info!("Deleting orphaned record {} ({})", name, record_id);
        match self.provider.delete_record(record_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    "SEVERE: compensating delete of orphaned record {} ({}) failed, \
                     provider record is left unowned: {}",
                    name,
                    record_id,
                    e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(outcome: UpdateOutcome) -> UpdateReceipt {
        UpdateReceipt {
            fqdn: "home.example.com".to_string(),
            value: Ipv4Addr::new(1, 2, 3, 4),
            outcome,
        }
    }

    #[test]
    fn messages_name_record_and_value() {
        for outcome in [
            UpdateOutcome::Created,
            UpdateOutcome::Unchanged,
            UpdateOutcome::Updated {
                previous: "5.6.7.8".to_string(),
            },
        ] {
            let message = receipt(outcome).message();
            assert!(message.contains("home.example.com"));
            assert!(message.contains("1.2.3.4"));
        }
        assert!(receipt(UpdateOutcome::Unchanged).message().contains("no change"));
    }
}
