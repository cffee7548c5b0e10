//! Update orchestrator
//!
//! [`Relay`] drives one privileged request end to end: authenticate the
//! caller, validate the decrypted fields, reconcile with the DNS provider and
//! mutate the ledger. It owns handles to both collaborators and is shared by
//! every request handler.
//!
//! ## Authentication
//!
//! Sealed requests go through [`Relay::authenticate`]:
//!
//! 1. parse the outer [`Envelope`] (`BadRequest` on failure, before any
//!    account state is touched)
//! 2. validate the username format (`BadRequest`)
//! 3. look the account up
//! 4. open the sealed payload with the account key
//! 5. parse the payload into the expected shape
//! 6. compare the embedded token with the account token in constant time
//!
//! Steps 3 to 6 all fail with the same [`Error::AuthenticationFailed`]; the
//! concrete reason is only logged.
//!
//! Read-only views authenticate with a bearer header instead, see
//! [`Relay::authenticate_bearer`].

mod manage;
mod update;

use std::sync::Arc;

pub use update::{UpdateOutcome, UpdateReceipt};

use crate::crypto;
use crate::error::{AuthChannel, Error, Result};
use crate::ledger::{Account, Ledger};
use crate::protocol::{Envelope, SealedPayload};
use crate::traits::DnsProvider;
use crate::validate;

/// An authenticated account together with its decrypted payload
#[derive(Debug)]
pub struct Authenticated<P> {
    pub account: Account,
    pub payload: P,
}

/// Request orchestrator shared by all handlers
#[derive(Clone)]
pub struct Relay {
    ledger: Arc<Ledger>,
    provider: Arc<dyn DnsProvider>,
}

impl Relay {
    pub fn new(ledger: Arc<Ledger>, provider: Arc<dyn DnsProvider>) -> Self {
        Self { ledger, provider }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Authenticate a sealed request body
    pub async fn authenticate<P: SealedPayload>(&self, body: &[u8]) -> Result<Authenticated<P>> {
        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| Error::bad_request(format!("Malformed request body: {e}")))?;
        validate::username(&envelope.username)?;

        let reject = |reason: &str| {
            tracing::warn!(
                "Rejected sealed request for '{}': {}",
                envelope.username,
                reason
            );
            Error::AuthenticationFailed(AuthChannel::Envelope)
        };

        let account = match self.ledger.lookup(&envelope.username).await {
            Ok(account) => account,
            Err(Error::NotFound(_)) => return Err(reject("unknown user")),
            Err(e) => return Err(e),
        };

        let plaintext = crypto::open(account.key_bytes(), &envelope.data)
            .map_err(|_| reject("payload did not decrypt"))?;
        let payload: P = serde_json::from_slice(&plaintext)
            .map_err(|_| reject("decrypted payload is malformed"))?;

        if !tokens_match(payload.secret_token(), &account.secret_token) {
            return Err(reject("token mismatch"));
        }

        Ok(Authenticated { account, payload })
    }

    /// Authenticate a read-only view with `Authorization: Bearer <token>`
    pub async fn authenticate_bearer(
        &self,
        username: &str,
        authorization: Option<&str>,
    ) -> Result<Account> {
        validate::username(username)?;

        let reject = |reason: &str| {
            tracing::warn!("Rejected bearer request for '{}': {}", username, reason);
            Error::AuthenticationFailed(AuthChannel::Bearer)
        };

        let token = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| reject("missing bearer token"))?;

        let account = match self.ledger.lookup(username).await {
            Ok(account) => account,
            Err(Error::NotFound(_)) => return Err(reject("unknown user")),
            Err(e) => return Err(e),
        };

        if !tokens_match(token, &account.secret_token) {
            return Err(reject("token mismatch"));
        }
        Ok(account)
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("ledger", &self.ledger)
            .field("provider", &self.provider.provider_name())
            .finish()
    }
}

/// Constant-time token equality
///
/// Only the length is allowed to leak.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison() {
        assert!(tokens_match("tok", "tok"));
        assert!(tokens_match("", ""));
        assert!(!tokens_match("tok", "tak"));
        assert!(!tokens_match("tok", "tok2"));
        assert!(!tokens_match("", "tok"));
    }
}
