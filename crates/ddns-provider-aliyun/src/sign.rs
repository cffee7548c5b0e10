//! ACS3-HMAC-SHA256 request signing
//!
//! RPC style: all parameters travel in the query string and the body is
//! empty. See the Alibaba Cloud "V3 request structure and signature" guide.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use ddns_core::{Error, Result};

/// SHA-256 of an empty body
pub const EMPTY_BODY_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Headers covered by the signature, in canonical order
pub const SIGNED_HEADERS: &str =
    "host;x-acs-action;x-acs-content-sha256;x-acs-date;x-acs-signature-nonce;x-acs-version";

const ALGORITHM: &str = "ACS3-HMAC-SHA256";

/// Everything that goes into one signature
#[derive(Debug, Clone, Copy)]
pub struct SigningInput<'a> {
    pub host: &'a str,
    pub action: &'a str,
    pub version: &'a str,
    pub query: &'a str,
    pub timestamp: &'a str,
    pub nonce: &'a str,
}

impl SigningInput<'_> {
    fn canonical_request(&self) -> String {
        let canonical_headers = format!(
            "host:{}\nx-acs-action:{}\nx-acs-content-sha256:{EMPTY_BODY_SHA256}\nx-acs-date:{}\nx-acs-signature-nonce:{}\nx-acs-version:{}\n",
            self.host, self.action, self.timestamp, self.nonce, self.version
        );
        format!(
            "POST\n/\n{}\n{canonical_headers}\n{SIGNED_HEADERS}\n{EMPTY_BODY_SHA256}",
            self.query
        )
    }

    fn string_to_sign(&self) -> String {
        let hashed = hex::encode(Sha256::digest(self.canonical_request().as_bytes()));
        format!("{ALGORITHM}\n{hashed}")
    }
}

/// `Authorization` header value for a request
pub fn authorization(
    access_key_id: &str,
    access_key_secret: &str,
    input: &SigningInput<'_>,
) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(access_key_secret.as_bytes())
        .map_err(|e| Error::internal(format!("HMAC key rejected: {e}")))?;
    mac.update(input.string_to_sign().as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(format!(
        "{ALGORITHM} Credential={access_key_id},SignedHeaders={SIGNED_HEADERS},Signature={signature}"
    ))
}
