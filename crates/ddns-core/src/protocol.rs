//! Wire types shared by the relay and the agent
//!
//! Every privileged write is an [`Envelope`]: a plaintext username next to a
//! sealed JSON payload. Each payload kind carries its own `secret_token`
//! field, exposed through [`SealedPayload`], so authentication never has to
//! discover the token dynamically.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::crypto;
use crate::error::Result;

/// Outer request body of every sealed endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Plaintext account name, used to pick the decryption key
    pub username: String,
    /// `base64(nonce || ciphertext || tag)` of the JSON payload
    pub data: String,
}

impl Envelope {
    /// Serialize `payload` and seal it under `key`
    pub fn seal<P: SealedPayload>(username: &str, key: &[u8], payload: &P) -> Result<Self> {
        let plaintext = serde_json::to_vec(payload)?;
        Ok(Self {
            username: username.to_string(),
            data: crypto::seal(key, &plaintext)?,
        })
    }
}

/// A payload that travels inside an [`Envelope`]
pub trait SealedPayload: Serialize + DeserializeOwned + Send {
    /// Bearer token embedded in the payload
    fn secret_token(&self) -> &str;
}

/// `POST /update-dns`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDnsPayload {
    pub secret_token: String,
    pub domain_name: String,
    pub rr: String,
    pub new_ip: String,
}

/// `DELETE /manage-records`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRecordPayload {
    pub secret_token: String,
    pub domain_name: String,
    pub rr: String,
}

/// `POST /manage-key`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotateKeyPayload {
    pub secret_token: String,
    pub new_encryption_key: String,
}

impl SealedPayload for UpdateDnsPayload {
    fn secret_token(&self) -> &str {
        &self.secret_token
    }
}

impl SealedPayload for DeleteRecordPayload {
    fn secret_token(&self) -> &str {
        &self.secret_token
    }
}

impl SealedPayload for RotateKeyPayload {
    fn secret_token(&self) -> &str {
        &self.secret_token
    }
}

impl std::fmt::Debug for UpdateDnsPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateDnsPayload")
            .field("secret_token", &"<REDACTED>")
            .field("domain_name", &self.domain_name)
            .field("rr", &self.rr)
            .field("new_ip", &self.new_ip)
            .finish()
    }
}

impl std::fmt::Debug for DeleteRecordPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteRecordPayload")
            .field("secret_token", &"<REDACTED>")
            .field("domain_name", &self.domain_name)
            .field("rr", &self.rr)
            .finish()
    }
}

impl std::fmt::Debug for RotateKeyPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotateKeyPayload")
            .field("secret_token", &"<REDACTED>")
            .field("new_encryption_key", &"<REDACTED>")
            .finish()
    }
}

/// Status discriminator of an [`Ack`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// Response body of every write endpoint and of every failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: AckStatus,
    pub message: String,
}

impl Ack {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            message: message.into(),
        }
    }
}

/// `GET /manage-key` response
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyView {
    pub encryption_key: String,
}

impl std::fmt::Debug for KeyView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyView")
            .field("encryption_key", &"<REDACTED>")
            .finish()
    }
}
