//! Relay API client
//!
//! Writes are sealed with the account key; reads carry the bearer token.
//! Any non-2xx answer becomes an error carrying the relay's message.

use anyhow::{Context, Result, anyhow};
use ddns_core::protocol::SealedPayload;
use ddns_core::{Ack, DomainRecord, Envelope, KeyView};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::ClientConfig;

pub struct RelayClient {
    base_url: String,
    username: String,
    secret_token: String,
    encryption_key: String,
    http: reqwest::Client,
}

impl RelayClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            secret_token: config.secret_token.clone(),
            encryption_key: config.encryption_key.clone(),
            http,
        })
    }

    pub fn secret_token(&self) -> &str {
        &self.secret_token
    }

    /// Seal `payload` and send it to `path`
    pub async fn send_sealed<P: SealedPayload>(
        &self,
        method: Method,
        path: &str,
        payload: &P,
    ) -> Result<Ack> {
        let envelope = Envelope::seal(&self.username, self.encryption_key.as_bytes(), payload)
            .context("Failed to seal request")?;
        let response = self
            .http
            .request(method, self.url(path))
            .json(&envelope)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", path))?;
        read_json(response).await
    }

    /// `GET /manage-records`
    pub async fn list_records(&self) -> Result<Vec<DomainRecord>> {
        self.get_view("/manage-records").await
    }

    /// `GET /manage-key`
    pub async fn view_key(&self) -> Result<KeyView> {
        self.get_view("/manage-key").await
    }

    async fn get_view<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .query(&[("username", self.username.as_str())])
            .bearer_auth(&self.secret_token)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", path))?;
        read_json(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await.context("Failed to read response")?;

    if !status.is_success() {
        return Err(anyhow!("Relay returned {}: {}", status, error_message(status, &body)));
    }
    serde_json::from_slice(&body).context("Unexpected response from relay")
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    match serde_json::from_slice::<Ack>(body) {
        Ok(ack) => ack.message,
        Err(_) if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string(),
        Err(_) => String::from_utf8_lossy(body).chars().take(200).collect(),
    }
}
