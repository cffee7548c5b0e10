// # Aliyun DNS Provider
//
// Alidns implementation of the relay's `DnsProvider`.
//
// - One HTTP request per trait call, no retries (failures propagate to the
//   relay and the agent retries on its next tick)
// - HTTP timeout configured (30 seconds by default)
// - Specific error text for HTTP status codes (401/403, 404, 429, 5xx) and
//   for Alidns `Code` error bodies
// - A records only
//
// ## Security Requirements
//
// - The AccessKey secret NEVER appears in logs or `Debug` output
// - Credentials are read from the environment only
// - Construction fails fast if either credential is empty
//
// ## API Reference
//
// - Alidns API 2015-01-09, RPC style over HTTPS POST with ACS3-HMAC-SHA256
// - `DescribeDomainRecords`, `AddDomainRecord`, `UpdateDomainRecord`,
//   `DeleteDomainRecord`

mod sign;
mod types;

use async_trait::async_trait;
use chrono::Utc;
use ddns_core::traits::{DnsProvider, ProviderRecord};
use ddns_core::{Error, Result};
use serde::de::DeserializeOwned;
use std::net::Ipv4Addr;
use std::time::Duration;

use sign::{EMPTY_BODY_SHA256, SigningInput};
use types::{
    AckResponse, AddDomainRecordResponse, ApiError, DescribeDomainRecordsResponse,
    canonical_query,
};

/// Default API host
pub const DEFAULT_ENDPOINT: &str = "alidns.cn-hangzhou.aliyuncs.com";

/// Alidns API version
pub const API_VERSION: &str = "2015-01-09";

/// Environment variable holding the AccessKey id
pub const ENV_ACCESS_KEY_ID: &str = "ALIBABA_CLOUD_ACCESS_KEY_ID";

/// Environment variable holding the AccessKey secret
pub const ENV_ACCESS_KEY_SECRET: &str = "ALIBABA_CLOUD_ACCESS_KEY_SECRET";

/// Default HTTP timeout for API requests (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER: &str = "aliyun";

/// Largest page `DescribeDomainRecords` accepts
const PAGE_SIZE: &str = "500";

/// Aliyun Alidns provider
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the AccessKey secret.
pub struct AliyunProvider {
    access_key_id: String,

    /// ⚠️ NEVER log this value
    access_key_secret: String,

    /// API host, without scheme
    endpoint: String,

    client: reqwest::Client,
}

impl std::fmt::Debug for AliyunProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliyunProvider")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<REDACTED>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl AliyunProvider {
    /// Create a provider
    ///
    /// # Errors
    ///
    /// `Error::Config` when a credential or the endpoint is empty, or the
    /// HTTP client cannot be built.
    pub fn new(
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let access_key_id = access_key_id.into();
        let access_key_secret = access_key_secret.into();
        let endpoint = endpoint.into().trim().to_string();

        if access_key_id.trim().is_empty() {
            return Err(Error::config(format!("{ENV_ACCESS_KEY_ID} cannot be empty")));
        }
        if access_key_secret.trim().is_empty() {
            return Err(Error::config(format!(
                "{ENV_ACCESS_KEY_SECRET} cannot be empty"
            )));
        }
        if endpoint.is_empty() {
            return Err(Error::config("Aliyun endpoint cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            access_key_id,
            access_key_secret,
            endpoint,
            client,
        })
    }

    /// Create a provider from `ALIBABA_CLOUD_ACCESS_KEY_ID` and
    /// `ALIBABA_CLOUD_ACCESS_KEY_SECRET`
    pub fn from_env(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let id = std::env::var(ENV_ACCESS_KEY_ID).unwrap_or_default();
        let secret = std::env::var(ENV_ACCESS_KEY_SECRET).unwrap_or_default();
        Self::new(id, secret, endpoint, timeout)
    }

    /// Execute one signed RPC call
    async fn call<T: DeserializeOwned>(&self, action: &str, params: &[(&str, &str)]) -> Result<T> {
        let query = canonical_query(params);
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().to_string();

        let authorization = sign::authorization(
            &self.access_key_id,
            &self.access_key_secret,
            &SigningInput {
                host: &self.endpoint,
                action,
                version: API_VERSION,
                query: &query,
                timestamp: &timestamp,
                nonce: &nonce,
            },
        )?;

        let url = format!("https://{}/?{}", self.endpoint, query);
        tracing::debug!("Alidns {} ({})", action, self.endpoint);

        let response = self
            .client
            .post(&url)
            .header("Host", &self.endpoint)
            .header("x-acs-action", action)
            .header("x-acs-version", API_VERSION)
            .header("x-acs-date", &timestamp)
            .header("x-acs-signature-nonce", &nonce)
            .header("x-acs-content-sha256", EMPTY_BODY_SHA256)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| {
                Error::provider(PROVIDER, format!("{action}: HTTP request failed: {e}"))
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| {
                Error::provider(PROVIDER, format!("{action}: failed to read response: {e}"))
            })?;

        parse_response(action, status, &body)
    }
}

/// Turn a raw Alidns response into `T` or a provider error
fn parse_response<T: DeserializeOwned>(action: &str, status: u16, body: &str) -> Result<T> {
    let api_error = serde_json::from_str::<ApiError>(body).ok();

    if !(200..300).contains(&status) {
        let detail = match &api_error {
            Some(e) => format!("{} - {}", e.code, e.message),
            None => body.chars().take(200).collect(),
        };
        let message = match status {
            401 | 403 => format!(
                "Authentication failed: invalid AccessKey or insufficient permissions. Status: {status} ({detail})"
            ),
            404 => format!("Resource not found. Status: {status} ({detail})"),
            429 => format!("Rate limit exceeded. Please retry later. Status: {status} ({detail})"),
            500..=599 => format!("Aliyun server error (transient): {status} ({detail})"),
            _ => format!("Request failed: {status} ({detail})"),
        };
        tracing::error!("Alidns {} failed: {}", action, message);
        return Err(Error::provider(PROVIDER, format!("{action}: {message}")));
    }

    if let Some(e) = api_error {
        tracing::error!(
            "Alidns {} returned error {}: {} (request {})",
            action,
            e.code,
            e.message,
            e.request_id.as_deref().unwrap_or("-")
        );
        return Err(Error::provider(
            PROVIDER,
            format!("{action}: {} - {}", e.code, e.message),
        ));
    }

    serde_json::from_str(body)
        .map_err(|e| Error::provider(PROVIDER, format!("{action}: failed to parse response: {e}")))
}

#[async_trait]
impl DnsProvider for AliyunProvider {
    async fn find_record(&self, domain: &str, rr: &str) -> Result<Option<ProviderRecord>> {
        let response: DescribeDomainRecordsResponse = self
            .call(
                "DescribeDomainRecords",
                &[
                    ("DomainName", domain),
                    ("RRKeyWord", rr),
                    ("Type", "A"),
                    ("PageSize", PAGE_SIZE),
                ],
            )
            .await?;

        Ok(response.exact(rr).map(|record| ProviderRecord {
            record_id: record.record_id,
            rr: record.rr,
            value: record.value,
        }))
    }

    async fn create_record(&self, domain: &str, rr: &str, value: Ipv4Addr) -> Result<String> {
        let value = value.to_string();
        let response: AddDomainRecordResponse = self
            .call(
                "AddDomainRecord",
                &[
                    ("DomainName", domain),
                    ("RR", rr),
                    ("Type", "A"),
                    ("Value", &value),
                ],
            )
            .await?;

        tracing::info!("Created A record {}.{} -> {} ({})", rr, domain, value, response.record_id);
        Ok(response.record_id)
    }

    async fn update_record(&self, record_id: &str, rr: &str, value: Ipv4Addr) -> Result<()> {
        let value = value.to_string();
        let response: AckResponse = self
            .call(
                "UpdateDomainRecord",
                &[
                    ("RecordId", record_id),
                    ("RR", rr),
                    ("Type", "A"),
                    ("Value", &value),
                ],
            )
            .await?;

        tracing::info!(
            "Updated A record {} -> {} (request {})",
            record_id,
            value,
            response.request_id.as_deref().unwrap_or("-")
        );
        Ok(())
    }

    async fn delete_record(&self, record_id: &str) -> Result<()> {
        let _: AckResponse = self
            .call("DeleteDomainRecord", &[("RecordId", record_id)])
            .await?;
        tracing::info!("Deleted record {}", record_id);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
