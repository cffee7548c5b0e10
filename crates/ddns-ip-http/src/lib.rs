// # HTTP Public IP Resolver
//
// Discovers the caller's public IPv4 address for the polling agent.
//
// ## Architecture
//
// Asks a list of plain-text IP echo services in order (e.g., api.ipify.org,
// ifconfig.me) and returns the first IPv4 answer. Each service gets one
// request with a short timeout; a service that fails, times out or answers
// with something other than an IPv4 literal is skipped.

use ddns_core::{Error, Result};

use std::net::Ipv4Addr;
use std::time::Duration;

/// Default echo services, tried in order
pub const DEFAULT_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",  // plain text IP
    "https://ifconfig.me/ip", // plain text IP
];

/// Per-service request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One-shot public IPv4 lookup with fallback across services
#[derive(Debug, Clone)]
pub struct PublicIpResolver {
    services: Vec<String>,
    client: reqwest::Client,
}

impl PublicIpResolver {
    /// Resolver over [`DEFAULT_IP_SERVICES`]
    pub fn new() -> Result<Self> {
        Self::with_services(DEFAULT_IP_SERVICES.iter().map(|s| s.to_string()).collect())
    }

    /// Resolver over custom services
    pub fn with_services(services: Vec<String>) -> Result<Self> {
        Self::with_timeout(services, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(services: Vec<String>, timeout: Duration) -> Result<Self> {
        if services.is_empty() {
            return Err(Error::config("At least one IP echo service is required"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { services, client })
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Current public IPv4 address
    ///
    /// Fails only when every service failed.
    pub async fn resolve(&self) -> Result<Ipv4Addr> {
        let mut failures = Vec::with_capacity(self.services.len());
        for url in &self.services {
            match self.fetch(url).await {
                Ok(ip) => {
                    tracing::debug!("Public IP {} from {}", ip, url);
                    return Ok(ip);
                }
                Err(e) => {
                    tracing::warn!("IP service {} failed: {}", url, e);
                    failures.push(format!("{url}: {e}"));
                }
            }
        }
        Err(Error::provider(
            "http",
            format!("No IP service answered: {}", failures.join("; ")),
        ))
    }

    async fn fetch(&self, url: &str) -> Result<Ipv4Addr> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::provider("http", format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::provider(
                "http",
                format!("HTTP error: {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::provider("http", format!("Failed to read response: {}", e)))?;
        parse_ipv4(&body)
    }
}

/// Parse an echo service body, which must be a bare IPv4 literal
pub fn parse_ipv4(body: &str) -> Result<Ipv4Addr> {
    let text = body.trim();
    text.parse::<Ipv4Addr>().map_err(|_| {
        let shown: String = text.chars().take(64).collect();
        Error::provider("http", format!("Expected an IPv4 address, got: '{shown}'"))
    })
}
