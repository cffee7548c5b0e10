//! Relay configuration
//!
//! Settings come from an optional TOML file, then environment overrides.
//! Provider credentials are never read from the file.
//!
//! ```toml
//! [server]
//! listen_address = "0.0.0.0"
//! listen_port = 9876
//! max_body_bytes = 1048576
//! rate_limit_secs = 5
//! trust_proxy_headers = true
//! request_timeout_secs = 15
//!
//! [ledger]
//! path = "users.json"
//!
//! [provider]
//! endpoint = "alidns.cn-hangzhou.aliyuncs.com"
//! timeout_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::Error;

/// Environment variable overriding the listen port
pub const ENV_LISTEN_PORT: &str = "DDNS_LISTEN_PORT";
/// Environment variable overriding the ledger path
pub const ENV_LEDGER_PATH: &str = "DDNS_LEDGER_PATH";

/// Main relay configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub provider: ProviderConfig,
}

impl RelayConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| Error::config(format!("Invalid relay settings: {e}")))
    }

    /// Load settings from `path`
    ///
    /// A missing file yields the defaults; an unreadable or invalid one is
    /// an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Settings file {} not found, using defaults (port {})",
                    path.display(),
                    default_listen_port()
                );
                Ok(Self::default())
            }
            Err(e) => Err(Error::config(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Apply `DDNS_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), Error> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), Error> {
        if let Some(port) = lookup(ENV_LISTEN_PORT) {
            self.server.listen_port = port.trim().parse().map_err(|_| {
                Error::config(format!("{ENV_LISTEN_PORT} must be a port number, got '{port}'"))
            })?;
        }
        if let Some(path) = lookup(ENV_LEDGER_PATH).filter(|p| !p.is_empty()) {
            self.ledger.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Error> {
        self.server.validate()?;
        self.provider.validate()?;

        if self.ledger.path.as_os_str().is_empty() {
            return Err(Error::config("Ledger path cannot be empty"));
        }
        Ok(())
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: IpAddr,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Request bodies above this size are rejected before parsing
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Per-client cool-down between requests
    #[serde(default = "default_rate_limit_secs")]
    pub rate_limit_secs: u64,

    /// Derive the client address from `X-Forwarded-For` / `X-Real-IP`
    ///
    /// Only enable behind a proxy that sets these headers.
    #[serde(default = "default_trust_proxy_headers")]
    pub trust_proxy_headers: bool,

    /// Deadline for answering a request; work already started still completes
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.listen_port == 0 {
            return Err(Error::config("listen_port must be > 0"));
        }
        if self.max_body_bytes == 0 {
            return Err(Error::config("max_body_bytes must be > 0"));
        }
        if self.rate_limit_secs == 0 {
            return Err(Error::config("rate_limit_secs must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            max_body_bytes: default_max_body_bytes(),
            rate_limit_secs: default_rate_limit_secs(),
            trust_proxy_headers: default_trust_proxy_headers(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Ledger store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Upstream DNS provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API host
    #[serde(default = "default_provider_endpoint")]
    pub endpoint: String,

    /// Per-call timeout
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::config("Provider endpoint cannot be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("Provider timeout_secs must be > 0"));
        }
        Ok(())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_provider_endpoint(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_listen_address() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_listen_port() -> u16 {
    9876
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_rate_limit_secs() -> u64 {
    5
}

fn default_trust_proxy_headers() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("users.json")
}

fn default_provider_endpoint() -> String {
    "alidns.cn-hangzhou.aliyuncs.com".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}
