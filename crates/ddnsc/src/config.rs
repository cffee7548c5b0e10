//! Agent settings (`client.toml`)
//!
//! ```toml
//! [client]
//! server_url = "https://ddns.example.net:9876"
//! username = "alice"
//! secret_token = "..."
//! encryption_key = "..."        # exactly 32 bytes
//!
//! # update daemon only
//! domain_name = "example.com"
//! rr = "home"
//! check_interval_secs = 300
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ClientFile {
    client: ClientConfig,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    pub username: String,
    pub secret_token: String,
    pub encryption_key: String,

    #[serde(default)]
    pub domain_name: String,

    #[serde(default)]
    pub rr: String,

    /// Seconds between public IP checks
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Per-request timeout towards the relay
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ClientFile = toml::from_str(content).context("Invalid client settings")?;
        Ok(file.client)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Check the settings every command needs
    pub fn validate(&self) -> Result<()> {
        if self.server_url.is_empty()
            || self.username.is_empty()
            || self.secret_token.is_empty()
            || self.encryption_key.is_empty()
        {
            bail!("server_url, username, secret_token and encryption_key are required");
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            bail!("server_url must use HTTP or HTTPS scheme. Got: {}", self.server_url);
        }
        if self.encryption_key.len() != ddns_core::crypto::KEY_LENGTH {
            bail!(
                "encryption_key must be {} bytes, got {}",
                ddns_core::crypto::KEY_LENGTH,
                self.encryption_key.len()
            );
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be > 0");
        }
        Ok(())
    }

    /// Additional checks for the update daemon
    pub fn validate_for_update(&self) -> Result<()> {
        self.validate()?;
        if self.domain_name.is_empty() || self.rr.is_empty() {
            bail!("domain_name and rr are required for the update daemon");
        }
        ddns_core::validate::domain_name(&self.domain_name)?;
        ddns_core::validate::host_record(&self.rr)?;
        if self.check_interval_secs == 0 {
            bail!("check_interval_secs must be > 0");
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("secret_token", &"<REDACTED>")
            .field("encryption_key", &"<REDACTED>")
            .field("domain_name", &self.domain_name)
            .field("rr", &self.rr)
            .field("check_interval_secs", &self.check_interval_secs)
            .finish()
    }
}

/// Replace `encryption_key` in the settings file, keeping everything else
pub fn save_key(path: &Path, new_key: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut document: toml::Table = content.parse().context("Invalid client settings")?;

    let Some(client) = document.get_mut("client").and_then(|v| v.as_table_mut()) else {
        bail!("{} has no [client] section", path.display());
    };
    client.insert(
        "encryption_key".to_string(),
        toml::Value::String(new_key.to_string()),
    );

    let rendered = toml::to_string(&document).context("Failed to render client settings")?;
    write_private(path, rendered.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Write a file readable only by its owner
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

fn default_check_interval_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}
