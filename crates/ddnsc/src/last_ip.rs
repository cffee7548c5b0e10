//! Last address the relay acknowledged

use anyhow::{Context, Result};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LastIpFile {
    path: PathBuf,
}

impl LastIpFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Last acknowledged address, `None` if never recorded
    ///
    /// Unparseable content counts as never recorded so the next check
    /// resends.
    pub async fn read(&self) -> Result<Option<Ipv4Addr>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let ip = content.trim().parse().ok();
                if ip.is_none() && !content.trim().is_empty() {
                    tracing::warn!("Ignoring unreadable {}", self.path.display());
                }
                Ok(ip)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        }
    }

    pub async fn write(&self, ip: Ipv4Addr) -> Result<()> {
        tokio::fs::write(&self.path, ip.to_string())
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}
