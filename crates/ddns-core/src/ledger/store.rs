// # Ledger Store
//
// Durable JSON document behind the ledger.
//
// ## Crash Safety
//
// - Atomic writes: the document is written to `<path>.tmp`, synced, then
//   renamed over the store
// - Backup: the previous store is copied to `<path>.backup` before rename
// - Recovery: a store that fails to parse is restored from the backup
// - A store and backup that both fail to parse is a fatal load error; the
//   relay never starts empty over a corrupt ledger
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "users": [
//     {
//       "username": "alice",
//       "secret_token": "...",
//       "encryption_key": "<32 bytes>",
//       "domain_limit": 2,
//       "records": [
//         { "domain_name": "example.com", "rr": "home", "record_id": "1234" }
//       ]
//     }
//   ]
// }
// ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::account::{Account, DomainRecord};
use crate::Error;

/// Store format version
const STORE_VERSION: &str = "1.0";

/// Serialized account, exactly as it appears on disk
///
/// `domain_limit` is signed so that zero or negative limits in hand-edited
/// files load and get normalized instead of failing the whole document.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AccountEntry {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub secret_token: String,
    #[serde(default)]
    pub encryption_key: String,
    #[serde(default)]
    pub domain_limit: i64,
    #[serde(default)]
    pub records: Vec<DomainRecord>,
}

impl From<&Account> for AccountEntry {
    fn from(account: &Account) -> Self {
        Self {
            username: account.username.clone(),
            secret_token: account.secret_token.clone(),
            encryption_key: account.encryption_key.clone(),
            domain_limit: i64::from(account.domain_limit),
            records: account.records.clone(),
        }
    }
}

impl std::fmt::Debug for AccountEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountEntry")
            .field("username", &self.username)
            .field("domain_limit", &self.domain_limit)
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

/// Whole store document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub users: Vec<AccountEntry>,
}

fn default_version() -> String {
    STORE_VERSION.to_string()
}

impl StoreDocument {
    pub fn new(users: Vec<AccountEntry>) -> Self {
        Self {
            version: default_version(),
            users,
        }
    }
}

/// Reads and atomically rewrites the store document
#[derive(Debug, Clone)]
pub(crate) struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, recovering from the backup if the store is corrupt
    ///
    /// Returns `None` when no store exists yet.
    pub async fn load(&self) -> Result<Option<StoreDocument>, Error> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Ledger store does not exist: {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::store(format!(
                    "Failed to read ledger store {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        match parse(&content) {
            Ok(document) => Ok(Some(document)),
            Err(parse_err) => {
                tracing::warn!(
                    "Ledger store {} is corrupted: {}. Attempting recovery from backup.",
                    self.path.display(),
                    parse_err
                );
                self.recover(parse_err).await.map(Some)
            }
        }
    }

    async fn recover(&self, original: serde_json::Error) -> Result<StoreDocument, Error> {
        let backup_path = self.backup_path();
        let backup = fs::read(&backup_path).await.map_err(|e| {
            Error::store(format!(
                "Ledger store {} is corrupted ({}) and no readable backup exists: {}",
                self.path.display(),
                original,
                e
            ))
        })?;

        let document = parse(&backup).map_err(|e| {
            Error::store(format!(
                "Ledger store {} and its backup are both corrupted: {} / {}",
                self.path.display(),
                original,
                e
            ))
        })?;

        tracing::info!(
            "Recovered ledger from backup: {} accounts",
            document.users.len()
        );
        if let Err(e) = fs::copy(&backup_path, &self.path).await {
            tracing::error!("Failed to restore ledger store from backup: {}", e);
        }
        Ok(document)
    }

    /// Write the document atomically
    pub async fn write(&self, document: &StoreDocument) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(document)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path();
        {
            let mut options = fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            options.mode(0o600);

            let mut file = options.open(&temp_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
        }

        if fs::try_exists(&self.path).await.unwrap_or(false)
            && let Err(e) = fs::copy(&self.path, self.backup_path()).await
        {
            tracing::warn!("Failed to back up ledger store: {}", e);
        }

        fs::rename(&temp_path, &self.path).await?;

        tracing::trace!("Ledger store written: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        with_suffix(&self.path, ".tmp")
    }

    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, ".backup")
    }
}

fn parse(content: &[u8]) -> Result<StoreDocument, serde_json::Error> {
    // An empty file is an empty ledger
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(StoreDocument::default());
    }

    let document: StoreDocument = serde_json::from_slice(content)?;
    if document.version != STORE_VERSION {
        tracing::warn!(
            "Ledger store version mismatch: expected {}, got {}. Loading anyway.",
            STORE_VERSION,
            document.version
        );
    }
    Ok(document)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
