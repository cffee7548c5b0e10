//! Subcommand implementations

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use ddns_core::protocol::{DeleteRecordPayload, RotateKeyPayload, UpdateDnsPayload};
use ddns_ip_http::PublicIpResolver;
use reqwest::Method;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::api::RelayClient;
use crate::config::{self, ClientConfig};
use crate::last_ip::LastIpFile;

/// Random bytes behind a new key; base64 of 24 bytes is 32 characters
const KEY_ENTROPY_BYTES: usize = 24;

/// Poll the public address and push changes until Ctrl-C
pub async fn run_update(config: &ClientConfig, last_ip: &LastIpFile) -> Result<()> {
    let client = RelayClient::new(config)?;
    let resolver = PublicIpResolver::new()?;
    let interval = Duration::from_secs(config.check_interval_secs);

    info!(
        "Update daemon for '{}': {} every {:?} via {}",
        config.username,
        ddns_core::ledger::fqdn(&config.domain_name, &config.rr),
        interval,
        config.server_url
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = check_and_update(config, &client, &resolver, last_ip).await {
                    error!("Update check failed: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping update daemon");
                return Ok(());
            }
        }
    }
}

/// One check: resolve, compare with the last acknowledged address, push
///
/// Returns the address sent, if any. The last-known file only changes after
/// the relay accepted the update, so a failure is retried next tick.
pub async fn check_and_update(
    config: &ClientConfig,
    client: &RelayClient,
    resolver: &PublicIpResolver,
    last_ip: &LastIpFile,
) -> Result<Option<Ipv4Addr>> {
    let current = resolver.resolve().await?;
    let previous = last_ip.read().await.unwrap_or_else(|e| {
        warn!("{:#}", e);
        None
    });

    if previous == Some(current) {
        info!("Public IP {} unchanged, nothing to do", current);
        return Ok(None);
    }
    info!(
        "Public IP changed ({} -> {}), updating relay",
        previous.map_or_else(|| "none".to_string(), |ip| ip.to_string()),
        current
    );

    let payload = UpdateDnsPayload {
        secret_token: client.secret_token().to_string(),
        domain_name: config.domain_name.clone(),
        rr: config.rr.clone(),
        new_ip: current.to_string(),
    };
    let ack = client
        .send_sealed(Method::POST, "/update-dns", &payload)
        .await?;
    info!("Relay: {}", ack.message);

    if let Err(e) = last_ip.write(current).await {
        error!("SEVERE: relay updated but last IP was not recorded: {:#}", e);
    }
    Ok(Some(current))
}

/// Print the names bound to the account
pub async fn list(config: &ClientConfig) -> Result<()> {
    let records = RelayClient::new(config)?.list_records().await?;
    if records.is_empty() {
        println!("No records registered for '{}'", config.username);
        return Ok(());
    }
    for record in records {
        println!("- {}", record.fqdn());
    }
    Ok(())
}

/// Release `fqdn` from the account
pub async fn remove(config: &ClientConfig, fqdn: &str) -> Result<()> {
    let (rr, domain_name) = split_fqdn(fqdn)?;
    let client = RelayClient::new(config)?;
    let payload = DeleteRecordPayload {
        secret_token: client.secret_token().to_string(),
        domain_name: domain_name.to_string(),
        rr: rr.to_string(),
    };
    let ack = client
        .send_sealed(Method::DELETE, "/manage-records", &payload)
        .await?;
    println!("{}", ack.message);
    Ok(())
}

pub async fn key_view(config: &ClientConfig) -> Result<()> {
    let view = RelayClient::new(config)?.view_key().await?;
    println!("{}", view.encryption_key);
    Ok(())
}

/// Rotate the account key and store it in the settings file
///
/// If the relay accepted the key but the file cannot be rewritten, the key
/// is printed so it can be saved by hand.
pub async fn key_reset(config: &ClientConfig, config_path: &Path) -> Result<()> {
    let new_key = generate_key();
    let client = RelayClient::new(config)?;
    let payload = RotateKeyPayload {
        secret_token: client.secret_token().to_string(),
        new_encryption_key: new_key.clone(),
    };
    client
        .send_sealed(Method::POST, "/manage-key", &payload)
        .await
        .context("Key reset failed")?;

    if let Err(e) = config::save_key(config_path, &new_key) {
        println!("The relay now expects this key; save it as encryption_key:");
        println!("{new_key}");
        return Err(e.context("Key was reset but the settings file was not updated"));
    }
    println!("Encryption key reset and saved to {}", config_path.display());
    Ok(())
}

/// `home.example.com` -> (`home`, `example.com`)
pub fn split_fqdn(fqdn: &str) -> Result<(&str, &str)> {
    match fqdn.split_once('.') {
        Some((rr, domain)) if !rr.is_empty() && domain.contains('.') => Ok((rr, domain)),
        _ => bail!("Expected a full name such as 'home.example.com', got '{fqdn}'"),
    }
}

/// New 32-character key
pub fn generate_key() -> String {
    let mut bytes = [0u8; KEY_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
