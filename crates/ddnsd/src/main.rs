// # ddnsd - DDNS Relay Daemon
//
// Thin integration layer: reads settings, wires the ledger and the Aliyun
// provider into a `Relay`, and serves the HTTP surface until SIGTERM/SIGINT.
// All request semantics live in ddns-core.
//
// ## Configuration
//
// ### Settings file
// - `DDNS_CONFIG`: path of the TOML settings file (default `server.toml`;
//   a missing file means defaults)
//
// ### Overrides
// - `DDNS_LISTEN_PORT`: listen port
// - `DDNS_LEDGER_PATH`: path of the account store
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn or error (default info)
//
// ### DNS Provider
// - `ALIBABA_CLOUD_ACCESS_KEY_ID`: access key id (required)
// - `ALIBABA_CLOUD_ACCESS_KEY_SECRET`: access key secret (required)
//
// ## Example
//
// ```bash
// export ALIBABA_CLOUD_ACCESS_KEY_ID=LTAI...
// export ALIBABA_CLOUD_ACCESS_KEY_SECRET=...
// export DDNS_LEDGER_PATH=/var/lib/ddns/users.json
//
// ddnsd
// ```

mod ratelimit;
mod server;

use anyhow::{Context, Result};
use ddns_core::{Ledger, Relay, RelayConfig};
use ddns_provider_aliyun::AliyunProvider;
use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Settings file used when `DDNS_CONFIG` is unset
const DEFAULT_CONFIG_PATH: &str = "server.toml";

/// Time in-flight requests get to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Parse `DDNS_LOG_LEVEL`
fn log_level() -> Result<Level> {
    let raw = env::var("DDNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    match raw.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "DDNS_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            raw
        ),
    }
}

/// Settings file, environment overrides, validation
fn load_config() -> Result<RelayConfig> {
    let path = env::var("DDNS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = RelayConfig::load(&path)?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let log_level = match log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddnsd {}", env!("CARGO_PKG_VERSION"));

    let config = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let relay = match build_relay(&config).await {
            Ok(relay) => relay,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return DdnsExitCode::ConfigError;
            }
        };

        match serve(relay, &config).await {
            Ok(()) => DdnsExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                DdnsExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Open the ledger and the provider
///
/// Fails fast on missing credentials or an unrecoverable store.
async fn build_relay(config: &RelayConfig) -> Result<Relay> {
    let provider = AliyunProvider::from_env(
        &config.provider.endpoint,
        Duration::from_secs(config.provider.timeout_secs),
    )
    .context("DNS provider credentials")?;
    info!("Using Aliyun DNS provider at {}", config.provider.endpoint);

    let ledger = Ledger::open(&config.ledger.path)
        .await
        .with_context(|| format!("Opening ledger {}", config.ledger.path.display()))?;

    Ok(Relay::new(Arc::new(ledger), Arc::new(provider)))
}

/// Serve until a shutdown signal, then drain
async fn serve(relay: Relay, config: &RelayConfig) -> Result<()> {
    let addr = SocketAddr::new(config.server.listen_address, config.server.listen_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Binding {}", addr))?;
    info!("Listening on {}", addr);

    let app = server::router(relay.clone(), &config.server);
    let (stopping_tx, mut stopping_rx) = tokio::sync::watch::channel(false);

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let signal = wait_for_shutdown().await;
        info!("Received shutdown signal: {}", signal);
        info!("Draining in-flight requests");
        let _ = stopping_tx.send(true);
    });

    let drain_deadline = async move {
        let _ = stopping_rx.wait_for(|stopping| *stopping).await;
        tokio::time::sleep(DRAIN_TIMEOUT).await;
    };

    tokio::select! {
        result = server => result.context("HTTP server")?,
        _ = drain_deadline => {
            warn!("Shutdown timeout after {:?}, abandoning open connections", DRAIN_TIMEOUT);
        }
    }

    if let Err(e) = relay.ledger().persist_all().await {
        error!("SEVERE: final ledger flush failed: {}", e);
    }
    info!("Shutting down daemon");
    Ok(())
}

/// Wait for SIGTERM or SIGINT
///
/// Returns the name of the signal received. If the handlers cannot be
/// installed, falls back to Ctrl-C.
#[cfg(unix)]
async fn wait_for_shutdown() -> &'static str {
    let handlers = signal(SignalKind::terminate()).and_then(|term| {
        signal(SignalKind::interrupt()).map(|int| (term, int))
    });

    match handlers {
        Ok((mut sigterm, mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            }
        }
        Err(e) => {
            warn!("Failed to setup signal handlers ({}), using Ctrl-C only", e);
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT",
        Err(e) => {
            error!("Failed to wait for CTRL-C: {}", e);
            std::future::pending::<&'static str>().await
        }
    }
}
