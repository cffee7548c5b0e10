// # ddnsc - DDNS Relay Agent
//
// Keeps one name pointed at this host's public IPv4 address and manages the
// account's records and key on the relay.
//
// ```bash
// ddnsc update              # poll forever (runs a check immediately)
// ddnsc list                # names bound to the account
// ddnsc remove home.example.com
// ddnsc key view
// ddnsc key reset           # rotate and save to client.toml
// ```
//
// `DDNS_LOG_LEVEL` selects the log level (default info).

mod api;
mod commands;
mod config;
mod last_ip;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error};
use tracing_subscriber::FmtSubscriber;

use crate::config::ClientConfig;
use crate::last_ip::LastIpFile;

/// Agent and management CLI for the DDNS relay
#[derive(Parser, Debug)]
#[command(name = "ddnsc", version, about, long_about = None)]
struct Cli {
    /// Path to the client settings file
    #[arg(short, long, default_value = "client.toml", global = true)]
    config: PathBuf,

    /// File holding the last address the relay acknowledged
    #[arg(long, default_value = "last_ip.txt", global = true)]
    last_ip_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the public IP and update the configured record
    Update,

    /// List the records bound to the account
    List,

    /// Release a record, e.g. `home.example.com`
    Remove {
        /// Fully-qualified name to release
        fqdn: String,
    },

    /// Encryption key management
    #[command(subcommand)]
    Key(KeyCommand),
}

#[derive(Subcommand, Debug)]
enum KeyCommand {
    /// Show the key the relay holds for the account
    View,

    /// Generate a new key, register it and save it locally
    Reset,
}

/// Same codes as ddnsd
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn log_level() -> Result<Level> {
    let raw = std::env::var("DDNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    raw.parse::<Level>()
        .map_err(|_| anyhow::anyhow!("DDNS_LOG_LEVEL '{}' is not valid", raw))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
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

    match rt.block_on(run(&cli, &config)) {
        Ok(()) => DdnsExitCode::Success.into(),
        Err(e) => {
            error!("{:#}", e);
            DdnsExitCode::RuntimeError.into()
        }
    }
}

fn load(cli: &Cli) -> Result<ClientConfig> {
    let config = ClientConfig::load(&cli.config)?;
    match cli.command {
        Command::Update => config.validate_for_update()?,
        _ => config.validate()?,
    }
    Ok(config)
}

async fn run(cli: &Cli, config: &ClientConfig) -> Result<()> {
    match &cli.command {
        Command::Update => commands::run_update(config, &LastIpFile::new(&cli.last_ip_file)).await,
        Command::List => commands::list(config).await,
        Command::Remove { fqdn } => commands::remove(config, fqdn).await,
        Command::Key(KeyCommand::View) => commands::key_view(config).await,
        Command::Key(KeyCommand::Reset) => commands::key_reset(config, &cli.config).await,
    }
}
