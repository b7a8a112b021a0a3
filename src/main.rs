//! Pushline CLI - registers this host for push and processes notifications.
//!
//! This is the main binary entry point. See the `pushline` library for the
//! core functionality.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use pushline::{
    Config, FileIdentityStore, IdentityStore, PushManager, StaticPlatform, StatusEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "pushline")]
#[command(version)]
#[command(about = "Push registration, notification intake and usage reporting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register this host with the push backend
    Register {
        /// Platform push token (defaults to the stored or a generated one)
        #[arg(long)]
        token: Option<String>,
        /// Simulate the user refusing push permission
        #[arg(long)]
        deny: bool,
    },
    /// Re-submit device metadata for the registered device
    UpdateDevice,
    /// Show configuration and stored registration
    Status,
    /// Send a statistics report now
    Report,
    /// Read JSON payloads from stdin, one per line
    Listen,
    /// Forget the stored device registration
    Forget,
}

/// Build a manager from config, backed by the file identity store.
fn build_manager(config: &Config, platform: StaticPlatform) -> Result<PushManager> {
    let store = FileIdentityStore::in_config_dir()?;
    let manager = PushManager::builder()
        .platform(platform)
        .identity_store(Arc::new(store))
        .with_config(config)
        .build()?;

    let credentials = config
        .credentials()
        .context("Set app_id, api_key and base_url in config.json or PUSHLINE_* env vars")?;
    manager.configure(credentials.app_id(), credentials.api_key(), credentials.base_url())?;
    Ok(manager)
}

/// Re-register a stored identity, logging instead of failing.
async fn restore_registration(manager: &PushManager) -> bool {
    match manager.check_auto_register().await {
        Ok(restored) => restored,
        Err(e) => {
            log::warn!("Stored registration could not be restored: {e}");
            false
        }
    }
}

async fn register(config: &Config, token: Option<String>, deny: bool) -> Result<()> {
    let explicit_token = token.is_some();
    let platform = if deny {
        StaticPlatform::denied()
    } else {
        let token = match token {
            Some(token) => token,
            None => FileIdentityStore::in_config_dir()?
                .load()?
                .map_or_else(
                    || format!("pushline-{}", uuid::Uuid::new_v4().simple()),
                    |stored| stored.identity.device_token().to_string(),
                ),
        };
        StaticPlatform::granted(token)
    };

    let manager = build_manager(config, platform)?;

    if !explicit_token && !deny && manager.check_auto_register().await? {
        print_registration(&manager);
        return Ok(());
    }

    match manager.register().await {
        Ok(_) => {
            print_registration(&manager);
            Ok(())
        }
        Err(e) => {
            println!("Registration failed: {e}");
            println!("{}", e.user_message());
            Err(e.into())
        }
    }
}

fn print_registration(manager: &PushManager) {
    println!("State: {}", manager.state());
    println!("Permission: {}", manager.permission_status());
    if let Some(identity) = manager.identity() {
        println!("Device token: {}", identity.device_token());
        println!("Device id: {}", identity.device_id().unwrap_or("-"));
    }
}

async fn update_device(config: &Config) -> Result<()> {
    let manager = build_manager(config, StaticPlatform::without_token())?;
    if !manager.check_auto_register().await? {
        anyhow::bail!("This host is not registered; run `pushline register` first");
    }
    manager.update_device_info().await?;
    println!("Device info updated");
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    println!("Base URL: {}", config.base_url);
    println!(
        "App id: {}",
        if config.app_id.is_empty() { "-" } else { config.app_id.as_str() }
    );
    println!("Config dir: {}", Config::config_dir()?.display());

    match config.credentials() {
        Ok(_) => println!("State: configured"),
        Err(e) => println!("State: not configured ({e})"),
    }

    match FileIdentityStore::in_config_dir()?.load()? {
        Some(stored) => {
            let reusable = config
                .credentials()
                .is_ok_and(|credentials| stored.matches(&credentials));
            println!(
                "Stored device: {} (token {}..., saved {}){}",
                stored.identity.device_id().unwrap_or("-"),
                stored.identity.token_preview(),
                stored.saved_at.format("%Y-%m-%d %H:%M:%S UTC"),
                if reusable { "" } else { " [other app]" }
            );
        }
        None => println!("Stored device: none"),
    }
    Ok(())
}

fn forget() -> Result<()> {
    let store = FileIdentityStore::in_config_dir()?;
    match store.load()? {
        Some(stored) => println!(
            "Forgetting device {} (token {}...)",
            stored.identity.device_id().unwrap_or("-"),
            stored.identity.token_preview()
        ),
        None => println!("Stored device: none"),
    }
    store.clear()
}

async fn report(config: &Config) -> Result<()> {
    let manager = build_manager(config, StaticPlatform::without_token())?;
    restore_registration(&manager).await;

    let snapshot = manager.report_statistics().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn listen(config: &Config) -> Result<()> {
    let manager = build_manager(config, StaticPlatform::without_token())?;
    if !restore_registration(&manager).await {
        println!("Not registered; statistics will be reported anonymously");
    }

    manager.subscribe(|event| {
        if let StatusEvent::StatisticsReported(_) | StatusEvent::StatisticsDropped { .. } = event {
            eprintln!("{event}");
        }
        Ok(())
    });

    let cancel = CancellationToken::new();
    let reporting = manager.start_periodic_reporting(cancel.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let payload = match serde_json::from_str(&line) {
                    Ok(payload) => payload,
                    Err(e) => {
                        println!("invalid JSON: {e}");
                        continue;
                    }
                };
                match manager.receive(payload) {
                    Ok(delivery) if delivery.duplicate => {
                        println!("duplicate {}", delivery.record.identifier());
                    }
                    Ok(delivery) => {
                        println!(
                            "received {} {}",
                            delivery.record.identifier(),
                            delivery.record.title().unwrap_or_default()
                        );
                    }
                    Err(e) => println!("rejected: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    cancel.cancel();
    reporting.await.context("Reporting task failed")?;

    let snapshot = manager.statistics();
    println!(
        "{} received, {} duplicates, {} in history",
        snapshot.notifications_received,
        snapshot.duplicates_suppressed,
        manager.history().len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let environment = pushline::env::Environment::current();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(environment.default_log_filter()),
    )
    .format_timestamp_secs()
    .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    log::debug!("Running in {environment} environment");

    match cli.command {
        Commands::Register { token, deny } => register(&config, token, deny).await?,
        Commands::UpdateDevice => update_device(&config).await?,
        Commands::Status => status(&config)?,
        Commands::Report => report(&config).await?,
        Commands::Listen => listen(&config).await?,
        Commands::Forget => forget()?,
    }

    Ok(())
}
