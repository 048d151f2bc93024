mod cli;
mod error;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use thingurl_config::{Config, FileConfigStore, load_config, save_config, to_adapter_config};
use thingurl_core::model::normalize_href;
use thingurl_core::{
    Adapter, AdapterEvent, Authentication, LoadOutcome, ThingUrl, TlsVerification, UrlStore,
};

use crate::cli::{AddArgs, Cli, Command, RunArgs};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let path = cli
        .global
        .config
        .unwrap_or_else(thingurl_config::config_path);

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run_daemon(&path, args).await,
        Command::Add(args) => add_url(&path, args),
        Command::Remove { url } => remove_url(&path, &url),
        Command::List => list_urls(&path),
    }
}

fn load(path: &Path) -> Result<Config, CliError> {
    load_config(path).map_err(|e| CliError::config(path, e))
}

// ── Config commands ──────────────────────────────────────────────────

fn add_url(path: &Path, args: AddArgs) -> Result<(), CliError> {
    if !args.url.starts_with("http://") && !args.url.starts_with("https://") {
        return Err(CliError::Validation {
            field: "url".into(),
            reason: format!("expected an http(s) URL, got '{}'", args.url),
        });
    }

    let mut config = load(path)?;
    let target = normalize_href(&args.url);
    if config
        .urls
        .iter()
        .any(|u| normalize_href(&u.href) == target)
    {
        println!("{target} is already configured");
        return Ok(());
    }

    let authentication = args
        .token
        .map_or(Authentication::None, Authentication::jwt);
    config
        .urls
        .push(ThingUrl::new(target).with_authentication(authentication));
    save_config(path, &config).map_err(|e| CliError::config(path, e))?;
    println!("added {target}");
    Ok(())
}

fn remove_url(path: &Path, url: &str) -> Result<(), CliError> {
    let store = FileConfigStore::new(path);
    if store.remove_url(url)? {
        println!("removed {}", normalize_href(url));
        Ok(())
    } else {
        Err(CliError::UrlNotFound { url: url.into() })
    }
}

fn list_urls(path: &Path) -> Result<(), CliError> {
    let config = load(path)?;
    for url in &config.urls {
        println!("{}\t{}", url.href, url.authentication.method());
    }
    Ok(())
}

// ── Daemon ───────────────────────────────────────────────────────────

async fn run_daemon(path: &Path, args: RunArgs) -> Result<(), CliError> {
    let config = load(path)?;

    let mut settings = to_adapter_config(&config);
    if let Some(secs) = args.poll_interval {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "poll-interval".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        settings.poll_interval = Duration::from_secs(secs);
    }
    if args.insecure {
        settings.tls = TlsVerification::DangerAcceptInvalid;
    }

    let adapter = Adapter::new(settings, Arc::new(FileConfigStore::new(path)))?;
    let events = tokio::spawn(watch_events(adapter.clone(), adapter.subscribe()));

    info!(path = %path.display(), urls = config.urls.len(), "starting adapter");
    adapter.start().await?;

    for href in args.urls {
        match adapter.load_thing(ThingUrl::new(href.clone())).await {
            LoadOutcome::Loaded { added, unchanged } => {
                info!(href = %href, added = added.len(), unchanged = unchanged.len(), "loaded URL");
            }
            outcome => warn!(href = %href, ?outcome, "could not load URL"),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    adapter.unload().await;
    events.abort();
    Ok(())
}

/// Log every notification. Every added device is treated as saved, so it
/// starts syncing immediately.
async fn watch_events(adapter: Adapter, mut rx: broadcast::Receiver<AdapterEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "notification stream lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            AdapterEvent::DeviceAdded { id } => {
                let title = adapter
                    .device(&id)
                    .and_then(|d| d.info().title.clone())
                    .unwrap_or_default();
                info!(device = %id, title = %title, "device added");
                adapter.handle_device_saved(&id).await;
            }
            AdapterEvent::DeviceRemoved { id } => info!(device = %id, "device removed"),
            AdapterEvent::PropertyChanged { id, name, value } => {
                info!(device = %id, property = %name, value = %value, "property changed");
            }
            AdapterEvent::ActionStatus { id, action } => {
                debug!(device = %id, action = %action.name, status = ?action.status, "action status");
            }
            AdapterEvent::Event { id, event } => {
                info!(device = %id, event = %event.name, timestamp = %event.timestamp, "event");
            }
            AdapterEvent::ConnectivityChanged { id, connected } => {
                info!(device = %id, connected, "connectivity changed");
            }
        }
    }
}
