/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::main
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Entry point for the storesync command. Restores client
    state, runs one catalog operation against the HTTP catalog
    and prints the resulting events.

  Security / Safety Notes:
    Operates within user privileges. Performs HTTPS requests
    with the configured session token; writes only the state
    file, the log and the download directory.

  Dependencies:
    clap for CLI parsing, chrono for timestamps, tokio runtime.

  Operational Scope:
    Invoked by operators or scripts for listing, fetching and
    downloading catalog packages.

  Revision History:
    2026-09-22 COD  Authored storesync runtime.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
    - Configurable execution via CLI and config file
============================================================*/

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};

use storesync_core::client::{CatalogClient, ListQuery};
use storesync_core::config::SyncConfig;
use storesync_core::error::{OperationError, Result, SyncError};
use storesync_core::events::{CatalogEvent, EventBus};
use storesync_core::http::HttpTransport;
use storesync_core::inventory::DirectoryInventory;
use storesync_core::logger::Logger;
use storesync_core::package::{Package, UpdateHint};
use storesync_core::service::CatalogService;
use storesync_core::session::SessionFlag;
use storesync_core::store::Snapshot;

/// Command-line arguments for storesync.
#[derive(Debug, Parser)]
#[command(
    name = "storesync",
    version,
    author = "Synavera Systems",
    about = "Catalog sync and download client for Syn-Store"
)]
struct Cli {
    /// Override configuration file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
    /// Enable verbose logging to stderr.
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List one page of the catalog.
    List {
        #[arg(long, default_value_t = 0)]
        offset: u32,
        /// Page size; defaults to catalog.page_size.
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value = "")]
        search: String,
        /// Only list ids; skip detail fetches.
        #[arg(long, action = ArgAction::SetTrue)]
        no_details: bool,
    },
    /// Fetch one product, merged with its installed version.
    Fetch { id: String },
    /// Download one or more products.
    Download {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show persisted download records and update hints.
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[storesync] {}", err);
            err.exit_code()
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = SyncConfig::load_from_optional_path(cli.config.as_deref())?;

    let session_stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let log_path = cli
        .log
        .clone()
        .or_else(|| Some(config.log_dir().join(format!("storesync_{session_stamp}.log"))));
    let logger = Arc::new(Logger::new(log_path, cli.verbose)?);
    logger.info("INIT", "Syn-Store sync awakening.");

    let state_path = config.state_file();
    let snapshot = Snapshot::load(&state_path)?;

    if let Command::Status = cli.command {
        print_status(&snapshot);
        logger.finalize()?;
        return Ok(ExitCode::SUCCESS);
    }

    let session = Arc::new(SessionFlag::new(config.token().is_some()));
    if config.token().is_none() {
        logger.warn("SESSION", "No session token configured; remote operations will fail");
    }
    let inventory = Arc::new(DirectoryInventory::new(config.install_root(), Arc::clone(&logger)));

    let events = EventBus::new();
    let first_error = Arc::new(Mutex::new(None::<OperationError>));
    {
        let first_error = Arc::clone(&first_error);
        events.subscribe(move |event| {
            if let CatalogEvent::OperationError(err) = event {
                if let Ok(mut slot) = first_error.lock() {
                    slot.get_or_insert_with(|| err.clone());
                }
            }
            for line in describe(event) {
                println!("{line}");
            }
        });
    }

    let mut client = CatalogClient::new(session, inventory, events, Arc::clone(&logger));
    client.restore(snapshot);
    client.setup();

    let transport = Arc::new(HttpTransport::new(&config, Arc::clone(&logger))?);
    let mut service = CatalogService::new(client, transport, Arc::clone(&logger));

    match cli.command {
        Command::List {
            offset,
            limit,
            search,
            no_details,
        } => {
            let query = ListQuery {
                offset,
                limit: limit.unwrap_or(config.catalog.page_size).max(1),
                search_text: search,
                fetch_details: !no_details,
            };
            logger.info("LIST", format!("Listing offset={} limit={}", query.offset, query.limit));
            service.client_mut().list(query);
        }
        Command::Fetch { id } => service.client_mut().fetch(&id),
        Command::Download { ids } => {
            for id in &ids {
                service.client_mut().download(id);
            }
        }
        Command::Status => {}
    }
    service.run_until_idle().await;

    let client = service.into_client();
    client.snapshot().save(&state_path)?;
    logger.info(
        "STATE",
        format!("State written to {}", state_path.display()),
    );

    let failure = first_error.lock().ok().and_then(|mut slot| slot.take());
    logger.info("COMPLETE", "Catalog synchronised.");
    logger.finalize()?;

    match failure {
        Some(err) => Err(SyncError::Operation(err)),
        None => Ok(ExitCode::SUCCESS),
    }
}

/// Printable lines for one event; batch bracketing events print nothing.
fn describe(event: &CatalogEvent) -> Vec<String> {
    match event {
        CatalogEvent::PackagesChanged(packages) => packages
            .iter()
            .filter(|package| !package.is_placeholder())
            .map(describe_package)
            .collect(),
        CatalogEvent::DownloadProgress(progress) => {
            let mut line = format!(
                "↓ {} {:?} {}/{}",
                progress.package_id, progress.state, progress.current, progress.total
            );
            if !progress.message.is_empty() {
                line.push_str(&format!(" ({})", progress.message));
            }
            vec![line]
        }
        CatalogEvent::ProductListFetched { page, .. } => {
            vec![format!("→ Page of {} ids (catalog total {})", page.ids.len(), page.total)]
        }
        CatalogEvent::OperationError(err) => vec![format!("✗ {err}")],
        CatalogEvent::ListStart
        | CatalogEvent::ListFinish
        | CatalogEvent::ProductFetched(_)
        | CatalogEvent::FetchDetailsStart
        | CatalogEvent::FetchDetailsFinish => Vec::new(),
    }
}

fn describe_package(package: &Package) -> String {
    if let Some(err) = package.error() {
        return format!("✗ {} {err}", package.id());
    }
    let latest = package
        .fetched_version()
        .map(|version| version.version_string())
        .unwrap_or("?");
    let installed = package
        .installed_version()
        .map(|version| version.version_string())
        .unwrap_or("-");
    format!(
        "• {} {} [{:?}] latest={latest} installed={installed}",
        package.id(),
        package.metadata().display_name,
        package.state()
    )
}

fn print_status(snapshot: &Snapshot) {
    if snapshot.downloads.is_empty() {
        println!("→ No download records.");
    }
    for progress in &snapshot.downloads {
        println!(
            "↓ {} {:?} {}/{}",
            progress.package_id, progress.state, progress.current, progress.total
        );
    }
    let outdated = snapshot
        .update_hints
        .iter()
        .filter(|(_, hint)| *hint == UpdateHint::Outdated)
        .count();
    println!(
        "→ Update hints={} Outdated={} Fetched={} (saved {})",
        snapshot.update_hints.len(),
        outdated,
        snapshot.fetched_ids.len(),
        if snapshot.saved_at.is_empty() { "never" } else { snapshot.saved_at.as_str() }
    );
}
