//! # pileup-viewer
//!
//! Terminal client for a Pileup queue server. Loads settings, applies
//! command-line overrides, then either follows the live queue or runs a
//! single snapshot, registration, or lookup.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pileup_core::logging::{init_json_subscriber, init_subscriber};
use pileup_settings::{PileupSettings, load_settings, load_settings_from_path};
use pileup_sync::{EngineNotice, SyncEngine, SyncState};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Pileup queue client.
#[derive(Parser, Debug)]
#[command(name = "pileup-viewer", version, about = "Pileup queue client")]
struct Cli {
    /// Settings file (defaults to `~/.pileup/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the HTTP API, including the `/api` prefix.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Push-channel URL (derived from the API URL when omitted).
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Log filter directive (`RUST_LOG` still wins).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the queue live until interrupted.
    Watch {
        /// Print each state as a JSON document instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Print one consistent snapshot as JSON and exit.
    Snapshot,
    /// Join the queue.
    Register {
        /// Station callsign.
        callsign: String,
    },
    /// Show a station's place in line.
    Lookup {
        /// Station callsign.
        callsign: String,
    },
}

impl Cli {
    fn settings(&self) -> Result<PileupSettings> {
        let mut settings = match &self.config {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => load_settings().context("Failed to load settings")?,
        };
        if let Some(url) = &self.api_url {
            settings.server.api_base_url.clone_from(url);
        }
        if let Some(url) = &self.ws_url {
            settings.server.ws_url = Some(url.clone());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;

    if settings.logging.json {
        init_json_subscriber(&settings.logging.level);
    } else {
        init_subscriber(&settings.logging.level);
    }

    let engine = SyncEngine::from_settings(&settings).context("Failed to build API client")?;
    info!(
        api = %settings.server.api_base_url,
        ws = %settings.server.resolved_ws_url(),
        "pileup client ready"
    );

    let outcome = match cli.command {
        Command::Watch { json } => watch(&engine, json).await,
        Command::Snapshot => snapshot(&engine).await,
        Command::Register { callsign } => register(&engine, &callsign).await,
        Command::Lookup { callsign } => lookup(&engine, &callsign).await,
    };
    engine.shutdown();
    outcome
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

async fn watch(engine: &SyncEngine, json: bool) -> Result<()> {
    let mut notices = engine.notices();
    let _ = engine.store().subscribe(move |state| {
        if json {
            println!("{}", state.to_json());
        } else {
            println!("{}", render(state));
        }
    });
    engine.start().context("Engine already shut down")?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for ctrl-c")?;
                info!("interrupted, shutting down");
                return Ok(());
            }
            notice = notices.recv() => match notice {
                Ok(EngineNotice::ConnectionGaveUp { attempts }) => {
                    error!(attempts, "giving up on the push channel");
                    bail!("push channel unavailable after {attempts} attempts");
                }
                Ok(EngineNotice::BootstrapFailed(err)) => warn!(error = %err, "snapshot failed"),
                Ok(EngineNotice::Disconnected { reason, attempt }) => {
                    warn!(reason = %reason, attempt, "disconnected");
                }
                Ok(EngineNotice::Connectivity(state)) => info!(?state, "connectivity"),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn snapshot(engine: &SyncEngine) -> Result<()> {
    let _ = engine.bootstrap().await?;
    let state = engine.store().snapshot();
    println!("{}", serde_json::to_string_pretty(&state.to_json())?);
    Ok(())
}

async fn register(engine: &SyncEngine, callsign: &str) -> Result<()> {
    let entry = engine.register_identifier(callsign).await?;
    println!("{} registered at position {}", entry.identifier, entry.position);
    Ok(())
}

async fn lookup(engine: &SyncEngine, callsign: &str) -> Result<()> {
    match engine.lookup_identifier(callsign).await? {
        Some(entry) => println!("{} is number {} in line", entry.identifier, entry.position),
        None => println!("{} is not in the queue", callsign.trim().to_uppercase()),
    }
    Ok(())
}

/// Plain-text table of the mirrored state.
fn render(state: &SyncState) -> String {
    let mut lines = vec![format!(
        "system {} | {} waiting",
        if state.status.active { "ACTIVE" } else { "INACTIVE" },
        state.queue.len()
    )];
    match &state.session {
        Some(session) => lines.push(format!(
            "working {} since {}",
            session.identifier,
            session.started_at.format("%H:%M:%SZ")
        )),
        None => lines.push("working nobody".to_string()),
    }
    lines.extend(state.queue.iter().map(|entry| {
        format!(
            "{:>3}. {:<10} {}",
            entry.position,
            entry.identifier,
            entry.enqueued_at.format("%H:%M:%SZ")
        )
    }));
    lines.join("\n")
}
