mod api;

use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use wabridge_channels::{ConnectionManager, ManagerOptions, ReconnectPolicy, SessionStore};
use wabridge_core::{
    config::{self, Config},
    traits::Transport,
};

#[derive(Parser)]
#[command(
    name = "wabridge",
    version,
    about = "wabridge: send WhatsApp messages over HTTP"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP bridge (default).
    Serve,
    /// Show the resolved configuration and session state.
    Status,
    /// Remove the stored WhatsApp session so the next connect re-pairs.
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load(&cli.config)?;
    cfg.apply_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.bridge.log_level)),
        )
        .init();

    if let Some(notice) = missing_config_notice(&cli.config) {
        info!("{notice}");
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cfg).await?,
        Commands::Status => {
            let store = SessionStore::new(cfg.session_dir());
            println!("wabridge: status\n");
            println!("Config:        {}", cli.config);
            println!("API address:   {}", cfg.bind_addr());
            println!(
                "API auth:      {}",
                if cfg.api.api_key.is_empty() {
                    "disabled"
                } else {
                    "bearer token"
                }
            );
            println!("Session dir:   {}", store.path().display());
            println!(
                "Paired:        {}",
                if store.has_credentials() {
                    "yes (credentials on disk)"
                } else {
                    "no (scan a QR code after connecting)"
                }
            );
            println!(
                "Transport:     {}",
                if cfg!(feature = "whatsapp-web") {
                    "whatsapp-web"
                } else {
                    "none (built without whatsapp-web)"
                }
            );
        }
        Commands::Logout => {
            let store = SessionStore::new(cfg.session_dir());
            if store.wipe()? {
                println!("Removed session at {}", store.path().display());
            } else {
                println!("No session at {}", store.path().display());
            }
        }
    }

    Ok(())
}

/// Logged once tracing is up; `config::load` runs before the subscriber exists.
fn missing_config_notice(path: &str) -> Option<String> {
    (!Path::new(path).exists()).then(|| format!("Config file not found at {path}, using defaults"))
}

/// Start the connection manager and the API server, run until Ctrl-C.
async fn serve(cfg: Config) -> anyhow::Result<()> {
    let transport = build_transport(&cfg)?;
    let store = SessionStore::new(cfg.session_dir());
    info!(
        "wabridge starting (session: {}, transport: {})",
        store.path().display(),
        transport.name()
    );

    let manager = ConnectionManager::start(
        transport,
        store,
        ReconnectPolicy::fixed(cfg.whatsapp.reconnect_delay()),
        ManagerOptions {
            print_qr: cfg.whatsapp.print_qr,
            ..ManagerOptions::default()
        },
    );

    if cfg.whatsapp.auto_connect {
        let manager = manager.clone();
        tokio::spawn(async move {
            match manager.connect().await {
                Ok(_) => info!("WhatsApp connection initialized"),
                Err(e) => error!("failed to initialize WhatsApp connection: {e}"),
            }
        });
    } else {
        info!("auto_connect disabled, waiting for POST /connect");
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
    };

    api::serve(&cfg.api, manager, shutdown).await
}

#[cfg(feature = "whatsapp-web")]
fn build_transport(cfg: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    Ok(Arc::new(wabridge_channels::whatsapp::WhatsAppTransport::new(
        cfg.whatsapp.device_name.clone(),
    )))
}

#[cfg(not(feature = "whatsapp-web"))]
fn build_transport(_cfg: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    anyhow::bail!("wabridge was built without the `whatsapp-web` feature; no transport available")
}
