//! skpromd — Signal K to Prometheus bridge daemon.
//!
//! Connects to a Signal K server's TCP delta stream, keeps the latest value
//! of every leaf path, and serves them for scraping.
//!
//! # Usage
//!
//! ```text
//! skpromd run --config /etc/skpromd.toml
//! skpromd run --signalk boat.local:8375 --listen 0.0.0.0:9091
//! skpromd check-config --config /etc/skpromd.toml
//! ```

mod ingest;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skprom_core::{DaemonConfig, DeltaBus, self_context_for};
use skprom_metrics::Exporter;

use crate::ingest::{Hello, HelloCallback, Ingest};

const DEFAULT_LOG_FILTER: &str = "info,skpromd=debug";

#[derive(Parser)]
#[command(name = "skpromd", about = "Signal K to Prometheus bridge", version)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bridge.
    Run {
        /// Path to skpromd.toml.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address for the scrape endpoint.
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Signal K server TCP stream (host:port).
        #[arg(long)]
        signalk: Option<String>,

        /// Vessel id of the local vessel.
        #[arg(long)]
        self_id: Option<String>,
    },
    /// Validate a config file and print the effective settings.
    CheckConfig {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            listen,
            signalk,
            self_id,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(listen) = listen {
                config.http.listen = listen;
            }
            if let Some(address) = signalk {
                config.signalk.address = address;
            }
            if self_id.is_some() {
                config.self_id = self_id;
            }
            config.validate()?;
            run(config).await
        }
        Command::CheckConfig { config } => {
            let config = load_config(Some(config.as_path()))?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DaemonConfig> {
    match path {
        Some(path) => DaemonConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(DaemonConfig::default()),
    }
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("skpromd starting");

    let bus = DeltaBus::new();
    let exporter = Arc::new(Exporter::new());
    let self_context = self_context_for(config.self_id.as_deref().unwrap_or("self"));
    exporter.start(&self_context, &config.exporter, &bus);

    let mut ingest = Ingest::new(&config.signalk, config.exporter.include_all_contexts(), bus.clone());
    if config.self_id.is_none() {
        ingest = ingest.with_hello_callback(adopt_announced_self(
            Arc::clone(&exporter),
            bus.clone(),
            config.clone(),
        ));
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingest_handle = tokio::spawn(ingest.run(shutdown_rx));

    // ── Scrape endpoint ────────────────────────────────────────

    let router = skprom_api::build_router(Arc::clone(&exporter));
    let listener = tokio::net::TcpListener::bind(config.http.listen)
        .await
        .with_context(|| format!("binding {}", config.http.listen))?;
    info!(addr = %config.http.listen, "serving /prometheus");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for ctrl-c; running until killed");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = ingest_handle.await;
    exporter.stop();

    info!("skpromd stopped");
    Ok(())
}

/// Restart the exporter under the self context the server announces.
fn adopt_announced_self(exporter: Arc<Exporter>, bus: DeltaBus, config: DaemonConfig) -> HelloCallback {
    Arc::new(move |hello: &Hello| {
        let Some(announced) = hello.self_context.as_deref() else {
            return;
        };
        let self_context = self_context_for(announced);
        if exporter.self_context().as_deref() == Some(self_context.as_str()) {
            return;
        }
        info!(%self_context, "adopting self context announced by server");
        exporter.start(&self_context, &config.exporter, &bus);
    })
}
