//! Outbox relay binary entry point.
//!
//! Usage: outbox-relay --config <path> [--leader-id <token>] [--init-schema]
//!
//! Without an election client the process acts as a standing leader with
//! the configured (or a freshly generated) token.

use anyhow::Context;
use clap::Parser;
use outbox_relay::{
    HttpPublisher, LogPublisher, Publisher, Relay, Settings, StaticLeader,
};
use outbox_store::{LeaderId, OutboxStore, SqliteBinding};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Outbox relay: drains a transactional outbox downstream.
#[derive(Parser, Debug)]
#[command(name = "outbox-relay")]
#[command(about = "Relays transactional outbox records to a downstream publisher")]
struct Args {
    /// Path to the JSON settings file.
    #[arg(long, env = "OUTBOX_CONFIG")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    /// Overrides the settings file.
    #[arg(long)]
    log_level: Option<String>,

    /// Leader token. Overrides the settings file.
    #[arg(long)]
    leader_id: Option<String>,

    /// Create the outbox table if it does not exist.
    #[arg(long)]
    init_schema: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(&args.config)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        settings.log_level = level;
    }

    observability::init_with_config(observability::LogConfig {
        service_name: "outbox-relay".into(),
        default_level: settings.log_level.clone(),
        log_path: settings.log_path.clone(),
        also_stderr: true,
    })
    .context("initializing logging")?;

    let leader = match args.leader_id.or_else(|| settings.leader_id.clone().map(String::from)) {
        Some(token) => LeaderId::new(token).context("invalid leader id")?,
        None => LeaderId::generate(),
    };

    info!(
        database = %settings.database_path.display(),
        table = %settings.table,
        leader = %leader,
        eligibility = ?settings.claim_eligibility,
        "Configuration loaded"
    );

    let binding = SqliteBinding::open(
        &settings.database_path,
        settings.binding_config(args.init_schema),
    )
    .context("opening outbox binding")?;
    let store: Arc<dyn OutboxStore> = Arc::new(binding);

    let publisher: Arc<dyn Publisher> = match settings.publisher.clone() {
        Some(config) => {
            info!(endpoint = %config.endpoint, "Publishing over HTTP");
            Arc::new(HttpPublisher::new(config).context("building HTTP publisher")?)
        }
        None => {
            warn!("No publisher configured, records are logged and removed");
            Arc::new(LogPublisher)
        }
    };

    let relay = Relay::new(
        Arc::clone(&store),
        publisher,
        Arc::new(StaticLeader::new(leader)),
        settings.relay.clone(),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => {
                warn!(error = %e, "Cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
        let _ = shutdown_tx.send(true);
    });

    relay.run(shutdown_rx).await;

    store.dispose();
    let stats = serde_json::to_string(&relay.stats().snapshot())?;
    info!(stats = %stats, "Outbox relay exited");

    Ok(())
}
