use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use sentinel_core::alert::AlertSink;
use sentinel_core::anomaly::model::AnomalyModel;
use sentinel_core::anomaly::AnomalyScorer;
use sentinel_core::backup_store::BackupStore;
use sentinel_core::config::EngineConfig;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use sentineld::counters::Counters;
use sentineld::dispatcher::Dispatcher;
use sentineld::orchestrator::Orchestrator;
use sentineld::reconcile;
use sentineld::status;
use sentineld::watcher::FileWatcher;

#[derive(Parser, Debug)]
#[command(author, version, about = "Self-healing ransomware detection daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon against a config file.
    Run {
        #[arg(long, default_value = "sentineld.conf")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run_command(config).await,
    }
}

async fn run_command(config_path: PathBuf) -> Result<()> {
    let cfg = EngineConfig::load(&config_path)?;
    std::fs::create_dir_all(&cfg.monitoring_dir)?;
    std::fs::create_dir_all(&cfg.backup_dir)?;
    std::fs::create_dir_all(&cfg.log_dir)?;

    let store = Arc::new(BackupStore::load_or_create(
        &cfg.monitoring_dir,
        &cfg.backup_dir,
        &cfg.log_dir,
    )?);

    let model = match &cfg.model_path {
        Some(path) if path.exists() => match AnomalyModel::load(path) {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to load anomaly model, degrading to threshold + rule ensemble");
                None
            }
        },
        _ => None,
    };
    let scorer = Arc::new(AnomalyScorer::new(model));

    if cfg.enable_external_alerts && cfg.external_alert_endpoint.is_none() {
        warn!("ENABLE_EXTERNAL_ALERTS is set but no endpoint configured; external delivery disabled");
    }
    // A concrete webhook/chat transport is out of scope for this core;
    // NullDelivery is the default and left for operators to swap in.
    let alerts = Arc::new(
        AlertSink::new(
            &cfg.log_dir,
            Duration::from_secs(cfg.alert_cooldown_secs),
            cfg.enable_console_alerts,
            cfg.log_alerts,
        )
        .with_delivery(Box::new(sentinel_core::alert::NullDelivery)),
    );

    let counters = Arc::new(Counters::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (reset_tx, reset_rx) = mpsc::unbounded_channel();

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        alerts.clone(),
        cfg.auto_recovery,
        Duration::from_secs(cfg.recovery_timeout_secs),
        reset_tx,
        counters.clone(),
    ));

    let mut dispatcher = Dispatcher::new(
        cfg.monitoring_dir.clone(),
        store.clone(),
        scorer.clone(),
        orchestrator.clone(),
        cfg.clone(),
    );
    dispatcher.scan_initial();

    let (mut file_watcher, raw_rx) = FileWatcher::new()?;
    file_watcher.watch_paths(&[cfg.monitoring_dir.clone()])?;

    let dispatcher_handle = {
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(dispatcher.run(raw_rx, reset_rx, shutdown_rx))
    };

    let reconcile_handle = if cfg.reconcile_interval_secs > 0 {
        Some(reconcile::spawn_reconcile_loop(
            store.clone(),
            Duration::from_secs(cfg.reconcile_interval_secs),
            shutdown_rx.clone(),
        ))
    } else {
        None
    };

    #[cfg(unix)]
    let status_task = {
        let socket_path = status::default_socket_path(&cfg.log_dir);
        match status::spawn_status_server(socket_path, orchestrator.clone(), counters.clone(), store.clone()) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(error = %e, "status socket unavailable");
                None
            }
        }
    };
    #[cfg(not(unix))]
    let status_task: Option<tokio::task::JoinHandle<()>> = None;

    info!("sentineld started, watching {}", cfg.monitoring_dir.display());
    signal::ctrl_c().await.map_err(|e| anyhow!("ctrl-c handler failed: {e}"))?;
    info!("sentineld stopping");

    let _ = shutdown_tx.send(true);
    // Let any in-flight debounce/restore finish before tearing down the
    // rest of the runtime, rather than dropping it mid-restore.
    orchestrator.join_restore().await;
    dispatcher_handle.abort();
    if let Some(handle) = reconcile_handle {
        handle.abort();
    }
    if let Some(task) = status_task {
        task.abort();
    }

    Ok(())
}
