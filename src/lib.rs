pub mod db;
pub mod enforcement;
pub mod host;
pub mod models;
pub mod monitor;
pub mod overlay;
pub mod settings;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::Duration;

use db::Database;
use enforcement::{CooldownConfig, InterventionCoordinator, QuotaEvaluator};
use host::sim::{
    apply_store_command, read_stdin_commands, ConsoleHostActions, FileUsageQuery, SimCommand,
};
use host::{HostActions, UsageQuery};
use models::ForegroundEvent;
use monitor::MonitorController;
use overlay::OverlayManager;
use settings::{EnforcementSettings, SettingsStore};

/// Backpressure bound on the foreground-event channel. The host can burst
/// faster than evaluation; beyond this the sender waits.
const EVENT_QUEUE_DEPTH: usize = 64;

/// A fully wired enforcement engine with its monitor loop running.
pub struct Engine {
    pub db: Database,
    pub overlay: OverlayManager,
    monitor: MonitorController,
    events_tx: mpsc::Sender<ForegroundEvent>,
}

impl Engine {
    /// Wire the engine against the given host collaborators and start the
    /// monitor loop. Must be called from within a tokio runtime.
    pub fn start(
        db: Database,
        settings: &EnforcementSettings,
        usage: Arc<dyn UsageQuery>,
        actions: Arc<dyn HostActions>,
    ) -> Result<Self> {
        let overlay = OverlayManager::new(
            Duration::from_millis(settings.auto_dismiss_timeout_ms),
            Arc::clone(&actions),
            Arc::clone(&usage),
        );

        let coordinator = Arc::new(InterventionCoordinator::new(
            CooldownConfig {
                intervention_cooldown_ms: settings.intervention_cooldown_ms as i64,
                home_action_cooldown_ms: settings.home_action_cooldown_ms as i64,
            },
            overlay.clone(),
            Arc::clone(&actions),
        ));

        let evaluator = Arc::new(QuotaEvaluator::new(db.clone(), usage));

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let mut monitor = MonitorController::new(
            evaluator,
            coordinator,
            overlay.clone(),
            settings.self_package_id.clone(),
        );
        monitor.start(events_rx)?;

        Ok(Self {
            db,
            overlay,
            monitor,
            events_tx,
        })
    }

    /// Sender half of the foreground-event channel.
    pub fn events(&self) -> mpsc::Sender<ForegroundEvent> {
        self.events_tx.clone()
    }

    /// Stop the monitor and reset all transient enforcement state.
    pub async fn shutdown(mut self) -> Result<()> {
        self.monitor.stop().await
    }
}

/// Daemon entry point: wire the engine against the simulator host and
/// drive it from stdin until `quit` or Ctrl-C.
pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("appfence starting up...");

    let data_dir = dirs::data_dir()
        .map(|dir| dir.join("appfence"))
        .context("could not resolve a data directory")?;
    std::fs::create_dir_all(&data_dir)?;

    let database = Database::new(data_dir.join("appfence.sqlite3"))?;
    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let settings = settings_store.enforcement();

    let usage: Arc<dyn UsageQuery> =
        Arc::new(FileUsageQuery::new(data_dir.join("usage.json")));
    let actions: Arc<dyn HostActions> = Arc::new(ConsoleHostActions);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let engine = Engine::start(database, &settings, usage, actions)?;
        let events = engine.events();
        let db = engine.db.clone();

        let (command_tx, mut command_rx) = mpsc::channel::<SimCommand>(16);
        std::thread::spawn(move || read_stdin_commands(command_tx));

        log::info!(
            "reading simulator input from stdin (try: limit games.example 30, then open games.example)"
        );

        loop {
            tokio::select! {
                maybe_command = command_rx.recv() => {
                    match maybe_command {
                        None | Some(SimCommand::Quit) => break,
                        Some(SimCommand::Event(event)) => {
                            if events.send(event).await.is_err() {
                                log::error!("monitor loop is gone; exiting");
                                break;
                            }
                        }
                        Some(SimCommand::Dismiss) => engine.overlay.user_dismiss().await,
                        Some(command) => {
                            if let Err(err) = apply_store_command(command, &db).await {
                                log::warn!("command failed: {err:#}");
                            }
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("interrupt received");
                    break;
                }
            }
        }

        engine.shutdown().await
    })
}
