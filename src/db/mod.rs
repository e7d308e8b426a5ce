use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

mod migrations;

use crate::models::TimerLimit;
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

/// Handle to the quota store: per-package daily limits plus the ignore list.
///
/// All SQLite access runs on one dedicated worker thread; async callers
/// submit closures and await the reply over a oneshot channel.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("appfence-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Set or replace the daily limit for a package.
    pub async fn set_limit(&self, package_id: &str, limit_minutes: i64) -> Result<()> {
        if package_id.is_empty() {
            bail!("package_id is required");
        }
        if limit_minutes <= 0 {
            bail!("limit_minutes must be positive");
        }

        let package_id = package_id.to_string();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO app_timers (package_id, limit_minutes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(package_id) DO UPDATE SET
                     limit_minutes = excluded.limit_minutes,
                     updated_at = excluded.updated_at",
                params![package_id, limit_minutes, now],
            )
            .with_context(|| "failed to upsert app timer")?;
            Ok(())
        })
        .await
    }

    /// Configured limit in minutes, or `None` when no timer exists.
    ///
    /// Callers treat a stored non-positive value the same as `None`; the
    /// write path rejects such values but older stores may contain them.
    pub async fn get_limit_minutes(&self, package_id: &str) -> Result<Option<i64>> {
        let package_id = package_id.to_string();
        self.execute(move |conn| {
            let minutes = conn
                .query_row(
                    "SELECT limit_minutes FROM app_timers WHERE package_id = ?1",
                    params![package_id],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| "failed to query app timer")?;
            Ok(minutes)
        })
        .await
    }

    pub async fn remove_limit(&self, package_id: &str) -> Result<()> {
        let package_id = package_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM app_timers WHERE package_id = ?1",
                params![package_id],
            )
            .with_context(|| "failed to delete app timer")?;
            Ok(())
        })
        .await
    }

    pub async fn list_limits(&self) -> Result<Vec<TimerLimit>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT package_id, limit_minutes, created_at, updated_at
                 FROM app_timers
                 ORDER BY package_id",
            )?;

            let mut rows = stmt.query([])?;
            let mut limits = Vec::new();
            while let Some(row) = rows.next()? {
                limits.push(TimerLimit {
                    package_id: row.get(0)?,
                    limit_minutes: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?)?,
                    updated_at: parse_datetime(&row.get::<_, String>(3)?)?,
                });
            }

            Ok(limits)
        })
        .await
    }

    /// Add a package to the ignore list. Ignored packages are never
    /// evaluated against their limits.
    pub async fn add_ignored(&self, package_id: &str) -> Result<()> {
        if package_id.is_empty() {
            bail!("package_id is required");
        }

        let package_id = package_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO ignored_packages (package_id, added_at)
                 VALUES (?1, ?2)",
                params![package_id, Utc::now().to_rfc3339()],
            )
            .with_context(|| "failed to insert ignored package")?;
            Ok(())
        })
        .await
    }

    pub async fn remove_ignored(&self, package_id: &str) -> Result<()> {
        let package_id = package_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM ignored_packages WHERE package_id = ?1",
                params![package_id],
            )
            .with_context(|| "failed to delete ignored package")?;
            Ok(())
        })
        .await
    }

    pub async fn is_ignored(&self, package_id: &str) -> Result<bool> {
        let package_id = package_id.to_string();
        self.execute(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM ignored_packages WHERE package_id = ?1",
                    params![package_id],
                    |row| row.get(0),
                )
                .with_context(|| "failed to query ignored packages")?;
            Ok(count > 0)
        })
        .await
    }

    pub async fn ignored_packages(&self) -> Result<HashSet<String>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT package_id FROM ignored_packages ORDER BY package_id")?;

            let mut rows = stmt.query([])?;
            let mut packages = HashSet::new();
            while let Some(row) = rows.next()? {
                packages.insert(row.get::<_, String>(0)?);
            }

            Ok(packages)
        })
        .await
    }
}
