//! Simulated host collaborators for driving the daemon from a terminal.
//!
//! In production the usage ledger and the blocking surface come from the
//! OS; here a JSON file stands in for the usage service, stdin stands in
//! for the window-focus notification channel, and the side effects are
//! just logged. The engine cannot tell the difference.
//!
//! Input lines understood by [`parse_line`]:
//! - `{"packageId":"games.example","timestampMs":1700000000000}` (raw event)
//! - `open <package>` (event stamped with the current time)
//! - `limit <package> <minutes>` / `unlimit <package>`
//! - `ignore <package>` / `unignore <package>`
//! - `dismiss` (acknowledge the overlay, like tapping OK)
//! - `quit`

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::db::Database;
use crate::host::{HostActions, UsageQuery};
use crate::models::{ForegroundEvent, UsageSnapshot};

/// Usage provider backed by a JSON ledger file, re-read on every query so
/// edits show up without restarting the daemon.
///
/// Ledger shape:
/// `{"games.example": {"totalForegroundMs": 1860000, "sessionStartMs": [...], "displayName": "Tetris"}}`
pub struct FileUsageQuery {
    ledger_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct LedgerEntry {
    total_foreground_ms: i64,
    session_start_ms: Vec<i64>,
    display_name: Option<String>,
}

impl FileUsageQuery {
    pub fn new(ledger_path: PathBuf) -> Self {
        Self { ledger_path }
    }

    fn read_entry(&self, package_id: &str) -> Result<Option<LedgerEntry>> {
        if !self.ledger_path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.ledger_path).with_context(|| {
            format!("failed to read usage ledger {}", self.ledger_path.display())
        })?;
        let ledger: std::collections::HashMap<String, LedgerEntry> =
            serde_json::from_str(&contents).with_context(|| {
                format!("invalid usage ledger {}", self.ledger_path.display())
            })?;

        Ok(ledger.get(package_id).cloned())
    }
}

impl UsageQuery for FileUsageQuery {
    fn today_snapshot(
        &self,
        package_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<UsageSnapshot> {
        let Some(entry) = self.read_entry(package_id)? else {
            return Ok(UsageSnapshot::empty(package_id));
        };

        let session_start_ms = entry
            .session_start_ms
            .into_iter()
            .filter(|ts| (start_ms..end_ms).contains(ts))
            .collect();

        Ok(UsageSnapshot {
            package_id: package_id.to_string(),
            total_foreground_ms: entry.total_foreground_ms.max(0),
            session_start_ms,
        })
    }

    fn app_display_name(&self, package_id: &str) -> Option<String> {
        self.read_entry(package_id).ok().flatten()?.display_name
    }
}

/// Host actions that only log. Stands in for the platform bridge during
/// development.
pub struct ConsoleHostActions;

impl HostActions for ConsoleHostActions {
    fn navigate_home(&self) -> Result<()> {
        log::info!("[sim] navigating to home screen");
        Ok(())
    }

    fn show_block_surface(&self, package_id: &str, context_text: &str) -> Result<()> {
        log::info!("[sim] block overlay up for {package_id}: {context_text}");
        Ok(())
    }

    fn hide_block_surface(&self) -> Result<()> {
        log::info!("[sim] block overlay down");
        Ok(())
    }
}

/// One line of simulator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCommand {
    Event(ForegroundEvent),
    SetLimit { package_id: String, limit_minutes: i64 },
    RemoveLimit { package_id: String },
    Ignore { package_id: String },
    Unignore { package_id: String },
    Dismiss,
    Quit,
}

pub fn parse_line(line: &str) -> Result<SimCommand> {
    let trimmed = line.trim();

    if trimmed.starts_with('{') {
        let event: ForegroundEvent =
            serde_json::from_str(trimmed).context("invalid foreground event JSON")?;
        return Ok(SimCommand::Event(event));
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    match (verb, rest.as_slice()) {
        ("open", [package_id]) => Ok(SimCommand::Event(ForegroundEvent {
            package_id: (*package_id).to_string(),
            timestamp_ms: Utc::now().timestamp_millis(),
        })),
        ("limit", [package_id, minutes]) => {
            let limit_minutes = minutes
                .parse()
                .map_err(|_| anyhow!("'{minutes}' is not a number of minutes"))?;
            Ok(SimCommand::SetLimit {
                package_id: (*package_id).to_string(),
                limit_minutes,
            })
        }
        ("unlimit", [package_id]) => Ok(SimCommand::RemoveLimit {
            package_id: (*package_id).to_string(),
        }),
        ("ignore", [package_id]) => Ok(SimCommand::Ignore {
            package_id: (*package_id).to_string(),
        }),
        ("unignore", [package_id]) => Ok(SimCommand::Unignore {
            package_id: (*package_id).to_string(),
        }),
        ("dismiss", []) => Ok(SimCommand::Dismiss),
        ("quit", []) => Ok(SimCommand::Quit),
        _ => bail!("unknown command '{trimmed}'"),
    }
}

/// Blocking stdin reader; run it on its own thread and let it feed the
/// async side through the channel.
pub fn read_stdin_commands(tx: mpsc::Sender<SimCommand>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::warn!("stdin read failed: {err}");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_line(&line) {
            Ok(command) => {
                let quit = command == SimCommand::Quit;
                if tx.blocking_send(command).is_err() {
                    break;
                }
                if quit {
                    break;
                }
            }
            Err(err) => log::warn!("unrecognized input: {err:#}"),
        }
    }
}

/// Apply a non-event command to the quota store.
pub async fn apply_store_command(command: SimCommand, db: &Database) -> Result<()> {
    match command {
        SimCommand::SetLimit {
            package_id,
            limit_minutes,
        } => {
            db.set_limit(&package_id, limit_minutes).await?;
            log::info!("limit for {package_id} set to {limit_minutes} minutes");
        }
        SimCommand::RemoveLimit { package_id } => {
            db.remove_limit(&package_id).await?;
            log::info!("limit for {package_id} removed");
        }
        SimCommand::Ignore { package_id } => {
            db.add_ignored(&package_id).await?;
            log::info!("{package_id} added to ignore list");
        }
        SimCommand::Unignore { package_id } => {
            db.remove_ignored(&package_id).await?;
            log::info!("{package_id} removed from ignore list");
        }
        SimCommand::Event(_) | SimCommand::Dismiss | SimCommand::Quit => {}
    }
    Ok(())
}
