//! End-to-end tests: a wired engine driven through the foreground-event
//! channel, with scripted usage and a recording host standing in for the
//! platform.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tempfile::{tempdir, TempDir};
use tokio::time::{sleep, Duration};

use appfence::db::Database;
use appfence::host::{HostActions, UsageQuery};
use appfence::models::{ForegroundEvent, UsageSnapshot};
use appfence::settings::EnforcementSettings;
use appfence::Engine;

/// Usage provider whose per-package totals are set by the test.
struct ScriptedUsage {
    minutes: Mutex<HashMap<String, i64>>,
}

impl ScriptedUsage {
    fn new() -> Self {
        Self {
            minutes: Mutex::new(HashMap::new()),
        }
    }

    fn set_minutes(&self, package_id: &str, minutes: i64) {
        self.minutes
            .lock()
            .unwrap()
            .insert(package_id.to_string(), minutes);
    }
}

impl UsageQuery for ScriptedUsage {
    fn today_snapshot(
        &self,
        package_id: &str,
        _start_ms: i64,
        _end_ms: i64,
    ) -> Result<UsageSnapshot> {
        let minutes = self
            .minutes
            .lock()
            .unwrap()
            .get(package_id)
            .copied()
            .unwrap_or(0);
        Ok(UsageSnapshot {
            package_id: package_id.to_string(),
            total_foreground_ms: minutes * 60_000,
            session_start_ms: Vec::new(),
        })
    }

    fn app_display_name(&self, _package_id: &str) -> Option<String> {
        None
    }
}

#[derive(Default)]
struct RecordingHost {
    calls: Mutex<Vec<String>>,
}

impl RecordingHost {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

impl HostActions for RecordingHost {
    fn navigate_home(&self) -> Result<()> {
        self.calls.lock().unwrap().push("home".into());
        Ok(())
    }

    fn show_block_surface(&self, package_id: &str, context_text: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("show:{package_id}:{context_text}"));
        Ok(())
    }

    fn hide_block_surface(&self) -> Result<()> {
        self.calls.lock().unwrap().push("hide".into());
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    engine: Engine,
    usage: Arc<ScriptedUsage>,
    host: Arc<RecordingHost>,
}

async fn harness() -> Harness {
    let dir = tempdir().unwrap();
    let db = Database::new(dir.path().join("test.sqlite3")).unwrap();

    let usage = Arc::new(ScriptedUsage::new());
    let host = Arc::new(RecordingHost::default());

    let settings = EnforcementSettings {
        intervention_cooldown_ms: 5000,
        home_action_cooldown_ms: 2000,
        // Long enough that no timer fires mid-test.
        auto_dismiss_timeout_ms: 60_000,
        self_package_id: "appfence".into(),
    };

    let engine = Engine::start(
        db,
        &settings,
        Arc::clone(&usage) as Arc<dyn UsageQuery>,
        Arc::clone(&host) as Arc<dyn HostActions>,
    )
    .unwrap();

    Harness {
        _dir: dir,
        engine,
        usage,
        host,
    }
}

async fn send_event(harness: &Harness, package_id: &str, timestamp_ms: i64) {
    harness
        .engine
        .events()
        .send(ForegroundEvent {
            package_id: package_id.to_string(),
            timestamp_ms,
        })
        .await
        .unwrap();
}

/// Give the monitor loop time to drain the channel.
async fn settle() {
    sleep(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn rapid_reopens_trigger_exactly_two_interventions() {
    let harness = harness().await;
    harness.engine.db.set_limit("games.example", 30).await.unwrap();
    harness.usage.set_minutes("games.example", 31);

    for timestamp_ms in [0, 1000, 2000, 6000] {
        send_event(&harness, "games.example", timestamp_ms).await;
    }
    settle().await;

    // t=0 fires, t=1000/2000 are inside the 5000ms cooldown, t=6000 fires.
    assert_eq!(harness.host.count("show:"), 2);
    assert_eq!(harness.host.count("home"), 2);
    assert_eq!(
        harness.engine.overlay.current_state().await.package_id(),
        Some("games.example")
    );

    harness.engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn overlay_context_line_names_limit_and_app() {
    let harness = harness().await;
    harness.engine.db.set_limit("games.example.tetris", 30).await.unwrap();
    harness.usage.set_minutes("games.example.tetris", 45);

    send_event(&harness, "games.example.tetris", 0).await;
    settle().await;

    let calls = harness.host.calls();
    assert!(calls.iter().any(|call| call
        == "show:games.example.tetris:You've reached your 30 minute limit for tetris today."));

    harness.engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn no_limit_means_no_intervention() {
    let harness = harness().await;
    harness.usage.set_minutes("notes.example", 600);

    send_event(&harness, "notes.example", 0).await;
    settle().await;

    assert!(harness.host.calls().is_empty());
    harness.engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn under_the_limit_means_no_intervention() {
    let harness = harness().await;
    harness.engine.db.set_limit("games.example", 30).await.unwrap();
    harness.usage.set_minutes("games.example", 29);

    send_event(&harness, "games.example", 0).await;
    settle().await;

    assert!(harness.host.calls().is_empty());
    harness.engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn own_package_is_never_blocked() {
    let harness = harness().await;
    harness.engine.db.set_limit("appfence", 1).await.unwrap();
    harness.usage.set_minutes("appfence", 600);

    send_event(&harness, "appfence", 0).await;
    settle().await;

    assert!(harness.host.calls().is_empty());
    harness.engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn ignored_package_is_never_blocked() {
    let harness = harness().await;
    harness.engine.db.set_limit("launcher.example", 1).await.unwrap();
    harness.engine.db.add_ignored("launcher.example").await.unwrap();
    harness.usage.set_minutes("launcher.example", 600);

    send_event(&harness, "launcher.example", 0).await;
    settle().await;

    assert!(harness.host.calls().is_empty());
    harness.engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn distinct_packages_intervene_independently() {
    let harness = harness().await;
    harness.engine.db.set_limit("games.example", 30).await.unwrap();
    harness.engine.db.set_limit("video.example", 10).await.unwrap();
    harness.usage.set_minutes("games.example", 31);
    harness.usage.set_minutes("video.example", 11);

    send_event(&harness, "games.example", 0).await;
    send_event(&harness, "video.example", 1000).await;
    settle().await;

    // Both packages get an overlay; the home action is debounced globally,
    // so only the first event navigates.
    assert_eq!(harness.host.count("show:"), 2);
    assert_eq!(harness.host.count("home"), 1);
    assert_eq!(
        harness.engine.overlay.current_state().await.package_id(),
        Some("video.example")
    );

    harness.engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_tears_down_a_visible_overlay() {
    let harness = harness().await;
    harness.engine.db.set_limit("games.example", 30).await.unwrap();
    harness.usage.set_minutes("games.example", 31);

    send_event(&harness, "games.example", 0).await;
    settle().await;
    assert_eq!(harness.host.count("show:"), 1);

    let host = Arc::clone(&harness.host);
    harness.engine.shutdown().await.unwrap();
    assert_eq!(host.count("hide"), 1);
}
