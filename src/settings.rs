use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// Cooldown and timeout knobs for the enforcement engine.
///
/// All values are milliseconds so they compose directly with host event
/// timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnforcementSettings {
    /// Minimum gap between two interventions for the same package.
    pub intervention_cooldown_ms: u64,
    /// Minimum gap between two forced home navigations, global across
    /// packages.
    pub home_action_cooldown_ms: u64,
    /// How long the blocking overlay stays up without user action.
    pub auto_dismiss_timeout_ms: u64,
    /// Our own package id; events carrying it are never evaluated.
    pub self_package_id: String,
}

impl Default for EnforcementSettings {
    fn default() -> Self {
        Self {
            intervention_cooldown_ms: 5000,
            home_action_cooldown_ms: 2000,
            auto_dismiss_timeout_ms: 3000,
            self_package_id: "appfence".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserSettings {
    enforcement: EnforcementSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            enforcement: EnforcementSettings::default(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn enforcement(&self) -> EnforcementSettings {
        self.data.read().unwrap().enforcement.clone()
    }

    pub fn update_enforcement(&self, settings: EnforcementSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            guard.enforcement = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

impl SettingsStore {
    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        let mut guard = self.data.write().unwrap();
        *guard = data;
        Ok(())
    }
}
