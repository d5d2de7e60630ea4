//! # Settings Persistence
//!
//! User settings restored at startup and saved at shutdown.
//!
//! Settings hold the axis serials, the dead zone radius and the last
//! known positions. They are stored as TOML next to the binary by default.
//! A missing or unreadable file restores the defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::stage::StageStatus;

/// Persisted user settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub x_axis_id: String,
    pub y_axis_id: String,
    pub dead_zone_radius: f64,

    #[serde(default)]
    pub last_position_x: f64,

    #[serde(default)]
    pub last_position_y: f64,
}

impl Settings {
    /// Settings matching the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            x_axis_id: config.stage.x_axis_id.clone(),
            y_axis_id: config.stage.y_axis_id.clone(),
            dead_zone_radius: config.gamepad.dead_zone,
            last_position_x: 0.0,
            last_position_y: 0.0,
        }
    }

    /// Overrides the axis serials and dead zone in `config`.
    pub fn apply(&self, config: &mut Config) {
        config.stage.x_axis_id = self.x_axis_id.clone();
        config.stage.y_axis_id = self.y_axis_id.clone();
        config.gamepad.dead_zone = self.dead_zone_radius;
    }

    /// Records the positions from a status snapshot.
    pub fn record_positions(&mut self, status: &StageStatus) {
        self.last_position_x = status.position_x;
        self.last_position_y = status.position_y;
    }
}

/// Storage for [`Settings`].
pub trait SettingsStore {
    /// Loads settings, falling back to defaults.
    fn restore(&self) -> Settings;

    /// Writes settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be encoded or written.
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// TOML file backed settings store.
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
    defaults: Settings,
}

impl TomlSettingsStore {
    pub fn new<P: AsRef<Path>>(path: P, defaults: Settings) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            defaults,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Settings> {
        let contents = fs::read_to_string(&self.path)?;
        let settings: Settings = toml::from_str(&contents)?;
        Ok(settings)
    }
}

impl SettingsStore for TomlSettingsStore {
    fn restore(&self) -> Settings {
        if !self.path.exists() {
            info!("No settings at {}, using defaults", self.path.display());
            return self.defaults.clone();
        }

        match self.read() {
            Ok(settings) => {
                info!("Restored settings from {}", self.path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring settings at {}: {}", self.path.display(), e);
                self.defaults.clone()
            }
        }
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let contents = toml::to_string_pretty(settings)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, contents)?;

        info!("Saved settings to {}", self.path.display());
        Ok(())
    }
}
