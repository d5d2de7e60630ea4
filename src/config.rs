//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::controller::bindings::BindingAction;
use crate::controller::buttons::EventKind;
use crate::controller::sample::ButtonId;
use crate::error::{Result, StageError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub stage: StageConfig,
    pub gamepad: GamepadConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
    pub settings: SettingsConfig,

    #[serde(default = "default_bindings")]
    pub bindings: Vec<BindingConfig>,
}

/// Stage axes configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StageConfig {
    #[serde(default = "default_x_axis_id")]
    pub x_axis_id: String,

    #[serde(default = "default_y_axis_id")]
    pub y_axis_id: String,

    #[serde(default = "default_stage_poll_period_ms")]
    pub poll_period_ms: u64,

    #[serde(default = "default_settings_timeout_ms")]
    pub settings_timeout_ms: u64,

    #[serde(default = "default_homing_timeout_ms")]
    pub homing_timeout_ms: u64,

    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    #[serde(default)]
    pub invert_x: bool,

    #[serde(default)]
    pub invert_y: bool,
}

/// Gamepad configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GamepadConfig {
    #[serde(default)]
    pub device_path: String,

    #[serde(default = "default_dead_zone")]
    pub dead_zone: f64,

    #[serde(default = "default_gamepad_poll_period_ms")]
    pub poll_period_ms: u64,

    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,
}

/// Simulated stage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimulationConfig {
    #[serde(default = "default_settings_delay_ms")]
    pub settings_delay_ms: u64,

    #[serde(default = "default_velocity")]
    pub velocity: f64,

    #[serde(default = "default_home_velocity")]
    pub home_velocity: f64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_dir: String,
}

/// User settings persistence configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    #[serde(default = "default_settings_path")]
    pub path: String,
}

/// One entry of the button dispatch table
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BindingConfig {
    pub button: ButtonId,
    pub kind: EventKind,
    pub action: BindingAction,
}

// Default value functions
fn default_x_axis_id() -> String { "45000001".to_string() }
fn default_y_axis_id() -> String { "45000002".to_string() }
fn default_stage_poll_period_ms() -> u64 { 250 }
fn default_settings_timeout_ms() -> u64 { 5000 }
fn default_homing_timeout_ms() -> u64 { 60000 }
fn default_stop_timeout_ms() -> u64 { 6000 }

fn default_dead_zone() -> f64 { 7849.0 }
fn default_gamepad_poll_period_ms() -> u64 { 20 }
fn default_rescan_interval_ms() -> u64 { 1000 }

fn default_settings_delay_ms() -> u64 { 1000 }
fn default_velocity() -> f64 { 2.0 }
fn default_home_velocity() -> f64 { 5.0 }

fn default_log_level() -> String { "info".to_string() }

fn default_settings_path() -> String { "./xbox-stage-settings.toml".to_string() }

fn default_bindings() -> Vec<BindingConfig> {
    vec![
        BindingConfig { button: ButtonId::Start, kind: EventKind::PressedEdge, action: BindingAction::Connect },
        BindingConfig { button: ButtonId::Back, kind: EventKind::PressedEdge, action: BindingAction::Disconnect },
        BindingConfig { button: ButtonId::Y, kind: EventKind::PressedEdge, action: BindingAction::Home },
        BindingConfig { button: ButtonId::A, kind: EventKind::Held, action: BindingAction::Log },
        BindingConfig { button: ButtonId::A, kind: EventKind::PressedEdge, action: BindingAction::Log },
        BindingConfig { button: ButtonId::B, kind: EventKind::Held, action: BindingAction::Log },
        BindingConfig { button: ButtonId::B, kind: EventKind::PressedEdge, action: BindingAction::Log },
    ]
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            x_axis_id: default_x_axis_id(),
            y_axis_id: default_y_axis_id(),
            poll_period_ms: default_stage_poll_period_ms(),
            settings_timeout_ms: default_settings_timeout_ms(),
            homing_timeout_ms: default_homing_timeout_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            invert_x: false,
            invert_y: false,
        }
    }
}

impl Default for GamepadConfig {
    fn default() -> Self {
        Self {
            device_path: String::new(),
            dead_zone: default_dead_zone(),
            poll_period_ms: default_gamepad_poll_period_ms(),
            rescan_interval_ms: default_rescan_interval_ms(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            settings_delay_ms: default_settings_delay_ms(),
            velocity: default_velocity(),
            home_velocity: default_home_velocity(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stage: StageConfig::default(),
            gamepad: GamepadConfig::default(),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig {
                level: default_log_level(),
                log_dir: String::new(),
            },
            settings: SettingsConfig {
                path: default_settings_path(),
            },
            bindings: default_bindings(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> StageError {
    StageError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use xbox_stage::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Axis serial numbers
        if self.stage.x_axis_id.trim().is_empty() || self.stage.y_axis_id.trim().is_empty() {
            return Err(invalid("x_axis_id and y_axis_id cannot be empty"));
        }

        if self.stage.x_axis_id == self.stage.y_axis_id {
            return Err(invalid("x_axis_id and y_axis_id must differ"));
        }

        // Stage timing
        if self.stage.poll_period_ms == 0 || self.stage.poll_period_ms > 10000 {
            return Err(invalid("stage poll_period_ms must be between 1 and 10000"));
        }

        if self.stage.settings_timeout_ms == 0 || self.stage.settings_timeout_ms > 60000 {
            return Err(invalid("settings_timeout_ms must be between 1 and 60000"));
        }

        if self.stage.homing_timeout_ms == 0 || self.stage.homing_timeout_ms > 600000 {
            return Err(invalid("homing_timeout_ms must be between 1 and 600000"));
        }

        if self.stage.stop_timeout_ms == 0 || self.stage.stop_timeout_ms > 60000 {
            return Err(invalid("stop_timeout_ms must be between 1 and 60000"));
        }

        // Gamepad
        if !(0.0..32767.0).contains(&self.gamepad.dead_zone) {
            return Err(invalid("dead_zone must be between 0 and 32767 (exclusive)"));
        }

        if self.gamepad.poll_period_ms == 0 || self.gamepad.poll_period_ms > 1000 {
            return Err(invalid("gamepad poll_period_ms must be between 1 and 1000"));
        }

        if self.gamepad.rescan_interval_ms == 0 || self.gamepad.rescan_interval_ms > 60000 {
            return Err(invalid("rescan_interval_ms must be between 1 and 60000"));
        }

        // Simulation
        if !(self.simulation.velocity > 0.0) || !(self.simulation.home_velocity > 0.0) {
            return Err(invalid("simulation velocities must be greater than 0"));
        }

        // Logging
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(invalid(format!(
                "log level '{}' must be one of: trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        if self.settings.path.is_empty() {
            return Err(invalid("settings path cannot be empty"));
        }

        // Each (button, kind) may be bound once
        let mut seen = HashSet::new();
        for binding in &self.bindings {
            if !seen.insert((binding.button, binding.kind)) {
                return Err(invalid(format!(
                    "duplicate binding for {:?} {:?}",
                    binding.button, binding.kind
                )));
            }
        }

        Ok(())
    }
}
