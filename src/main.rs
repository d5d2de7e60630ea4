//! # XBox Stage
//!
//! Move a two-axis linear stage with a gamepad.
//!
//! The left stick jogs the X and Y axes, bound buttons connect, disconnect
//! and home the stage. The same commands are accepted one per line on stdin.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument, or `config/default.toml`)
//!    - Set up logging with tracing subscriber
//!    - Restore user settings
//!    - Open the gamepad (a missing gamepad is retried in the loop)
//!
//! 2. **Running**
//!    - Polling task: gamepad -> bindings -> stage motion
//!    - Command task: connect / disconnect / home, one at a time
//!    - Stdin task: text commands for the command task
//!
//! 3. **Graceful Shutdown** (Ctrl+C or `quit`)
//!    - Stop polling
//!    - Disconnect both axes
//!    - Save settings
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! ```
//!
//! Expected output:
//! ```text
//! INFO xbox_stage: XBox Stage v0.1.0 starting...
//! INFO xbox_stage::controller::gamepad: Gamepad connected at /dev/input/event5 (Xbox Wireless Controller)
//! INFO xbox_stage::scheduler: Polling gamepad every 20 ms
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use xbox_stage::config::{Config, LoggingConfig};
use xbox_stage::controller::gamepad::EvdevGamepad;
use xbox_stage::scheduler::PollingScheduler;
use xbox_stage::settings::{Settings, SettingsStore, TomlSettingsStore};
use xbox_stage::stage::{AxisId, SimulatedDriver, StageCommand, StageController};

/// Configuration used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Depth of the stage command queue
const COMMAND_QUEUE_DEPTH: usize = 16;

/// One line typed on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand {
    Stage(StageCommand),
    Status,
    Quit,
}

fn parse_console_command(line: &str) -> Option<ConsoleCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "connect" | "c" => Some(ConsoleCommand::Stage(StageCommand::Connect)),
        "disconnect" | "d" => Some(ConsoleCommand::Stage(StageCommand::Disconnect)),
        "home" | "h" => Some(ConsoleCommand::Stage(StageCommand::Home)),
        "status" | "s" => Some(ConsoleCommand::Status),
        "quit" | "q" | "exit" => Some(ConsoleCommand::Quit),
        _ => None,
    }
}

fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.log_dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.log_dir, "xbox-stage.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

/// Reads stdin until EOF or `quit`.
async fn console(
    commands: mpsc::Sender<StageCommand>,
    stage: Arc<StageController>,
    shutdown: watch::Sender<bool>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Commands: connect, disconnect, home, status, quit");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_console_command(&line) {
            Some(ConsoleCommand::Stage(command)) => {
                if commands.send(command).await.is_err() {
                    return;
                }
            }
            Some(ConsoleCommand::Status) => {
                let status = stage.status();
                println!(
                    "X {:?} at {:.3}, Y {:?} at {:.3}, initialized: {}",
                    status.x_state,
                    status.position_x,
                    status.y_state,
                    status.position_y,
                    status.stage_initialized
                );
            }
            Some(ConsoleCommand::Quit) => {
                let _ = shutdown.send(true);
                return;
            }
            None => warn!("Unknown command: {}", line.trim()),
        }
    }
}

/// Main entry point for XBox Stage
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded or is invalid
/// - The restored settings make the configuration invalid
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);
    info!("XBox Stage v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path);

    let store = TomlSettingsStore::new(&config.settings.path, Settings::from_config(&config));
    let mut settings = store.restore();
    settings.apply(&mut config);
    config
        .validate()
        .with_context(|| format!("Invalid settings in {}", store.path().display()))?;

    let driver = Arc::new(SimulatedDriver::new(&config.simulation));
    driver.register_at(
        AxisId::new(config.stage.x_axis_id.clone()),
        settings.last_position_x,
    );
    driver.register_at(
        AxisId::new(config.stage.y_axis_id.clone()),
        settings.last_position_y,
    );
    info!(
        "Stage axes: X {} Y {} (simulated)",
        config.stage.x_axis_id, config.stage.y_axis_id
    );

    let stage = Arc::new(StageController::new(&config.stage, driver));
    let status_rx = stage.subscribe();

    let mut gamepad = EvdevGamepad::new(&config.gamepad.device_path);
    if let Err(e) = gamepad.open() {
        warn!("{}, will keep scanning", e);
    }

    let (command_tx, mut command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = PollingScheduler::new(&config, gamepad, stage.clone(), command_tx.clone())?;
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    let command_task = {
        let stage = stage.clone();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                stage.execute(command).await;
            }
        })
    };

    let console_task = tokio::spawn(console(command_tx, stage.clone(), shutdown_tx.clone()));

    info!("Press Ctrl+C to exit");

    let mut quit_rx = shutdown_rx;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
        _ = quit_rx.wait_for(|quit| *quit) => info!("Quit requested, shutting down..."),
    }

    let _ = shutdown_tx.send(true);
    console_task.abort();
    command_task.abort();
    if let Err(e) = scheduler_task.await {
        warn!("Polling task failed: {}", e);
    }

    stage.request_disconnect().await;

    // Positions are only known once an axis has connected this session
    if status_rx.has_changed().unwrap_or(false) {
        settings.record_positions(&stage.status());
    }
    if let Err(e) = store.save(&settings) {
        warn!("Failed to save settings: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage_commands() {
        assert_eq!(
            parse_console_command("connect"),
            Some(ConsoleCommand::Stage(StageCommand::Connect))
        );
        assert_eq!(
            parse_console_command("  Disconnect \n"),
            Some(ConsoleCommand::Stage(StageCommand::Disconnect))
        );
        assert_eq!(
            parse_console_command("h"),
            Some(ConsoleCommand::Stage(StageCommand::Home))
        );
    }

    #[test]
    fn test_parse_console_commands() {
        assert_eq!(parse_console_command("status"), Some(ConsoleCommand::Status));
        assert_eq!(parse_console_command("QUIT"), Some(ConsoleCommand::Quit));
        assert_eq!(parse_console_command("exit"), Some(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(parse_console_command("jump"), None);
        assert_eq!(parse_console_command(""), None);
    }

    #[test]
    fn test_command_queue_depth() {
        assert!(COMMAND_QUEUE_DEPTH >= 2, "Queue must hold a connect and a disconnect");
    }
}
