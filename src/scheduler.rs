//! # Polling Scheduler
//!
//! Fixed-period loop that turns gamepad samples into stage motion.
//!
//! Each tick:
//! 1. Skip (and occasionally rescan) while no gamepad is attached
//! 2. Capture a sample and compute button events
//! 3. Queue bound stage commands for the command task
//! 4. Normalize the left stick and dispatch it to the axes
//! 5. Refresh the published stage status
//!
//! Ticks run sequentially on one task and never block on `connect` or
//! `home`: those are sent over an `mpsc` channel instead.
//!
//! Losing the gamepad is the one exception to "no gamepad, no commands":
//! the tick that notices the loss stops any moving axis once.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::controller::bindings::ButtonBindings;
use crate::controller::buttons::SampleBuffer;
use crate::controller::deadzone::{normalize, NormalizedInput};
use crate::controller::gamepad::InputSource;
use crate::error::Result;
use crate::stage::{MotionDispatcher, StageCommand, StageController};

/// Periodic input loop.
pub struct PollingScheduler<I: InputSource> {
    input: I,
    stage: Arc<StageController>,
    commands: mpsc::Sender<StageCommand>,
    bindings: ButtonBindings,
    dispatcher: MotionDispatcher,
    buffer: SampleBuffer,
    dead_zone: f64,
    period: Duration,
    rescan_interval: Duration,
    last_rescan: Option<Instant>,
    was_connected: bool,
}

impl<I: InputSource> PollingScheduler<I> {
    /// Builds a scheduler from the `[gamepad]`, `[stage]` and `[[bindings]]`
    /// sections.
    ///
    /// # Errors
    ///
    /// Returns `Config` error if the binding table is invalid.
    pub fn new(
        config: &Config,
        input: I,
        stage: Arc<StageController>,
        commands: mpsc::Sender<StageCommand>,
    ) -> Result<Self> {
        Ok(Self {
            input,
            stage,
            commands,
            bindings: ButtonBindings::new(&config.bindings)?,
            dispatcher: MotionDispatcher::new(config.stage.invert_x, config.stage.invert_y),
            buffer: SampleBuffer::new(),
            dead_zone: config.gamepad.dead_zone,
            period: Duration::from_millis(config.gamepad.poll_period_ms),
            rescan_interval: Duration::from_millis(config.gamepad.rescan_interval_ms),
            last_rescan: None,
            was_connected: false,
        })
    }

    /// Runs one tick.
    pub async fn tick(&mut self) {
        if !self.input.is_connected() {
            self.handle_disconnected().await;
            return;
        }
        if !self.was_connected {
            info!("Gamepad input active");
            self.was_connected = true;
        }

        let Some(sample) = self.input.get_state() else {
            self.handle_disconnected().await;
            return;
        };
        let events = self.buffer.advance(sample, self.bindings.tracked());

        for command in self.bindings.resolve(&events) {
            if let Err(e) = self.commands.try_send(command) {
                warn!("Dropped {:?}: {}", command, e);
            }
        }

        let input = normalize(sample.left_stick_x, sample.left_stick_y, self.dead_zone);
        if !input.is_idle() {
            debug!(
                "Stick ({:.3}, {:.3}) magnitude {:.3}",
                input.direction_x, input.direction_y, input.magnitude
            );
        }
        self.stage.dispatch(&self.dispatcher, &input).await;
        self.stage.refresh_status();
    }

    /// Ticks every period until `shutdown` becomes true or its sender is
    /// dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Polling gamepad every {} ms", self.period.as_millis());

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Polling stopped");
    }

    async fn handle_disconnected(&mut self) {
        if self.was_connected {
            warn!("Gamepad disconnected, stopping axes");
            self.was_connected = false;
            self.buffer.reset();
            self.stage.dispatch(&self.dispatcher, &NormalizedInput::ZERO).await;
            self.stage.refresh_status();
        }

        let due = self
            .last_rescan
            .map_or(true, |last| last.elapsed() >= self.rescan_interval);
        if due {
            self.last_rescan = Some(Instant::now());
            self.input.rescan();
        }
    }
}
