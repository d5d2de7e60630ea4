//! # Gamepad Input Module
//!
//! The [`InputSource`] interface consumed by the polling loop, and an evdev
//! implementation for Linux.
//!
//! ## Controller Detection
//!
//! Any `/dev/input/event*` device that reports both `ABS_X` and
//! `BTN_SOUTH` is treated as a gamepad. A fixed `device_path` skips the
//! scan.
//!
//! ## Axis Mapping
//!
//! | Sample field | evdev source |
//! |--------------|--------------|
//! | left_stick_x | ABS_X, rescaled to -32768..32767 |
//! | left_stick_y | ABS_Y, rescaled and inverted (up is positive) |
//! | D-Pad | ABS_HAT0X / ABS_HAT0Y, or BTN_DPAD_* |
//!
//! ## Button Mapping
//!
//! | Button | evdev Code |
//! |--------|------------|
//! | A | BTN_SOUTH |
//! | B | BTN_EAST |
//! | X | BTN_NORTH |
//! | Y | BTN_WEST |
//! | Left Shoulder | BTN_TL |
//! | Right Shoulder | BTN_TR |
//! | Back | BTN_SELECT |
//! | Start | BTN_START |
//! | Left Thumb | BTN_THUMBL |
//! | Right Thumb | BTN_THUMBR |

use evdev::{AbsoluteAxisType, AttributeSetRef, Device, Key};
use std::path::Path;
use tracing::{debug, info, warn};

use super::sample::{ButtonId, ButtonSet, RawInputSample};
use crate::error::{Result, StageError};

/// Source of gamepad samples.
pub trait InputSource: Send {
    /// True while a gamepad is attached.
    fn is_connected(&self) -> bool;

    /// Captures the current controller state.
    ///
    /// Returns `None` if the gamepad was lost during the read.
    fn get_state(&mut self) -> Option<RawInputSample>;

    /// Tries to attach a gamepad if none is connected.
    fn rescan(&mut self) {}
}

const KEY_MAP: [(Key, ButtonId); 14] = [
    (Key::BTN_SOUTH, ButtonId::A),
    (Key::BTN_EAST, ButtonId::B),
    (Key::BTN_NORTH, ButtonId::X),
    (Key::BTN_WEST, ButtonId::Y),
    (Key::BTN_TL, ButtonId::LeftShoulder),
    (Key::BTN_TR, ButtonId::RightShoulder),
    (Key::BTN_SELECT, ButtonId::Back),
    (Key::BTN_START, ButtonId::Start),
    (Key::BTN_THUMBL, ButtonId::LeftThumb),
    (Key::BTN_THUMBR, ButtonId::RightThumb),
    (Key::BTN_DPAD_UP, ButtonId::DPadUp),
    (Key::BTN_DPAD_DOWN, ButtonId::DPadDown),
    (Key::BTN_DPAD_LEFT, ButtonId::DPadLeft),
    (Key::BTN_DPAD_RIGHT, ButtonId::DPadRight),
];

/// Rescales a raw axis value from `min..=max` onto the i16 range.
#[must_use]
pub fn scale_axis(value: i32, min: i32, max: i32) -> i16 {
    if max <= min {
        return 0;
    }
    if min == i32::from(i16::MIN) && max == i32::from(i16::MAX) {
        return value.clamp(min, max) as i16;
    }

    let span = f64::from(max) - f64::from(min);
    let fraction = (f64::from(value.clamp(min, max)) - f64::from(min)) / span;
    let scaled = fraction * 65535.0 - 32768.0;
    scaled.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Inverts an i16 axis, saturating at the positive end.
#[must_use]
pub fn invert_axis(value: i16) -> i16 {
    value.checked_neg().unwrap_or(i16::MAX)
}

/// Builds the button set from pressed keys and the D-Pad hat.
#[must_use]
pub fn button_set(pressed: &AttributeSetRef<Key>, hat_x: i32, hat_y: i32) -> ButtonSet {
    let mut buttons = ButtonSet::empty();

    for (key, button) in KEY_MAP {
        if pressed.contains(key) {
            buttons.insert(button);
        }
    }

    if hat_x < 0 {
        buttons.insert(ButtonId::DPadLeft);
    } else if hat_x > 0 {
        buttons.insert(ButtonId::DPadRight);
    }
    if hat_y < 0 {
        buttons.insert(ButtonId::DPadUp);
    } else if hat_y > 0 {
        buttons.insert(ButtonId::DPadDown);
    }

    buttons
}

/// Gamepad read through the Linux evdev interface.
///
/// Reads are non-blocking snapshots of the kernel's key and axis state, so
/// they can run on every tick of the polling loop.
pub struct EvdevGamepad {
    configured_path: String,
    device: Option<Device>,
    device_path: String,
}

impl std::fmt::Debug for EvdevGamepad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvdevGamepad")
            .field("device_path", &self.device_path)
            .field("connected", &self.device.is_some())
            .finish_non_exhaustive()
    }
}

impl EvdevGamepad {
    /// Creates a detached gamepad. `device_path` may be empty to auto-detect.
    #[must_use]
    pub fn new(device_path: &str) -> Self {
        Self {
            configured_path: device_path.to_string(),
            device: None,
            device_path: String::new(),
        }
    }

    /// Opens the configured device, or the first gamepad found.
    ///
    /// # Errors
    ///
    /// - `GamepadNotFound`: no matching device
    /// - `Io`: `/dev/input` cannot be read
    pub fn open(&mut self) -> Result<()> {
        let (device, path) = if self.configured_path.is_empty() {
            Self::scan()?
        } else {
            let device = Device::open(&self.configured_path).map_err(|e| {
                StageError::GamepadNotFound(format!("{}: {}", self.configured_path, e))
            })?;
            (device, self.configured_path.clone())
        };

        info!(
            "Gamepad connected at {} ({})",
            path,
            device.name().unwrap_or("unnamed")
        );
        self.device = Some(device);
        self.device_path = path;
        Ok(())
    }

    /// Path of the attached device, empty when detached.
    #[must_use]
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    fn scan() -> Result<(Device, String)> {
        let input_dir = Path::new("/dev/input");

        let mut entries: Vec<_> = std::fs::read_dir(input_dir)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Sort entries for deterministic device selection when multiple controllers are connected
        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let path = entry.path();

            let is_event = path
                .file_name()
                .map(|name| name.to_string_lossy().starts_with("event"))
                .unwrap_or(false);
            if !is_event {
                continue;
            }

            match Device::open(&path) {
                Ok(device) => {
                    if Self::is_gamepad(&device) {
                        return Ok((device, path.to_string_lossy().to_string()));
                    }
                }
                Err(e) => debug!("Could not open {}: {}", path.display(), e),
            }
        }

        Err(StageError::GamepadNotFound("/dev/input".to_string()))
    }

    fn is_gamepad(device: &Device) -> bool {
        let has_stick = device
            .supported_absolute_axes()
            .map(|axes| axes.contains(AbsoluteAxisType::ABS_X))
            .unwrap_or(false);
        let has_buttons = device
            .supported_keys()
            .map(|keys| keys.contains(Key::BTN_SOUTH))
            .unwrap_or(false);
        has_stick && has_buttons
    }

    fn read(device: &Device) -> std::io::Result<RawInputSample> {
        let keys = device.get_key_state()?;
        let abs = device.get_abs_state()?;

        let axis = |axis: AbsoluteAxisType| &abs[axis.0 as usize];
        let x = axis(AbsoluteAxisType::ABS_X);
        let y = axis(AbsoluteAxisType::ABS_Y);

        Ok(RawInputSample {
            left_stick_x: scale_axis(x.value, x.minimum, x.maximum),
            left_stick_y: invert_axis(scale_axis(y.value, y.minimum, y.maximum)),
            buttons: button_set(
                &keys,
                axis(AbsoluteAxisType::ABS_HAT0X).value,
                axis(AbsoluteAxisType::ABS_HAT0Y).value,
            ),
        })
    }
}

impl InputSource for EvdevGamepad {
    fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    fn get_state(&mut self) -> Option<RawInputSample> {
        let device = self.device.as_ref()?;

        match Self::read(device) {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("Gamepad at {} lost: {}", self.device_path, e);
                self.device = None;
                self.device_path.clear();
                None
            }
        }
    }

    fn rescan(&mut self) {
        if self.device.is_some() {
            return;
        }
        if let Err(e) = self.open() {
            debug!("Gamepad rescan: {}", e);
        }
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted input source for testing.
    ///
    /// Each tick pops one entry; `None` entries report the gamepad as
    /// disconnected. Once the script runs out the last entry repeats.
    #[derive(Clone)]
    pub struct ScriptedGamepad {
        pub script: Arc<Mutex<VecDeque<Option<RawInputSample>>>>,
        pub current: Arc<Mutex<Option<RawInputSample>>>,
        pub reads: Arc<Mutex<usize>>,
        pub rescans: Arc<Mutex<usize>>,
        pub fail_next_read: Arc<Mutex<bool>>,
    }

    impl ScriptedGamepad {
        pub fn new(script: Vec<Option<RawInputSample>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                current: Arc::new(Mutex::new(None)),
                reads: Arc::new(Mutex::new(0)),
                rescans: Arc::new(Mutex::new(0)),
                fail_next_read: Arc::new(Mutex::new(false)),
            }
        }

        /// Makes the next read lose the gamepad.
        pub fn fail_next_read(&self) {
            *self.fail_next_read.lock().unwrap() = true;
        }

        /// Advances the script by one tick.
        fn step(&self) {
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                *self.current.lock().unwrap() = next;
            }
        }

        pub fn reads(&self) -> usize {
            *self.reads.lock().unwrap()
        }

        pub fn rescans(&self) -> usize {
            *self.rescans.lock().unwrap()
        }
    }

    impl InputSource for ScriptedGamepad {
        fn is_connected(&self) -> bool {
            self.step();
            self.current.lock().unwrap().is_some()
        }

        fn get_state(&mut self) -> Option<RawInputSample> {
            *self.reads.lock().unwrap() += 1;
            if std::mem::take(&mut *self.fail_next_read.lock().unwrap()) {
                *self.current.lock().unwrap() = None;
                return None;
            }
            *self.current.lock().unwrap()
        }

        fn rescan(&mut self) {
            *self.rescans.lock().unwrap() += 1;
        }
    }
}
