//! # Raw Input Sample Module
//!
//! One immutable snapshot of the gamepad: left stick axes plus the button
//! bitmask, captured once per scheduler tick.
//!
//! ## Button Bits
//!
//! Bit values follow the XInput `wButtons` layout so that samples from any
//! backend share one representation.
//!
//! | Button | Bit |
//! |--------|-----|
//! | D-Pad Up | 0x0001 |
//! | D-Pad Down | 0x0002 |
//! | D-Pad Left | 0x0004 |
//! | D-Pad Right | 0x0008 |
//! | Start | 0x0010 |
//! | Back | 0x0020 |
//! | Left Thumb | 0x0040 |
//! | Right Thumb | 0x0080 |
//! | Left Shoulder | 0x0100 |
//! | Right Shoulder | 0x0200 |
//! | A | 0x1000 |
//! | B | 0x2000 |
//! | X | 0x4000 |
//! | Y | 0x8000 |

use serde::Deserialize;

/// Identifies one digital button on the gamepad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonId {
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    Start,
    Back,
    LeftThumb,
    RightThumb,
    LeftShoulder,
    RightShoulder,
    A,
    B,
    X,
    Y,
}

impl ButtonId {
    /// All buttons, in bit order.
    pub const ALL: [ButtonId; 14] = [
        ButtonId::DPadUp,
        ButtonId::DPadDown,
        ButtonId::DPadLeft,
        ButtonId::DPadRight,
        ButtonId::Start,
        ButtonId::Back,
        ButtonId::LeftThumb,
        ButtonId::RightThumb,
        ButtonId::LeftShoulder,
        ButtonId::RightShoulder,
        ButtonId::A,
        ButtonId::B,
        ButtonId::X,
        ButtonId::Y,
    ];

    /// Bit of this button in a [`ButtonSet`].
    #[must_use]
    pub const fn mask(self) -> u16 {
        match self {
            ButtonId::DPadUp => 0x0001,
            ButtonId::DPadDown => 0x0002,
            ButtonId::DPadLeft => 0x0004,
            ButtonId::DPadRight => 0x0008,
            ButtonId::Start => 0x0010,
            ButtonId::Back => 0x0020,
            ButtonId::LeftThumb => 0x0040,
            ButtonId::RightThumb => 0x0080,
            ButtonId::LeftShoulder => 0x0100,
            ButtonId::RightShoulder => 0x0200,
            ButtonId::A => 0x1000,
            ButtonId::B => 0x2000,
            ButtonId::X => 0x4000,
            ButtonId::Y => 0x8000,
        }
    }
}

/// Set of buttons stored as a bitmask.
///
/// # Examples
///
/// ```
/// use xbox_stage::controller::sample::{ButtonId, ButtonSet};
///
/// let set = ButtonSet::from_buttons(&[ButtonId::A, ButtonId::Start]);
/// assert!(set.contains(ButtonId::A));
/// assert!(!set.contains(ButtonId::B));
/// assert_eq!(set.bits(), 0x1010);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ButtonSet(u16);

impl ButtonSet {
    /// Empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wraps a raw XInput-style bitmask. Unassigned bits are dropped.
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        let known = ButtonId::ALL.iter().fold(0u16, |acc, b| acc | b.mask());
        Self(bits & known)
    }

    /// Builds a set from a list of buttons.
    #[must_use]
    pub fn from_buttons(buttons: &[ButtonId]) -> Self {
        buttons.iter().fold(Self::empty(), |mut set, &b| {
            set.insert(b);
            set
        })
    }

    /// Raw bitmask.
    #[must_use]
    pub const fn bits(&self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn contains(&self, button: ButtonId) -> bool {
        self.0 & button.mask() != 0
    }

    pub fn insert(&mut self, button: ButtonId) {
        self.0 |= button.mask();
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterates the buttons in the set, in bit order.
    pub fn iter(&self) -> impl Iterator<Item = ButtonId> + '_ {
        ButtonId::ALL.into_iter().filter(move |b| self.contains(*b))
    }
}

/// One snapshot of controller state at a sampling instant.
///
/// Stick values use the full signed 16-bit range with positive X to the
/// right and positive Y up.
///
/// # Examples
///
/// ```
/// use xbox_stage::controller::sample::RawInputSample;
///
/// let sample = RawInputSample::default();
/// assert_eq!(sample.left_stick_x, 0);
/// assert!(sample.buttons.is_empty());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawInputSample {
    /// Left stick X axis. -32768 = full left, 32767 = full right.
    pub left_stick_x: i16,
    /// Left stick Y axis. -32768 = full down, 32767 = full up.
    pub left_stick_y: i16,
    /// Buttons held at the sampling instant.
    pub buttons: ButtonSet,
}

impl RawInputSample {
    #[must_use]
    pub fn new(left_stick_x: i16, left_stick_y: i16, buttons: ButtonSet) -> Self {
        Self {
            left_stick_x,
            left_stick_y,
            buttons,
        }
    }
}
