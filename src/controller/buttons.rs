//! # Button Edge Module
//!
//! Level ("held") and rising-edge ("just pressed") detection over
//! consecutive samples.
//!
//! [`update`] is a pure function of the current sample and the previous
//! one. The previous sample is an `Option`: `None` means no sample has been
//! seen yet, and no edge fires on that tick even if a button is already
//! down. [`SampleBuffer`] owns the `(current, previous)` pair for the
//! polling loop.
//!
//! ## Usage
//!
//! ```
//! use xbox_stage::controller::buttons::{update, EventKind};
//! use xbox_stage::controller::sample::{ButtonId, ButtonSet, RawInputSample};
//!
//! let tracked = ButtonSet::from_buttons(&[ButtonId::A]);
//! let up = RawInputSample::default();
//! let down = RawInputSample::new(0, 0, tracked);
//!
//! let events = update(&down, Some(&up), tracked);
//! assert!(events.iter().any(|e| e.kind == EventKind::PressedEdge));
//! ```

use super::sample::{ButtonId, ButtonSet, RawInputSample};

/// Kind of button event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Button is down on this tick.
    Held,
    /// Button went down on this tick.
    PressedEdge,
}

/// A level or edge event for one button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: ButtonId,
    pub kind: EventKind,
}

impl ButtonEvent {
    #[must_use]
    pub fn new(button: ButtonId, kind: EventKind) -> Self {
        Self { button, kind }
    }
}

/// Computes the events for one tick.
///
/// For each tracked button present in `current`, emits `Held`, followed by
/// `PressedEdge` if the button was absent from `previous`. Buttons are
/// visited in bit order, so output is deterministic.
#[must_use]
pub fn update(
    current: &RawInputSample,
    previous: Option<&RawInputSample>,
    tracked: ButtonSet,
) -> Vec<ButtonEvent> {
    let mut events = Vec::new();

    for button in tracked.iter() {
        if !current.buttons.contains(button) {
            continue;
        }

        events.push(ButtonEvent::new(button, EventKind::Held));

        if let Some(prev) = previous {
            if !prev.buttons.contains(button) {
                events.push(ButtonEvent::new(button, EventKind::PressedEdge));
            }
        }
    }

    events
}

/// Double buffer of the two most recent samples.
///
/// # Examples
///
/// ```
/// use xbox_stage::controller::buttons::SampleBuffer;
/// use xbox_stage::controller::sample::RawInputSample;
///
/// let mut buffer = SampleBuffer::new();
/// assert!(buffer.previous().is_none());
///
/// buffer.push(RawInputSample::default());
/// buffer.push(RawInputSample::default());
/// assert!(buffer.previous().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    current: Option<RawInputSample>,
    previous: Option<RawInputSample>,
}

impl SampleBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `sample` current, shifting the old current into previous.
    pub fn push(&mut self, sample: RawInputSample) {
        self.previous = self.current.replace(sample);
    }

    #[must_use]
    pub fn previous(&self) -> Option<&RawInputSample> {
        self.previous.as_ref()
    }

    /// Pushes `sample` and returns the events for it.
    pub fn advance(&mut self, sample: RawInputSample, tracked: ButtonSet) -> Vec<ButtonEvent> {
        self.push(sample);
        update(&sample, self.previous.as_ref(), tracked)
    }

    /// Forgets both samples; the next tick behaves like the first one.
    pub fn reset(&mut self) {
        self.current = None;
        self.previous = None;
    }
}
