//! # Button Bindings Module
//!
//! The dispatch table from `(button, kind)` to an action.
//!
//! Each key maps to exactly one action; [`ButtonBindings::new`] rejects a
//! table that binds the same key twice. Stage actions are returned as
//! [`StageCommand`]s for the caller to queue. `Log` actions are reported
//! here.
//!
//! ## Default Table
//!
//! | Button | Kind | Action |
//! |--------|------|--------|
//! | Start | PressedEdge | Connect |
//! | Back | PressedEdge | Disconnect |
//! | Y | PressedEdge | Home |
//! | A, B | Held, PressedEdge | Log |

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::buttons::{ButtonEvent, EventKind};
use super::sample::{ButtonId, ButtonSet};
use crate::config::BindingConfig;
use crate::error::{Result, StageError};
use crate::stage::StageCommand;

/// What a bound button does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingAction {
    Connect,
    Disconnect,
    Home,
    /// Report the event in the log only.
    Log,
}

impl BindingAction {
    /// Stage command for this action, if any.
    #[must_use]
    pub fn command(self) -> Option<StageCommand> {
        match self {
            BindingAction::Connect => Some(StageCommand::Connect),
            BindingAction::Disconnect => Some(StageCommand::Disconnect),
            BindingAction::Home => Some(StageCommand::Home),
            BindingAction::Log => None,
        }
    }
}

/// Dispatch table keyed by `(button, kind)`.
///
/// # Examples
///
/// ```
/// use xbox_stage::config::BindingConfig;
/// use xbox_stage::controller::bindings::{BindingAction, ButtonBindings};
/// use xbox_stage::controller::buttons::{ButtonEvent, EventKind};
/// use xbox_stage::controller::sample::ButtonId;
/// use xbox_stage::stage::StageCommand;
///
/// let bindings = ButtonBindings::new(&[BindingConfig {
///     button: ButtonId::Start,
///     kind: EventKind::PressedEdge,
///     action: BindingAction::Connect,
/// }])?;
///
/// let commands = bindings.resolve(&[ButtonEvent::new(ButtonId::Start, EventKind::PressedEdge)]);
/// assert_eq!(commands, vec![StageCommand::Connect]);
/// # Ok::<(), xbox_stage::error::StageError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ButtonBindings {
    table: BTreeMap<(ButtonId, EventKind), BindingAction>,
    tracked: ButtonSet,
}

impl ButtonBindings {
    /// Builds the table.
    ///
    /// # Errors
    ///
    /// Returns `Config` error if a `(button, kind)` pair is bound twice.
    pub fn new(entries: &[BindingConfig]) -> Result<Self> {
        let mut bindings = Self::default();

        for entry in entries {
            let key = (entry.button, entry.kind);
            if bindings.table.insert(key, entry.action).is_some() {
                return Err(StageError::Config(serde::de::Error::custom(format!(
                    "duplicate binding for {:?} {:?}",
                    entry.button, entry.kind
                ))));
            }
            bindings.tracked.insert(entry.button);
        }

        Ok(bindings)
    }

    /// Buttons that appear in the table.
    #[must_use]
    pub fn tracked(&self) -> ButtonSet {
        self.tracked
    }

    #[must_use]
    pub fn action(&self, button: ButtonId, kind: EventKind) -> Option<BindingAction> {
        self.table.get(&(button, kind)).copied()
    }

    /// Looks up each event and returns the stage commands, in event order.
    pub fn resolve(&self, events: &[ButtonEvent]) -> Vec<StageCommand> {
        let mut commands = Vec::new();

        for event in events {
            let Some(action) = self.action(event.button, event.kind) else {
                continue;
            };

            match action.command() {
                Some(command) => {
                    info!("{:?} {:?} -> {:?}", event.button, event.kind, command);
                    commands.push(command);
                }
                None if event.kind == EventKind::Held => {
                    debug!("Button {:?} held", event.button);
                }
                None => info!("Button {:?} pressed", event.button),
            }
        }

        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(button: ButtonId, kind: EventKind, action: BindingAction) -> BindingConfig {
        BindingConfig { button, kind, action }
    }

    #[test]
    fn test_tracked_buttons() {
        let bindings = ButtonBindings::new(&[
            entry(ButtonId::A, EventKind::Held, BindingAction::Log),
            entry(ButtonId::A, EventKind::PressedEdge, BindingAction::Log),
            entry(ButtonId::Start, EventKind::PressedEdge, BindingAction::Connect),
        ])
        .unwrap();

        assert_eq!(bindings.tracked(), ButtonSet::from_buttons(&[ButtonId::A, ButtonId::Start]));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let result = ButtonBindings::new(&[
            entry(ButtonId::A, EventKind::PressedEdge, BindingAction::Log),
            entry(ButtonId::A, EventKind::PressedEdge, BindingAction::Home),
        ]);
        assert!(matches!(result, Err(StageError::Config(_))));
    }

    #[test]
    fn test_kinds_are_distinct_keys() {
        let bindings = ButtonBindings::new(&[
            entry(ButtonId::B, EventKind::Held, BindingAction::Log),
            entry(ButtonId::B, EventKind::PressedEdge, BindingAction::Disconnect),
        ])
        .unwrap();

        let held = bindings.resolve(&[ButtonEvent::new(ButtonId::B, EventKind::Held)]);
        assert!(held.is_empty());

        let edge = bindings.resolve(&[
            ButtonEvent::new(ButtonId::B, EventKind::Held),
            ButtonEvent::new(ButtonId::B, EventKind::PressedEdge),
        ]);
        assert_eq!(edge, vec![StageCommand::Disconnect]);
    }

    #[test]
    fn test_unbound_events_ignored() {
        let bindings = ButtonBindings::new(&[entry(
            ButtonId::Y,
            EventKind::PressedEdge,
            BindingAction::Home,
        )])
        .unwrap();

        let commands = bindings.resolve(&[
            ButtonEvent::new(ButtonId::Y, EventKind::Held),
            ButtonEvent::new(ButtonId::X, EventKind::PressedEdge),
        ]);
        assert!(commands.is_empty());
    }

    #[test]
    fn test_action_commands() {
        assert_eq!(BindingAction::Connect.command(), Some(StageCommand::Connect));
        assert_eq!(BindingAction::Disconnect.command(), Some(StageCommand::Disconnect));
        assert_eq!(BindingAction::Home.command(), Some(StageCommand::Home));
        assert_eq!(BindingAction::Log.command(), None);
    }
}
