//! # Controller Module
//!
//! Gamepad input handling.
//!
//! This module handles:
//! - Gamepad detection and sampling via evdev
//! - Circular dead zone normalization of the left stick
//! - Held / pressed-edge button events
//! - The button binding table

pub mod bindings;
pub mod buttons;
pub mod deadzone;
pub mod gamepad;
pub mod sample;
