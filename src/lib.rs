//! # XBox Stage Library
//!
//! Drive a two-axis linear stage with a gamepad.
//!
//! This library provides the core of the stage controller: dead zone
//! normalization of the left stick, button edge detection and bindings, the
//! per-axis connection state machine, and the fixed-period polling loop that
//! ties them together.

pub mod config;
pub mod controller;
pub mod error;
pub mod scheduler;
pub mod settings;
pub mod stage;
