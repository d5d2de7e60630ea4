//! # Dead Zone Module
//!
//! Turns a raw left stick sample into a normalized motion vector.
//!
//! ## Dead Zone
//!
//! A circular dead zone suppresses drift when the stick is nominally
//! centered. Deflections inside the radius produce the zero vector; outside
//! it, the remaining travel up to [`MAX_STICK_MAGNITUDE`] is scaled to 0..1.
//!
//! ## Usage
//!
//! ```
//! use xbox_stage::controller::deadzone::{normalize, LEFT_THUMB_DEAD_ZONE};
//!
//! let input = normalize(20000, 0, LEFT_THUMB_DEAD_ZONE);
//! assert!((input.magnitude - 0.4876).abs() < 0.001);
//! assert_eq!(input.direction_x, 1.0);
//!
//! // Inside the dead zone
//! assert_eq!(normalize(3000, -3000, LEFT_THUMB_DEAD_ZONE).magnitude, 0.0);
//! ```

/// Default left thumbstick dead zone radius (XInput documented value).
pub const LEFT_THUMB_DEAD_ZONE: f64 = 7849.0;

/// Largest stick magnitude considered; deflections beyond it are clipped.
pub const MAX_STICK_MAGNITUDE: f64 = 32767.0;

/// Dead-zone corrected motion vector.
///
/// `direction_x`/`direction_y` form a unit vector (or the zero vector) and
/// `magnitude` lies in 0..=1.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizedInput {
    pub direction_x: f64,
    pub direction_y: f64,
    pub magnitude: f64,
}

impl NormalizedInput {
    /// Zero vector, magnitude 0.
    pub const ZERO: NormalizedInput = NormalizedInput {
        direction_x: 0.0,
        direction_y: 0.0,
        magnitude: 0.0,
    };

    /// Returns true when the stick is at rest.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.magnitude == 0.0
    }
}

/// Applies a circular dead zone to raw stick coordinates.
///
/// # Arguments
///
/// * `x`, `y` - Raw stick coordinates (-32768 to 32767)
/// * `dead_zone_radius` - Radius below which input is ignored
///
/// # Returns
///
/// The zero vector when the raw magnitude is within the dead zone (or zero),
/// otherwise the unit direction `(x, y) / raw` and the rescaled magnitude
/// `(min(raw, 32767) - radius) / (32767 - radius)`.
#[must_use]
pub fn normalize(x: i16, y: i16, dead_zone_radius: f64) -> NormalizedInput {
    let x = f64::from(x);
    let y = f64::from(y);
    let raw = (x * x + y * y).sqrt();

    if raw <= dead_zone_radius || raw == 0.0 || dead_zone_radius >= MAX_STICK_MAGNITUDE {
        return NormalizedInput::ZERO;
    }

    let clipped = raw.min(MAX_STICK_MAGNITUDE);
    let radius = dead_zone_radius.max(0.0);
    let magnitude = ((clipped - radius) / (MAX_STICK_MAGNITUDE - radius)).clamp(0.0, 1.0);

    NormalizedInput {
        direction_x: x / raw,
        direction_y: y / raw,
        magnitude,
    }
}
