//! Launch velocity math
//!
//! A launch turns a drag vector into a ball velocity whose magnitude is tied
//! to the music: at speed factor 1 and multiplier 1 the ball crosses the
//! world diagonal in exactly one bar at the reference frame rate.
//!
//! ```text
//! base_speed = world_diagonal / (fps * bar_length)      px per frame
//! |v|        = base_speed * speed_factor * multiplier
//! ```
//!
//! The base speed is captured once, at the first layout, so resizing a toy
//! later does not change its musical timing.

use super::types::{Bounds, LaunchVector};
use crate::config::{MAX_SPEED_FACTOR, MIN_SPEED_FACTOR};

/// Drags shorter than this launch straight up
pub const MIN_DRAG: f64 = 4.0;

/// Musical baseline speed in px per reference frame.
///
/// # Example
/// ```
/// use bouncer::physics::{base_speed, Bounds};
///
/// // 800x600 world has a 1000px diagonal; 60fps and a 2s bar give 1000/120
/// let speed = base_speed(&Bounds::new(0.0, 0.0, 800.0, 600.0), 60.0, 2.0);
/// assert!((speed - 1000.0 / 120.0).abs() < 1e-9);
/// ```
pub fn base_speed(bounds: &Bounds, fps: f64, bar_length: f64) -> f64 {
    let bounds = bounds.sanitized();
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { 60.0 };
    let bar_length = if bar_length.is_finite() && bar_length > 0.0 { bar_length } else { 2.0 };
    bounds.diagonal() / (fps * bar_length)
}

/// Clamp a user speed factor into `[0.2, 1.6]`; NaN means 1.
pub fn clamp_speed_factor(factor: f64) -> f64 {
    if factor.is_finite() {
        factor.clamp(MIN_SPEED_FACTOR, MAX_SPEED_FACTOR)
    } else {
        1.0
    }
}

/// Unit launch direction for a drag; straight up for short or invalid drags.
pub fn launch_direction(dx: f64, dy: f64) -> (f64, f64) {
    let len = dx.hypot(dy);
    if !len.is_finite() || len < MIN_DRAG {
        (0.0, -1.0)
    } else {
        (dx / len, dy / len)
    }
}

/// Final launch velocity for a drag vector.
pub fn launch_velocity(dx: f64, dy: f64, base_speed: f64, speed_factor: f64, multiplier: f64) -> LaunchVector {
    let (ux, uy) = launch_direction(dx, dy);
    let speed = base_speed * clamp_speed_factor(speed_factor) * multiplier;
    let speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };
    LaunchVector {
        vx: ux * speed,
        vy: uy * speed,
    }
}

/// Scale `(vx, vy)` down so its magnitude is at most `max_speed`.
pub fn cap_speed(vx: f64, vy: f64, max_speed: f64) -> (f64, f64) {
    let speed = vx.hypot(vy);
    if speed > max_speed && speed > 0.0 {
        let k = max_speed / speed;
        (vx * k, vy * k)
    } else {
        (vx, vy)
    }
}
