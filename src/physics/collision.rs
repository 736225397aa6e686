//! Circle-vs-AABB collision resolution
//!
//! All contacts use the closest point on the rectangle to the ball center.
//! The axis with the larger offset from that point is the contact axis; the
//! ball is placed `radius + EPSILON` outside the struck face and the velocity
//! component on that axis is turned away from it. When the center is inside
//! the rectangle the nearest face wins.

use super::types::{Ball, Bounds, Rect};

/// Extra clearance left between a resolved ball and the struck face
pub const EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Left,
    Right,
    Top,
    Bottom,
}

/// Closest point of `rect` to `(px, py)`
pub fn closest_point(rect: &Rect, px: f64, py: f64) -> (f64, f64) {
    (px.clamp(rect.x, rect.right()), py.clamp(rect.y, rect.bottom()))
}

/// Distance from `(px, py)` to `rect`; 0 inside.
pub fn distance_to_rect(rect: &Rect, px: f64, py: f64) -> f64 {
    let (cx, cy) = closest_point(rect, px, py);
    (px - cx).hypot(py - cy)
}

pub fn circle_overlaps_rect(ball: &Ball, rect: &Rect) -> bool {
    let (cx, cy) = closest_point(rect, ball.x, ball.y);
    let (dx, dy) = (ball.x - cx, ball.y - cy);
    dx * dx + dy * dy < ball.radius * ball.radius
}

/// Push the ball out of `rect` and reflect it; returns the struck face.
pub fn resolve_circle_rect(ball: &mut Ball, rect: &Rect) -> Option<Face> {
    if !circle_overlaps_rect(ball, rect) {
        return None;
    }

    let (cx, cy) = closest_point(rect, ball.x, ball.y);
    let (dx, dy) = (ball.x - cx, ball.y - cy);

    let face = if dx == 0.0 && dy == 0.0 {
        nearest_face(rect, ball.x, ball.y)
    } else if dx.abs() >= dy.abs() {
        if dx > 0.0 {
            Face::Right
        } else {
            Face::Left
        }
    } else if dy > 0.0 {
        Face::Bottom
    } else {
        Face::Top
    };

    let clearance = ball.radius + EPSILON;
    match face {
        Face::Left => {
            ball.x = rect.x - clearance;
            ball.vx = -ball.vx.abs();
        }
        Face::Right => {
            ball.x = rect.right() + clearance;
            ball.vx = ball.vx.abs();
        }
        Face::Top => {
            ball.y = rect.y - clearance;
            ball.vy = -ball.vy.abs();
        }
        Face::Bottom => {
            ball.y = rect.bottom() + clearance;
            ball.vy = ball.vy.abs();
        }
    }
    Some(face)
}

fn nearest_face(rect: &Rect, px: f64, py: f64) -> Face {
    let candidates = [
        (px - rect.x, Face::Left),
        (rect.right() - px, Face::Right),
        (py - rect.y, Face::Top),
        (rect.bottom() - py, Face::Bottom),
    ];
    candidates
        .iter()
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, face)| *face)
        .unwrap_or(Face::Top)
}

/// Keep the ball inside the world, reflecting the violated components.
///
/// Returns true if any wall was touched. A ball larger than the world is
/// centered on the offending axis.
pub fn resolve_world_bounds(ball: &mut Ball, bounds: &Bounds) -> bool {
    let r = ball.radius;
    let mut touched = false;

    if bounds.w <= 2.0 * r {
        ball.x = bounds.x + bounds.w / 2.0;
    } else if ball.x < bounds.x + r {
        ball.x = bounds.x + r;
        ball.vx = ball.vx.abs();
        touched = true;
    } else if ball.x > bounds.right() - r {
        ball.x = bounds.right() - r;
        ball.vx = -ball.vx.abs();
        touched = true;
    }

    if bounds.h <= 2.0 * r {
        ball.y = bounds.y + bounds.h / 2.0;
    } else if ball.y < bounds.y + r {
        ball.y = bounds.y + r;
        ball.vy = ball.vy.abs();
        touched = true;
    } else if ball.y > bounds.bottom() - r {
        ball.y = bounds.bottom() - r;
        ball.vy = -ball.vy.abs();
        touched = true;
    }

    touched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball(x: f64, y: f64, vx: f64, vy: f64) -> Ball {
        Ball {
            x,
            y,
            vx,
            vy,
            radius: 10.0,
            spawn_time: 0.0,
            flight_end: 1.0,
        }
    }

    #[test]
    fn test_no_contact() {
        let rect = Rect::new(100.0, 100.0, 50.0, 20.0);
        let mut b = ball(50.0, 50.0, 1.0, 1.0);
        assert_eq!(resolve_circle_rect(&mut b, &rect), None);
        assert_eq!(b.x, 50.0);
    }

    #[test]
    fn test_top_face_contact_reflects_vy() {
        let rect = Rect::new(100.0, 100.0, 50.0, 20.0);
        let mut b = ball(120.0, 95.0, 2.0, 5.0);
        assert_eq!(resolve_circle_rect(&mut b, &rect), Some(Face::Top));
        assert_eq!(b.vy, -5.0);
        assert_eq!(b.vx, 2.0);
        assert!(distance_to_rect(&rect, b.x, b.y) >= b.radius);
    }

    #[test]
    fn test_side_contact_reflects_vx() {
        let rect = Rect::new(100.0, 100.0, 4.0, 80.0);
        let mut b = ball(109.0, 140.0, -6.0, 1.0);
        assert_eq!(resolve_circle_rect(&mut b, &rect), Some(Face::Right));
        assert_eq!(b.vx, 6.0);
        assert!(distance_to_rect(&rect, b.x, b.y) >= b.radius);
    }

    #[test]
    fn test_center_inside_uses_nearest_face() {
        let rect = Rect::new(0.0, 0.0, 100.0, 40.0);
        let mut b = ball(50.0, 37.0, 0.0, -3.0);
        assert_eq!(resolve_circle_rect(&mut b, &rect), Some(Face::Bottom));
        assert_eq!(b.vy, 3.0);
        assert!((b.y - (40.0 + 10.0 + EPSILON)).abs() < 1e-12);
    }

    #[test]
    fn test_corner_contact_clears_radius() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let mut b = ball(16.0, 14.0, -1.0, -1.0);
        assert!(resolve_circle_rect(&mut b, &rect).is_some());
        assert!(distance_to_rect(&rect, b.x, b.y) >= b.radius);
    }

    #[test]
    fn test_world_bounds_clamp_and_reflect() {
        let bounds = Bounds::new(0.0, 0.0, 200.0, 100.0);
        let mut b = ball(-5.0, 95.0, -3.0, 4.0);
        assert!(resolve_world_bounds(&mut b, &bounds));
        assert_eq!((b.x, b.y), (10.0, 90.0));
        assert_eq!((b.vx, b.vy), (3.0, -4.0));
    }

    #[test]
    fn test_world_smaller_than_ball_centers() {
        let bounds = Bounds::new(0.0, 0.0, 1.0, 1.0);
        let mut b = ball(30.0, -30.0, 3.0, 3.0);
        resolve_world_bounds(&mut b, &bounds);
        assert_eq!((b.x, b.y), (0.5, 0.5));
    }
}
