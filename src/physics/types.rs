//! Physics data type definitions
//!
//! Plain records for the world, the ball, the note blocks and the four edge
//! controllers. Everything here is serializable so a node can be snapshotted.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }
}

/// World bounds of one toy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, w: 800.0, h: 600.0 }
    }
}

impl Bounds {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Replace degenerate geometry with a 1x1 world at the origin offset.
    pub fn sanitized(self) -> Self {
        let x = if self.x.is_finite() { self.x } else { 0.0 };
        let y = if self.y.is_finite() { self.y } else { 0.0 };
        let w = if self.w.is_finite() && self.w >= 1.0 { self.w } else { 1.0 };
        let h = if self.h.is_finite() && self.h >= 1.0 { self.h } else { 1.0 };
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn diagonal(&self) -> f64 {
        self.w.hypot(self.h)
    }

    /// Clamp a point into the bounds.
    pub fn clamp_point(&self, px: f64, py: f64) -> (f64, f64) {
        (px.clamp(self.x, self.right()), py.clamp(self.y, self.bottom()))
    }
}

/// A flying, colliding ball
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    /// Velocity in px per reference frame
    pub vx: f64,
    pub vy: f64,
    pub radius: f64,
    pub spawn_time: f64,
    pub flight_end: f64,
}

impl Ball {
    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.vx, self.vy, self.radius, self.spawn_time, self.flight_end]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Silent placeholder that only holds a chain's timing slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostBall {
    pub spawn_time: f64,
    pub flight_end: f64,
}

/// The ball of a node, if any
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BallState {
    Real(Ball),
    Ghost(GhostBall),
}

impl BallState {
    pub fn spawn_time(&self) -> f64 {
        match self {
            BallState::Real(ball) => ball.spawn_time,
            BallState::Ghost(ghost) => ghost.spawn_time,
        }
    }

    pub fn flight_end(&self) -> f64 {
        match self {
            BallState::Real(ball) => ball.flight_end,
            BallState::Ghost(ghost) => ghost.flight_end,
        }
    }

    pub fn is_ghost(&self) -> bool {
        matches!(self, BallState::Ghost(_))
    }

    pub fn as_real(&self) -> Option<&Ball> {
        match self {
            BallState::Real(ball) => Some(ball),
            BallState::Ghost(_) => None,
        }
    }
}

/// A movable note block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub note_index: usize,
    /// Inactive blocks still collide but stay silent
    pub active: bool,
    pub flash: f64,
    pub last_hit_time: Option<f64>,
}

impl Block {
    pub fn new(x: f64, y: f64, w: f64, h: f64, note_index: usize) -> Self {
        Self {
            x,
            y,
            w,
            h,
            note_index,
            active: true,
            flash: 0.0,
            last_hit_time: None,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }
}

/// Side of the world an edge controller sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Left, Edge::Right, Edge::Top, Edge::Bottom];

    pub fn index(self) -> usize {
        match self {
            Edge::Left => 0,
            Edge::Right => 1,
            Edge::Top => 2,
            Edge::Bottom => 3,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Edge::Left),
            "right" => Some(Edge::Right),
            "top" => Some(Edge::Top),
            "bottom" => Some(Edge::Bottom),
            _ => None,
        }
    }
}

/// Fixed note emitter along one side of the world
///
/// Always collidable; `active == false` only mutes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeController {
    pub edge: Edge,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub note_index: usize,
    pub active: bool,
    pub flash: f64,
    pub last_hit_time: Option<f64>,
}

impl EdgeController {
    /// Controller strip of `thickness` along `edge` inside `bounds`.
    pub fn along(edge: Edge, bounds: &Bounds, thickness: f64, note_index: usize) -> Self {
        let t = thickness.min(bounds.w).min(bounds.h);
        let (x, y, w, h) = match edge {
            Edge::Left => (bounds.x, bounds.y, t, bounds.h),
            Edge::Right => (bounds.right() - t, bounds.y, t, bounds.h),
            Edge::Top => (bounds.x, bounds.y, bounds.w, t),
            Edge::Bottom => (bounds.x, bounds.bottom() - t, bounds.w, t),
        };
        Self {
            edge,
            x,
            y,
            w,
            h,
            note_index,
            active: true,
            flash: 0.0,
            last_hit_time: None,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }
}

/// Spawn anchor the ball launches from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handle {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    /// Set once the user has placed the anchor
    pub user_placed: bool,
}

/// Velocity of the last launch, replayed on relaunch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaunchVector {
    pub vx: f64,
    pub vy: f64,
}

impl LaunchVector {
    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    pub fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0
    }
}

/// One note slot per transport step of a bar
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepTrack {
    pub slots: Vec<Option<usize>>,
}

impl StepTrack {
    pub fn new(len: usize) -> Self {
        Self { slots: vec![None; len] }
    }

    /// `(slot, note_index)` for every filled slot
    pub fn filled(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, note)| note.map(|n| (slot, n)))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

/// What was struck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum HitSource {
    Block(usize),
    Edge(Edge),
}

/// A note-producing collision
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitEvent {
    pub source: HitSource,
    pub note_index: usize,
    pub time: f64,
}

/// What happened during one `step`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub hits: Vec<HitEvent>,
    /// A ball was (re)launched this step
    pub launched: bool,
    /// The ball reached its flight end this step
    pub expired: Option<BallState>,
    /// Sub-steps taken by the real ball
    pub substeps: usize,
}
