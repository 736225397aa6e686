//! # Physics Node
//!
//! One toy: a rectangular world with a ball, a row of movable note blocks,
//! four edge controllers and a spawn anchor. The host drives it by calling
//! [`PhysicsNode::step`] once per frame; the node reports the note-producing
//! hits and leaves quantization to the scheduler.
//!
//! ## Ball lifecycle
//! ```text
//! absent -> flying -> expired -> relaunched (standalone)
//!                             -> handed off (chain)
//! ```
//! A ball lives for `bars_per_life` bars. A standalone node with launch
//! history replays its last shot on the next bar boundary, so a single drag
//! becomes a loop.
//!
//! ## Sub-stepping
//! A frame's displacement is split into equal sub-steps of at most
//! `0.4 * radius` per axis; every sub-step re-tests the world bounds, the
//! edges and the blocks. A fast ball cannot skip over a thin block.
//!
//! ## Architecture
//! - `types.rs` - Plain data records (ball, blocks, edges, handle)
//! - `collision.rs` - Circle-vs-rectangle resolution
//! - `launch.rs` - Drag-to-velocity math tied to bar length
//! - `node.rs` - The node itself: step, commands, chain activation

mod collision;
mod launch;
mod node;
mod types;

#[cfg(test)]
mod tests;

pub use collision::{circle_overlaps_rect, distance_to_rect, resolve_circle_rect, resolve_world_bounds, Face, EPSILON};
pub use launch::{base_speed, cap_speed, clamp_speed_factor, launch_direction, launch_velocity, MIN_DRAG};
pub use node::{substep_count, Activation, NodeId, PhysicsNode, DEFAULT_INSTRUMENT, FLASH_DECAY, MAX_DT, MAX_QUANT_DIVISOR, MAX_SUBSTEPS, SUBSTEP_FRACTION};
pub use types::{
    Ball, BallState, Block, Bounds, Edge, EdgeController, GhostBall, Handle, HitEvent, HitSource, LaunchVector, Rect,
    StepReport, StepTrack,
};
