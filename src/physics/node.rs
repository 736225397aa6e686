//! One toy's simulation: world, ball, blocks, edge controllers and anchor.

use super::collision::{resolve_circle_rect, resolve_world_bounds};
use super::launch::{base_speed, cap_speed, clamp_speed_factor, launch_velocity};
use super::types::*;
use crate::chain::ChainLinks;
use crate::config::ToyConfig;
use crate::notes::{note_name, MAX_NOTE_INDEX};
use crate::transport::{LoopInfo, TransportClock};

pub type NodeId = String;

/// Largest frame delta the physics will integrate
pub const MAX_DT: f64 = 0.04;
/// Sub-step length as a fraction of the ball radius
pub const SUBSTEP_FRACTION: f64 = 0.4;
/// Upper bound on sub-steps per frame
pub const MAX_SUBSTEPS: usize = 1 << 17;
pub const FLASH_DECAY: f64 = 0.88;
pub const MAX_QUANT_DIVISOR: u32 = 16;
pub const DEFAULT_INSTRUMENT: &str = "tone";

/// Default notes for the left, right, top and bottom edges
const EDGE_NOTES: [usize; 4] = [0, 2, 4, 7];

/// What an activation did with the node's ball
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    AlreadyFlying,
    Launched,
    RelaunchPending,
    Ghost,
}

/// Number of equal sub-steps needed so no axis moves more than `0.4 * radius`.
///
/// Capped at [`MAX_SUBSTEPS`].
pub fn substep_count(dx: f64, dy: f64, radius: f64) -> usize {
    let reach = radius * SUBSTEP_FRACTION;
    let steps = (dx.abs().max(dy.abs()) / reach).ceil();
    if steps.is_finite() && steps >= 1.0 {
        steps.min(MAX_SUBSTEPS as f64) as usize
    } else if steps.is_infinite() {
        MAX_SUBSTEPS
    } else {
        1
    }
}

fn refractory_elapsed(last_hit_time: Option<f64>, now: f64, refractory: f64) -> bool {
    last_hit_time.map_or(true, |t| (now - t).abs() >= refractory)
}

/// A single bouncing-ball toy
#[derive(Debug, Clone)]
pub struct PhysicsNode {
    pub(crate) id: NodeId,
    pub(crate) config: ToyConfig,
    pub(crate) bounds: Bounds,
    pub(crate) ball: Option<BallState>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) edges: [EdgeController; 4],
    pub(crate) handle: Handle,
    pub(crate) last_launch: Option<LaunchVector>,
    pub(crate) next_launch_at: Option<f64>,
    pub(crate) speed_factor: f64,
    pub(crate) quant_divisor: u32,
    pub(crate) instrument_id: String,
    pub(crate) steps: StepTrack,
    pub(crate) chain: ChainLinks,
    pub(crate) base_speed: Option<f64>,
    pub(crate) last_step_time: Option<f64>,
}

impl PhysicsNode {
    /// A node with the default 800x600 world; call [`layout`](Self::layout) with the real bounds.
    pub fn new(id: impl Into<NodeId>, config: &ToyConfig) -> Self {
        let bounds = Bounds::default();
        let thickness = config.edge_thickness.max(1.0);
        let edges = Edge::ALL.map(|edge| EdgeController::along(edge, &bounds, thickness, EDGE_NOTES[edge.index()]));
        let slots = (config.beats_per_bar * config.steps_per_beat) as usize;

        Self {
            id: id.into(),
            config: config.clone(),
            bounds,
            ball: None,
            blocks: Vec::new(),
            edges,
            handle: default_handle(&bounds),
            last_launch: None,
            next_launch_at: None,
            speed_factor: clamp_speed_factor(config.speed_factor),
            quant_divisor: config.quant_divisor.min(MAX_QUANT_DIVISOR),
            instrument_id: DEFAULT_INSTRUMENT.to_string(),
            steps: StepTrack::new(slots),
            chain: ChainLinks::default(),
            base_speed: None,
            last_step_time: None,
        }
    }

    /// Place the world. The first layout seeds the default blocks and
    /// captures the musical base speed; later layouts only move geometry.
    pub fn layout(&mut self, bounds: Bounds, bar_length: f64) {
        let bounds = bounds.sanitized();
        self.bounds = bounds;

        let thickness = self.config.edge_thickness.max(1.0);
        for edge in self.edges.iter_mut() {
            let placed = EdgeController::along(edge.edge, &bounds, thickness, edge.note_index);
            edge.x = placed.x;
            edge.y = placed.y;
            edge.w = placed.w;
            edge.h = placed.h;
        }

        if self.base_speed.is_none() {
            if self.blocks.is_empty() {
                self.blocks = default_blocks(&bounds, self.config.block_count);
            }
            let speed = base_speed(&bounds, self.config.fps, bar_length);
            tracing::debug!("{}: base speed {:.3} px/frame", self.id, speed);
            self.base_speed = Some(speed);
        }

        if self.handle.user_placed {
            let (x, y) = bounds.clamp_point(self.handle.x, self.handle.y);
            self.handle.x = x;
            self.handle.y = y;
        } else {
            let placed = default_handle(&bounds);
            self.handle.x = placed.x;
            self.handle.y = placed.y;
        }
    }

    /// Advance the simulation to `now`.
    ///
    /// Expires the ball at its flight end, relaunches when a scheduled launch
    /// time has arrived, then moves the ball in sub-steps, resolving world,
    /// edge and block contacts in that order. Never fails: degenerate input
    /// produces an empty report.
    pub fn step(&mut self, now: f64, transport: &TransportClock) -> StepReport {
        let mut report = StepReport::default();
        if !now.is_finite() {
            return report;
        }

        let dt = self.last_step_time.map_or(0.0, |last| {
            let dt = now - last;
            if dt.is_finite() {
                dt.clamp(0.0, MAX_DT)
            } else {
                0.0
            }
        });
        self.last_step_time = Some(now);
        self.decay_flashes();

        let info = transport.loop_info(now);

        if let Some(ball) = self.ball {
            if now >= ball.flight_end() {
                self.ball = None;
                report.expired = Some(ball);
                // Linked nodes wait for the chain coordinator
                if !self.chain.is_linked() {
                    self.schedule_relaunch(ball.flight_end(), &info);
                }
            }
        }

        if self.ball.is_none() {
            if let Some(at) = self.next_launch_at {
                if at <= now {
                    self.next_launch_at = None;
                    if let Some(velocity) = self.last_launch {
                        self.spawn_real(velocity, at.max(now - MAX_DT), info.bar_length);
                        report.launched = true;
                    }
                }
            }
        }

        if let Some(BallState::Real(mut ball)) = self.ball {
            report.substeps = self.integrate(&mut ball, dt, now, &mut report.hits);
            self.ball = Some(BallState::Real(ball));
        }

        report
    }

    /// Queue a relaunch on the first bar boundary at or after `flight_end`.
    pub(crate) fn schedule_relaunch(&mut self, flight_end: f64, info: &LoopInfo) {
        if self.last_launch.is_some() {
            self.next_launch_at = Some(info.next_bar_start(flight_end));
        }
    }

    fn integrate(&mut self, ball: &mut Ball, dt: f64, now: f64, hits: &mut Vec<HitEvent>) -> usize {
        let frames = dt * self.config.fps;
        if !frames.is_finite() || frames <= 0.0 {
            return 0;
        }

        let (vx, vy) = cap_speed(ball.vx, ball.vy, self.config.max_speed);
        ball.vx = vx;
        ball.vy = vy;

        let steps = substep_count(ball.vx * frames, ball.vy * frames, ball.radius);
        let share = frames / steps as f64;
        for _ in 0..steps {
            ball.x += ball.vx * share;
            ball.y += ball.vy * share;
            self.resolve_contacts(ball, now, hits);
        }

        ball.vx *= self.config.damping;
        ball.vy *= self.config.damping;
        steps
    }

    /// Resolve one sub-step: world bounds, then edges, then blocks in array order.
    pub(crate) fn resolve_contacts(&mut self, ball: &mut Ball, now: f64, hits: &mut Vec<HitEvent>) {
        resolve_world_bounds(ball, &self.bounds);
        let refractory = self.config.refractory;

        for edge in self.edges.iter_mut() {
            if resolve_circle_rect(ball, &edge.rect()).is_none() {
                continue;
            }
            edge.flash = 1.0;
            if edge.active && refractory_elapsed(edge.last_hit_time, now, refractory) {
                edge.last_hit_time = Some(now);
                hits.push(HitEvent {
                    source: HitSource::Edge(edge.edge),
                    note_index: edge.note_index,
                    time: now,
                });
            }
        }

        for (i, block) in self.blocks.iter_mut().enumerate() {
            if resolve_circle_rect(ball, &block.rect()).is_none() {
                continue;
            }
            block.flash = 1.0;
            if block.active && refractory_elapsed(block.last_hit_time, now, refractory) {
                block.last_hit_time = Some(now);
                hits.push(HitEvent {
                    source: HitSource::Block(i),
                    note_index: block.note_index,
                    time: now,
                });
            }
        }
    }

    fn decay_flashes(&mut self) {
        let decay = |flash: &mut f64| {
            *flash *= FLASH_DECAY;
            if *flash < 0.01 {
                *flash = 0.0;
            }
        };
        self.blocks.iter_mut().for_each(|b| decay(&mut b.flash));
        self.edges.iter_mut().for_each(|e| decay(&mut e.flash));
    }

    fn spawn_real(&mut self, velocity: LaunchVector, at: f64, bar_length: f64) {
        let (vx, vy) = cap_speed(velocity.vx, velocity.vy, self.config.max_speed);
        self.ball = Some(BallState::Real(Ball {
            x: self.handle.x,
            y: self.handle.y,
            vx,
            vy,
            radius: self.config.ball_radius,
            spawn_time: at,
            flight_end: at + self.config.bars_per_life * bar_length,
        }));
    }

    fn current_base_speed(&mut self, bar_length: f64) -> f64 {
        match self.base_speed {
            Some(speed) => speed,
            None => {
                let speed = base_speed(&self.bounds, self.config.fps, bar_length);
                self.base_speed = Some(speed);
                speed
            }
        }
    }

    /// Velocity a drag of `(dx, dy)` would launch with.
    pub fn launch_vector(&mut self, dx: f64, dy: f64, bar_length: f64) -> LaunchVector {
        let base = self.current_base_speed(bar_length);
        launch_velocity(dx, dy, base, self.speed_factor, self.config.presentation_multiplier)
    }

    // ----- Chain activation -----

    /// Take the chain's turn at time `at`.
    ///
    /// A user-placed anchor launches a real ball immediately; a node with
    /// launch history relaunches through the normal step logic; an untouched
    /// node holds the turn with a ghost ball for `bars_per_life` bars.
    pub fn activate(&mut self, at: f64, transport: &TransportClock) -> Activation {
        self.chain.is_active = true;
        if self.ball.is_some() {
            return Activation::AlreadyFlying;
        }

        let bar_length = transport.loop_info(at).bar_length;
        if self.handle.user_placed {
            let velocity = match self.last_launch {
                Some(v) => v,
                None => {
                    let from_handle = LaunchVector {
                        vx: self.handle.vx,
                        vy: self.handle.vy,
                    };
                    if from_handle.is_zero() {
                        self.launch_vector(0.0, 0.0, bar_length)
                    } else {
                        from_handle
                    }
                }
            };
            self.last_launch = Some(velocity);
            self.spawn_real(velocity, at, bar_length);
            Activation::Launched
        } else if self.last_launch.is_some() {
            self.next_launch_at = Some(at);
            Activation::RelaunchPending
        } else {
            self.ball = Some(BallState::Ghost(GhostBall {
                spawn_time: at,
                flight_end: at + self.config.bars_per_life * bar_length,
            }));
            Activation::Ghost
        }
    }

    /// Give up the chain's turn; any ball or pending relaunch is dropped.
    pub fn deactivate(&mut self) {
        self.chain.is_active = false;
        self.ball = None;
        self.next_launch_at = None;
    }

    // ----- Command API -----

    pub fn place_anchor(&mut self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            tracing::debug!("{}: ignoring non-finite anchor position", self.id);
            return;
        }
        let (x, y) = self.bounds.clamp_point(x, y);
        self.handle.x = x;
        self.handle.y = y;
        self.handle.user_placed = true;
    }

    pub fn set_anchor_velocity(&mut self, vx: f64, vy: f64) {
        if !vx.is_finite() || !vy.is_finite() {
            tracing::debug!("{}: ignoring non-finite anchor velocity", self.id);
            return;
        }
        let (vx, vy) = cap_speed(vx, vy, self.config.max_speed);
        self.handle.vx = vx;
        self.handle.vy = vy;
    }

    /// Release a drag of `(dx, dy)` from the anchor: launch now and remember the shot.
    ///
    /// A chain member without the turn only stores the shot; it is played
    /// when the turn arrives.
    pub fn launch(&mut self, dx: f64, dy: f64, now: f64, transport: &TransportClock) {
        if !now.is_finite() {
            return;
        }
        let bar_length = transport.loop_info(now).bar_length;
        let velocity = self.launch_vector(dx, dy, bar_length);
        self.handle.vx = velocity.vx;
        self.handle.vy = velocity.vy;
        self.last_launch = Some(velocity);
        if !self.chain.is_active {
            tracing::debug!("{}: shot stored until the chain's turn", self.id);
            return;
        }
        self.next_launch_at = None;
        self.spawn_real(velocity, now, bar_length);
        tracing::debug!("{}: launched at ({:.2}, {:.2})", self.id, velocity.vx, velocity.vy);
    }

    pub fn toggle_block_active(&mut self, index: usize) {
        match self.blocks.get_mut(index) {
            Some(block) => block.active = !block.active,
            None => tracing::debug!("{}: no block {}", self.id, index),
        }
    }

    pub fn set_block_note(&mut self, index: usize, note_index: usize) {
        match self.blocks.get_mut(index) {
            Some(block) => block.note_index = note_index.min(MAX_NOTE_INDEX),
            None => tracing::debug!("{}: no block {}", self.id, index),
        }
    }

    /// Move a block, keeping it inside the world.
    pub fn move_block(&mut self, index: usize, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        let bounds = self.bounds;
        match self.blocks.get_mut(index) {
            Some(block) => {
                block.x = x.clamp(bounds.x, (bounds.right() - block.w).max(bounds.x));
                block.y = y.clamp(bounds.y, (bounds.bottom() - block.h).max(bounds.y));
            }
            None => tracing::debug!("{}: no block {}", self.id, index),
        }
    }

    pub fn set_edge_active(&mut self, edge: Edge, active: bool) {
        self.edges[edge.index()].active = active;
    }

    pub fn set_edge_note(&mut self, edge: Edge, note_index: usize) {
        self.edges[edge.index()].note_index = note_index.min(MAX_NOTE_INDEX);
    }

    pub fn set_quant_divisor(&mut self, divisor: u32) {
        self.quant_divisor = divisor.min(MAX_QUANT_DIVISOR);
    }

    /// Change the speed factor; the remembered shot is rescaled with it.
    pub fn set_speed_factor(&mut self, factor: f64) {
        if !factor.is_finite() {
            tracing::debug!("{}: ignoring non-finite speed factor", self.id);
            return;
        }
        let factor = clamp_speed_factor(factor);
        if let Some(launch) = self.last_launch.as_mut() {
            let k = factor / self.speed_factor;
            launch.vx *= k;
            launch.vy *= k;
        }
        self.speed_factor = factor;
    }

    pub fn set_step(&mut self, slot: usize, note_index: Option<usize>) {
        match self.steps.slots.get_mut(slot) {
            Some(entry) => *entry = note_index.map(|n| n.min(MAX_NOTE_INDEX)),
            None => tracing::debug!("{}: no step slot {}", self.id, slot),
        }
    }

    pub fn set_instrument(&mut self, instrument_id: impl Into<String>) {
        self.instrument_id = instrument_id.into();
    }

    /// Clear the ball, launch history and hit state; geometry and notes stay.
    pub fn reset(&mut self) {
        self.ball = None;
        self.last_launch = None;
        self.next_launch_at = None;
        self.last_step_time = None;
        self.handle = default_handle(&self.bounds);
        for block in self.blocks.iter_mut() {
            block.flash = 0.0;
            block.last_hit_time = None;
        }
        for edge in self.edges.iter_mut() {
            edge.flash = 0.0;
            edge.last_hit_time = None;
        }
    }

    // ----- Accessors -----

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ToyConfig {
        &self.config
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn ball(&self) -> Option<&BallState> {
        self.ball.as_ref()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn edges(&self) -> &[EdgeController; 4] {
        &self.edges
    }

    pub fn edge(&self, edge: Edge) -> &EdgeController {
        &self.edges[edge.index()]
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn last_launch(&self) -> Option<LaunchVector> {
        self.last_launch
    }

    pub fn next_launch_at(&self) -> Option<f64> {
        self.next_launch_at
    }

    pub fn speed_factor(&self) -> f64 {
        self.speed_factor
    }

    pub fn quant_divisor(&self) -> u32 {
        self.quant_divisor
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn steps(&self) -> &StepTrack {
        &self.steps
    }

    pub fn chain(&self) -> &ChainLinks {
        &self.chain
    }

    pub fn is_active(&self) -> bool {
        self.chain.is_active
    }

    pub fn base_speed(&self) -> Option<f64> {
        self.base_speed
    }

    /// Note name for one of this node's note indices
    pub fn note_name(&self, note_index: usize) -> String {
        note_name(note_index, self.config.root_note, self.config.scale)
    }

    /// Filled step slots with their note names
    pub fn slot_notes(&self) -> Vec<(usize, String)> {
        self.steps
            .filled()
            .map(|(slot, note)| (slot, self.note_name(note)))
            .collect()
    }
}

fn default_handle(bounds: &Bounds) -> Handle {
    Handle {
        x: bounds.x + bounds.w / 2.0,
        y: bounds.y + bounds.h * 0.8,
        vx: 0.0,
        vy: 0.0,
        user_placed: false,
    }
}

/// A row of `count` square blocks across the upper half of the world
fn default_blocks(bounds: &Bounds, count: usize) -> Vec<Block> {
    let size = (bounds.w.min(bounds.h) * 0.08).max(1.0);
    let y = bounds.y + bounds.h * 0.4 - size / 2.0;
    (0..count)
        .map(|i| {
            let cx = bounds.x + bounds.w * (i + 1) as f64 / (count + 1) as f64;
            Block::new(cx - size / 2.0, y, size, size, i)
        })
        .collect()
}
