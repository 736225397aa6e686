//! # Snapshots
//!
//! `get_state`/`set_state` expose a node as a plain serializable record, the
//! persistence layer stores it as JSON or YAML. Restoring never trusts the
//! record: non-finite geometry is dropped, notes and factors are clamped, and
//! edge controllers are matched by their `edge` field rather than position.
//!
//! A [`StageSnapshot`] bundles the tempo with every node's bounds and state.

use crate::chain::ChainLinks;
use crate::config::{MAX_BALL_RADIUS, MIN_BALL_RADIUS};
use crate::error::BouncerError;
use crate::notes::MAX_NOTE_INDEX;
use crate::physics::{
    clamp_speed_factor, BallState, Block, Bounds, EdgeController, Handle, LaunchVector, NodeId, PhysicsNode, StepTrack,
    DEFAULT_INSTRUMENT, MAX_QUANT_DIVISOR,
};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

fn default_instrument() -> String {
    DEFAULT_INSTRUMENT.to_string()
}

/// Serializable state of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    pub ball: Option<BallState>,
    pub blocks: Vec<Block>,
    pub edge_controllers: Vec<EdgeController>,
    pub handle: Handle,
    pub last_launch: Option<LaunchVector>,
    pub speed_factor: f64,
    pub quant_divisor: u32,
    pub chain_links: ChainLinks,
    #[serde(default)]
    pub steps: StepTrack,
    #[serde(default = "default_instrument")]
    pub instrument_id: String,
}

impl NodeState {
    pub fn to_json(&self) -> Result<String, BouncerError> {
        serde_json::to_string_pretty(self).map_err(|e| BouncerError::SnapshotError(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, BouncerError> {
        serde_json::from_str(json).map_err(|e| BouncerError::SnapshotError(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, BouncerError> {
        serde_yaml::to_string(self).map_err(|e| BouncerError::SnapshotError(e.to_string()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, BouncerError> {
        serde_yaml::from_str(yaml).map_err(|e| BouncerError::SnapshotError(e.to_string()))
    }
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

fn ball_is_valid(ball: &BallState) -> bool {
    match ball {
        BallState::Real(ball) => ball.is_finite() && ball.radius > 0.0,
        BallState::Ghost(ghost) => all_finite(&[ghost.spawn_time, ghost.flight_end]),
    }
}

fn clamp_radius(mut ball: BallState) -> BallState {
    if let BallState::Real(real) = &mut ball {
        real.radius = real.radius.clamp(MIN_BALL_RADIUS, MAX_BALL_RADIUS);
    }
    ball
}

impl PhysicsNode {
    /// Capture the node as a plain record.
    pub fn get_state(&self) -> NodeState {
        NodeState {
            ball: self.ball,
            blocks: self.blocks.clone(),
            edge_controllers: self.edges.to_vec(),
            handle: self.handle,
            last_launch: self.last_launch,
            speed_factor: self.speed_factor,
            quant_divisor: self.quant_divisor,
            chain_links: self.chain.clone(),
            steps: self.steps.clone(),
            instrument_id: self.instrument_id.clone(),
        }
    }

    /// Restore from a record, sanitizing every value.
    ///
    /// Chain links are copied as-is; a [`Stage`] re-normalizes chains after
    /// restoring all of its nodes.
    pub fn set_state(&mut self, state: NodeState) {
        self.ball = state.ball.filter(ball_is_valid).map(clamp_radius);

        let before = state.blocks.len();
        self.blocks = state
            .blocks
            .into_iter()
            .filter(|b| all_finite(&[b.x, b.y, b.w, b.h, b.flash]) && b.w > 0.0 && b.h > 0.0)
            .map(|mut b| {
                b.note_index = b.note_index.min(MAX_NOTE_INDEX);
                b
            })
            .collect();
        if self.blocks.len() != before {
            tracing::debug!("{}: dropped {} invalid blocks", self.id, before - self.blocks.len());
        }

        for restored in state.edge_controllers {
            if !all_finite(&[restored.x, restored.y, restored.w, restored.h, restored.flash]) {
                continue;
            }
            let slot = &mut self.edges[restored.edge.index()];
            *slot = restored;
            slot.note_index = slot.note_index.min(MAX_NOTE_INDEX);
        }

        let h = state.handle;
        if all_finite(&[h.x, h.y, h.vx, h.vy]) {
            self.handle = h;
        }

        self.last_launch = state.last_launch.filter(|v| all_finite(&[v.vx, v.vy]));
        self.speed_factor = clamp_speed_factor(state.speed_factor);
        self.quant_divisor = state.quant_divisor.min(MAX_QUANT_DIVISOR);
        self.chain = state.chain_links;
        self.instrument_id = state.instrument_id;

        let len = self.steps.slots.len();
        let mut slots = state.steps.slots;
        slots.resize(len, None);
        for note in slots.iter_mut().flatten() {
            *note = (*note).min(MAX_NOTE_INDEX);
        }
        self.steps = StepTrack { slots };

        self.next_launch_at = None;
        self.last_step_time = None;
    }
}

/// One node inside a stage snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub bounds: Bounds,
    pub state: NodeState,
}

/// Tempo plus every node of a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSnapshot {
    pub bpm: f64,
    pub nodes: Vec<NodeSnapshot>,
}

impl StageSnapshot {
    pub fn to_json(&self) -> Result<String, BouncerError> {
        serde_json::to_string_pretty(self).map_err(|e| BouncerError::SnapshotError(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, BouncerError> {
        serde_json::from_str(json).map_err(|e| BouncerError::SnapshotError(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, BouncerError> {
        serde_yaml::to_string(self).map_err(|e| BouncerError::SnapshotError(e.to_string()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, BouncerError> {
        serde_yaml::from_str(yaml).map_err(|e| BouncerError::SnapshotError(e.to_string()))
    }
}

impl Stage {
    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            bpm: self.transport().bpm(),
            nodes: self
                .nodes()
                .map(|node| NodeSnapshot {
                    id: node.id().to_string(),
                    bounds: node.bounds(),
                    state: node.get_state(),
                })
                .collect(),
        }
    }

    /// Restore one node and re-normalize chains around it.
    pub fn set_node_state(&mut self, id: &str, state: NodeState) -> Result<(), BouncerError> {
        self.node_mut(id)?.set_state(state);
        self.normalize_chains();
        Ok(())
    }

    /// Replace every node with the snapshot's nodes.
    pub fn restore(&mut self, snapshot: StageSnapshot, now: f64) -> Result<(), BouncerError> {
        for id in self.node_ids() {
            self.remove_node(&id)?;
        }
        self.set_bpm(snapshot.bpm, now);

        for entry in snapshot.nodes {
            let node = self.add_node(&entry.id, entry.bounds)?;
            node.set_state(entry.state);
        }
        self.normalize_chains();
        tracing::debug!("Restored {} nodes", self.node_ids().len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToyConfig;
    use crate::physics::{Ball, Edge};
    use crate::transport::TransportClock;

    fn idle_node() -> PhysicsNode {
        let mut node = PhysicsNode::new("a", &ToyConfig::default());
        node.layout(Bounds::default(), 2.0);
        node
    }

    #[test]
    fn test_round_trip_idle_node() {
        let mut node = idle_node();
        node.toggle_block_active(1);
        node.set_block_note(3, 11);
        node.move_block(0, 50.0, 60.0);
        node.set_edge_active(Edge::Left, false);
        node.set_edge_note(Edge::Bottom, 5);
        node.place_anchor(123.0, 456.0);

        let state = node.get_state();
        let mut restored = idle_node();
        restored.set_state(state.clone());

        assert_eq!(restored.blocks(), node.blocks());
        assert_eq!(restored.edges(), node.edges());
        assert_eq!(restored.handle(), node.handle());
        assert_eq!(restored.get_state(), state);
    }

    #[test]
    fn test_round_trip_through_json_and_yaml() {
        let mut clock = TransportClock::default();
        clock.start(0.0);
        let mut node = idle_node();
        node.launch(10.0, -40.0, 0.0, &clock);
        node.set_step(2, Some(4));
        let state = node.get_state();

        let json = state.to_json().unwrap();
        assert!(json.contains("\"edgeControllers\""));
        assert!(json.contains("\"kind\": \"real\""));
        assert_eq!(NodeState::from_json(&json).unwrap(), state);

        let yaml = state.to_yaml().unwrap();
        assert_eq!(NodeState::from_yaml(&yaml).unwrap(), state);
    }

    #[test]
    fn test_set_state_sanitizes() {
        let mut node = idle_node();
        let mut state = node.get_state();
        state.blocks[0].x = f64::NAN;
        state.blocks[1].note_index = 999;
        state.speed_factor = 40.0;
        state.quant_divisor = 99;
        state.handle.x = f64::INFINITY;
        state.steps.slots = vec![Some(100); 40];
        state.edge_controllers.reverse();
        state.edge_controllers[0].note_index = 6; // bottom after reversing

        node.set_state(state);
        assert_eq!(node.blocks().len(), 4);
        assert_eq!(node.blocks()[0].note_index, 35);
        assert_eq!(node.speed_factor(), 1.6);
        assert_eq!(node.quant_divisor(), 16);
        assert_eq!(node.handle().x, 400.0);
        assert_eq!(node.steps().slots.len(), 16);
        assert_eq!(node.steps().slots[0], Some(35));
        assert_eq!(node.edge(Edge::Bottom).note_index, 6);
        assert_eq!(node.edges()[0].edge, Edge::Left);
    }

    #[test]
    fn test_set_state_clamps_tiny_radius() {
        let clock = TransportClock::default();
        let mut node = idle_node();
        let mut state = node.get_state();
        state.ball = Some(BallState::Real(Ball {
            x: 400.0,
            y: 300.0,
            vx: 300.0,
            vy: 0.0,
            radius: 1e-3,
            spawn_time: 0.0,
            flight_end: 10.0,
        }));
        node.set_state(state);

        let radius = node.ball().and_then(BallState::as_real).map(|b| b.radius);
        assert_eq!(radius, Some(MIN_BALL_RADIUS));

        // 300 px/frame over 2.4 frames at 0.2 px per sub-step
        node.step(1.0, &clock);
        let report = node.step(1.04, &clock);
        assert!(report.substeps > 0);
        assert!(report.substeps <= 3601, "{} sub-steps", report.substeps);
    }

    #[test]
    fn test_bad_snapshot_is_an_error() {
        let err = NodeState::from_json("{\"ball\": null}").unwrap_err();
        assert!(matches!(err, BouncerError::SnapshotError(_)));
    }

    #[test]
    fn test_stage_restore_keeps_one_active_per_chain() {
        let mut stage = Stage::default();
        for id in ["a", "b", "c"] {
            stage.add_node(id, Bounds::default()).unwrap();
        }
        stage.link("a", "b").unwrap();
        stage.link("b", "c").unwrap();
        let mut snapshot = stage.snapshot();
        for entry in snapshot.nodes.iter_mut() {
            entry.state.chain_links.is_active = true;
        }

        let mut restored = Stage::default();
        restored.add_node("stale", Bounds::default()).unwrap();
        restored.restore(snapshot, 0.0).unwrap();
        assert_eq!(restored.node_ids(), vec!["a", "b", "c"]);
        assert_eq!(restored.nodes().filter(|n| n.is_active()).count(), 1);
        assert!(restored.node("a").unwrap().is_active());
    }
}
