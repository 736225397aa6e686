//! # Stage
//!
//! A stage owns one transport, one scheduler, the chain coordinator and every
//! node. The host calls [`Stage::frame`] once per animation frame with the
//! audio clock's current time:
//!
//! 1. nodes step in id order; hits from standalone and chain-active nodes are
//!    quantized and sent to the sink
//! 2. expired balls in chains pass the turn along
//! 3. while the transport runs, step-track slots inside the look-ahead window
//!    are scheduled, including the downbeat of a member whose turn starts at
//!    the next bar
//!
//! Stages are plain values, so tests can run several side by side with
//! independent clocks.

use crate::chain::{chain_members, role_of, ChainCoordinator, ChainRole, Nodes};
use crate::config::ToyConfig;
use crate::error::BouncerError;
use crate::physics::{BallState, Bounds, NodeId, PhysicsNode};
use crate::scheduler::{FireRequest, ScheduledEvent, Scheduler, SlotTrack};
use crate::sink::NoteSink;
use crate::transport::{LoopInfo, TransportClock};
use std::collections::BTreeSet;

/// Slack when comparing a flight end with a bar boundary
const BAR_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct Stage {
    config: ToyConfig,
    transport: TransportClock,
    scheduler: Scheduler,
    chain: ChainCoordinator,
    nodes: Nodes,
}

impl Default for Stage {
    fn default() -> Self {
        Self::new(ToyConfig::default())
    }
}

impl Stage {
    pub fn new(config: ToyConfig) -> Self {
        Self {
            transport: TransportClock::from_config(&config),
            scheduler: Scheduler::from_config(&config),
            chain: ChainCoordinator::new(),
            nodes: Nodes::new(),
            config,
        }
    }

    pub fn config(&self) -> &ToyConfig {
        &self.config
    }

    pub fn transport(&self) -> &TransportClock {
        &self.transport
    }

    // ----- Transport -----

    pub fn start(&mut self, now: f64) {
        self.transport.start(now);
    }

    pub fn stop(&mut self) {
        self.transport.stop();
    }

    pub fn set_bpm(&mut self, bpm: f64, now: f64) {
        self.transport.set_bpm(bpm, now);
    }

    // ----- Nodes -----

    /// Add a node and lay it out in `bounds`.
    pub fn add_node(&mut self, id: &str, bounds: Bounds) -> Result<&mut PhysicsNode, BouncerError> {
        if self.nodes.contains_key(id) {
            return Err(BouncerError::DuplicateNode(id.to_string()));
        }
        let mut node = PhysicsNode::new(id, &self.config);
        node.layout(bounds, self.transport.bar_length());
        tracing::debug!("Added node {}", id);
        Ok(self.nodes.entry(id.to_string()).or_insert(node))
    }

    /// Remove a node; its chain neighbours are joined back together.
    pub fn remove_node(&mut self, id: &str) -> Result<PhysicsNode, BouncerError> {
        if !self.nodes.contains_key(id) {
            return Err(BouncerError::UnknownNode(id.to_string()));
        }
        self.chain.detach(&mut self.nodes, id);
        self.scheduler.forget(id);
        self.nodes
            .remove(id)
            .ok_or_else(|| BouncerError::UnknownNode(id.to_string()))
    }

    pub fn node(&self, id: &str) -> Result<&PhysicsNode, BouncerError> {
        self.nodes.get(id).ok_or_else(|| BouncerError::UnknownNode(id.to_string()))
    }

    pub fn node_mut(&mut self, id: &str) -> Result<&mut PhysicsNode, BouncerError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| BouncerError::UnknownNode(id.to_string()))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PhysicsNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    /// Re-layout a node after its host element was resized.
    pub fn resize_node(&mut self, id: &str, bounds: Bounds) -> Result<(), BouncerError> {
        let bar_length = self.transport.bar_length();
        self.node_mut(id)?.layout(bounds, bar_length);
        Ok(())
    }

    /// Release a drag on a node's anchor.
    pub fn launch(&mut self, id: &str, dx: f64, dy: f64, now: f64) -> Result<(), BouncerError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| BouncerError::UnknownNode(id.to_string()))?;
        node.launch(dx, dy, now, &self.transport);
        Ok(())
    }

    /// Reset a node and drop its pending step-track state.
    pub fn reset_node(&mut self, id: &str) -> Result<(), BouncerError> {
        self.node_mut(id)?.reset();
        self.scheduler.forget(id);
        Ok(())
    }

    // ----- Chains -----

    pub fn link(&mut self, parent: &str, child: &str) -> Result<(), BouncerError> {
        self.chain.link(&mut self.nodes, parent, child)
    }

    pub fn unlink(&mut self, child: &str) -> Result<(), BouncerError> {
        if !self.nodes.contains_key(child) {
            return Err(BouncerError::UnknownNode(child.to_string()));
        }
        self.chain.unlink(&mut self.nodes, child);
        Ok(())
    }

    pub fn role_of(&self, id: &str) -> ChainRole {
        role_of(&self.nodes, id)
    }

    pub fn chain_of(&self, id: &str) -> Vec<NodeId> {
        chain_members(&self.nodes, id)
    }

    /// Re-establish the single-active invariant after links were replaced wholesale.
    pub(crate) fn normalize_chains(&mut self) {
        for id in self.node_ids() {
            self.chain.normalize(&mut self.nodes, &id);
        }
    }

    // ----- Frame -----

    /// Advance everything to `now` and return the notes that reached the sink.
    pub fn frame(&mut self, now: f64, sink: &mut dyn NoteSink) -> Vec<ScheduledEvent> {
        let info = self.transport.tick(now);
        self.chain.begin_frame();
        let mut events = Vec::new();

        for id in self.node_ids() {
            let plays = role_of(&self.nodes, &id).plays();
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            let report = node.step(now, &self.transport);
            if !plays && !report.hits.is_empty() {
                tracing::debug!("{}: muting {} hits without the chain's turn", id, report.hits.len());
            }

            for hit in report.hits.iter().filter(|_| plays) {
                let note_name = node.note_name(hit.note_index);
                let request = FireRequest {
                    node_id: &id,
                    instrument_id: node.instrument_id(),
                    note_name: &note_name,
                    requested_time: hit.time,
                    divisor: node.quant_divisor(),
                };
                if let Some(event) = self.scheduler.dispatch(request, &info, sink) {
                    events.push(event);
                }
            }

            if let Some(expired) = report.expired {
                self.chain
                    .after_step(&mut self.nodes, &id, &expired, now, &self.transport);
            }
        }

        if self.transport.is_running() {
            let tracks = slot_tracks(&self.nodes, &self.chain, &info);
            events.extend(self.scheduler.schedule_slots(&info, &tracks, sink));
        }

        events
    }
}

/// Members whose turn starts at the next bar: successors of active nodes
/// whose ball ends at or before it.
fn incoming_turns(nodes: &Nodes, chain: &ChainCoordinator, next_bar_start: f64) -> BTreeSet<NodeId> {
    nodes
        .values()
        .filter(|node| role_of(nodes, node.id()) == ChainRole::ChainActive)
        .filter(|node| {
            node.ball()
                .map(BallState::flight_end)
                .is_some_and(|end| end <= next_bar_start + BAR_EPSILON)
        })
        .filter_map(|node| chain.successor(nodes, node.id()).filter(|next| next != node.id()))
        .collect()
}

/// Step-track views of every node that plays or is about to.
fn slot_tracks<'a>(nodes: &'a Nodes, chain: &ChainCoordinator, info: &LoopInfo) -> Vec<SlotTrack<'a>> {
    let next_bar_start = info.bar_start + info.bar_length;
    let incoming = incoming_turns(nodes, chain, next_bar_start);

    nodes
        .values()
        .filter(|node| !node.steps().is_empty())
        .filter_map(|node| {
            let role = role_of(nodes, node.id());
            let plays = role.plays();
            let takes_turn = incoming.contains(node.id());
            if !plays && !takes_turn {
                return None;
            }
            let outlives_bar = node
                .ball()
                .map(BallState::flight_end)
                .is_some_and(|end| end > next_bar_start + BAR_EPSILON);
            Some(SlotTrack {
                node_id: node.id(),
                instrument_id: node.instrument_id(),
                slots: node.slot_notes(),
                plays,
                include_next_bar: role == ChainRole::Standalone || outlives_bar,
                pre_schedule_downbeat: takes_turn || chain.is_just_activated(node.id()),
            })
        })
        .collect()
}
