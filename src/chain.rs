//! # Chain Coordinator
//!
//! Nodes can be linked into a linear relay `A -> B -> C`. Exactly one member
//! of a chain holds the turn (`is_active`). When the active node's ball
//! reaches its flight end the turn moves to the next node; the tail hands it
//! back to the head so the relay loops.
//!
//! ## Roles
//! - `Standalone` - no usable links; relaunches its own shot every loop
//! - `ChainHeadInactive` - first in a chain, waiting for its turn
//! - `ChainActive` - holds the turn
//! - `ChainFollowerInactive` - later in a chain, waiting for its turn
//!
//! Links that point at nodes which no longer exist are ignored. A node whose
//! only links are dangling behaves as standalone; nothing here returns an
//! error while the stage is running.

use crate::error::BouncerError;
use crate::physics::{Activation, BallState, NodeId, PhysicsNode, MAX_DT};
use crate::transport::TransportClock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type Nodes = BTreeMap<NodeId, PhysicsNode>;

/// Chain graph data carried by every node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLinks {
    pub prev_id: Option<NodeId>,
    pub next_id: Option<NodeId>,
    /// Head of the chain this node belongs to
    pub chain_parent_id: Option<NodeId>,
    pub is_active: bool,
}

impl Default for ChainLinks {
    fn default() -> Self {
        Self {
            prev_id: None,
            next_id: None,
            chain_parent_id: None,
            is_active: true,
        }
    }
}

impl ChainLinks {
    pub fn is_linked(&self) -> bool {
        self.prev_id.is_some() || self.next_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainRole {
    Standalone,
    ChainHeadInactive,
    ChainActive,
    ChainFollowerInactive,
}

impl ChainRole {
    /// Whether a node in this role plays its step track
    pub fn plays(self) -> bool {
        matches!(self, ChainRole::Standalone | ChainRole::ChainActive)
    }
}

fn effective_next<'a>(nodes: &'a Nodes, id: &str) -> Option<&'a NodeId> {
    let next = nodes.get(id)?.chain.next_id.as_ref()?;
    nodes.contains_key(next).then_some(next)
}

fn effective_prev<'a>(nodes: &'a Nodes, id: &str) -> Option<&'a NodeId> {
    let prev = nodes.get(id)?.chain.prev_id.as_ref()?;
    nodes.contains_key(prev).then_some(prev)
}

/// Role of a node, judged from links that resolve to existing nodes.
pub fn role_of(nodes: &Nodes, id: &str) -> ChainRole {
    let Some(node) = nodes.get(id) else {
        return ChainRole::Standalone;
    };
    let has_prev = effective_prev(nodes, id).is_some();
    let has_next = effective_next(nodes, id).is_some();

    if !has_prev && !has_next {
        ChainRole::Standalone
    } else if node.chain.is_active {
        ChainRole::ChainActive
    } else if !has_prev {
        ChainRole::ChainHeadInactive
    } else {
        ChainRole::ChainFollowerInactive
    }
}

/// First node reached by walking `prev` links.
pub fn head_of(nodes: &Nodes, id: &str) -> NodeId {
    let mut seen = BTreeSet::new();
    let mut current = id.to_string();
    while let Some(prev) = effective_prev(nodes, &current) {
        if !seen.insert(current.clone()) {
            break;
        }
        current = prev.clone();
    }
    current
}

/// Members of the chain containing `id`, head first.
pub fn chain_members(nodes: &Nodes, id: &str) -> Vec<NodeId> {
    let mut members = vec![head_of(nodes, id)];
    let mut seen: BTreeSet<NodeId> = members.iter().cloned().collect();
    while let Some(next) = members.last().and_then(|last| effective_next(nodes, last)) {
        if !seen.insert(next.clone()) {
            break;
        }
        members.push(next.clone());
    }
    members
}

/// Moves the active turn along chains
#[derive(Debug, Clone, Default)]
pub struct ChainCoordinator {
    just_activated: BTreeSet<NodeId>,
}

impl ChainCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget last frame's activations.
    pub fn begin_frame(&mut self) {
        self.just_activated.clear();
    }

    /// True if `id` received the turn during the current frame
    pub fn is_just_activated(&self, id: &str) -> bool {
        self.just_activated.contains(id)
    }

    /// Link `child` after `parent`.
    ///
    /// An existing successor of `parent` and predecessor of `child` are
    /// detached first. Fails if either node is unknown or the link would
    /// close a loop.
    pub fn link(&mut self, nodes: &mut Nodes, parent: &str, child: &str) -> Result<(), BouncerError> {
        for id in [parent, child] {
            if !nodes.contains_key(id) {
                return Err(BouncerError::UnknownNode(id.to_string()));
            }
        }
        if parent == child {
            return Err(BouncerError::ChainError(format!("{} cannot follow itself", child)));
        }
        if chain_members(nodes, parent).iter().any(|m| m == child) {
            return Err(BouncerError::ChainError(format!(
                "{} is already in the chain of {}",
                child, parent
            )));
        }

        if let Some(old_next) = effective_next(nodes, parent).cloned() {
            self.unlink(nodes, &old_next);
        }
        self.unlink(nodes, child);

        if let Some(node) = nodes.get_mut(parent) {
            node.chain.next_id = Some(child.to_string());
        }
        if let Some(node) = nodes.get_mut(child) {
            node.chain.prev_id = Some(parent.to_string());
        }
        self.normalize(nodes, parent);
        tracing::debug!("Linked {} -> {}", parent, child);
        Ok(())
    }

    /// Detach `child` from its predecessor, splitting the chain in two.
    pub fn unlink(&mut self, nodes: &mut Nodes, child: &str) {
        let Some(prev) = nodes.get_mut(child).and_then(|n| n.chain.prev_id.take()) else {
            return;
        };
        if let Some(node) = nodes.get_mut(&prev) {
            if node.chain.next_id.as_deref() == Some(child) {
                node.chain.next_id = None;
            }
        }
        self.normalize(nodes, &prev);
        self.normalize(nodes, child);
        tracing::debug!("Unlinked {} from {}", child, prev);
    }

    /// Remove `id` from whatever chain it is in, joining its neighbours.
    pub fn detach(&mut self, nodes: &mut Nodes, id: &str) {
        let prev = effective_prev(nodes, id).cloned();
        let next = effective_next(nodes, id).cloned();
        if let Some(next) = &next {
            self.unlink(nodes, next);
        }
        self.unlink(nodes, id);
        if let Some(node) = nodes.get_mut(id) {
            node.chain = ChainLinks::default();
        }
        if let (Some(prev), Some(next)) = (prev, next) {
            // Neither side can contain the other after the split
            let _ = self.link(nodes, &prev, &next);
        }
    }

    /// Refresh `chain_parent_id` and enforce one active member per chain.
    pub fn normalize(&mut self, nodes: &mut Nodes, id: &str) {
        let members = chain_members(nodes, id);
        if members.len() < 2 {
            if let Some(node) = nodes.get_mut(id) {
                node.chain.chain_parent_id = None;
                node.chain.is_active = true;
            }
            return;
        }

        let head = members[0].clone();
        let mut active_seen = false;
        for member in &members {
            let Some(node) = nodes.get_mut(member) else {
                continue;
            };
            node.chain.chain_parent_id = Some(head.clone());
            if node.chain.is_active {
                if active_seen {
                    node.deactivate();
                }
                active_seen = true;
            }
        }
        if !active_seen {
            if let Some(node) = nodes.get_mut(&head) {
                node.chain.is_active = true;
            }
        }
    }

    /// Who takes the turn after `id`: its successor, or the head for a tail.
    pub(crate) fn successor(&self, nodes: &Nodes, id: &str) -> Option<NodeId> {
        if let Some(next) = effective_next(nodes, id) {
            return Some(next.clone());
        }
        if effective_prev(nodes, id).is_some() {
            return Some(head_of(nodes, id));
        }
        None
    }

    /// React to a ball that expired during `step`.
    ///
    /// Standalone nodes have already queued their own relaunch. An active
    /// chain member passes the turn on; a member whose links all dangle
    /// falls back to relaunching like a standalone node.
    pub fn after_step(
        &mut self,
        nodes: &mut Nodes,
        id: &str,
        expired: &BallState,
        now: f64,
        transport: &TransportClock,
    ) {
        let Some(node) = nodes.get(id) else {
            return;
        };
        if !node.chain.is_linked() || !node.chain.is_active {
            return;
        }

        if node.chain.next_id.as_ref().is_some_and(|next| !nodes.contains_key(next)) {
            tracing::warn!("{}: next node {:?} is gone", id, node.chain.next_id);
        }

        match self.successor(nodes, id) {
            Some(next) if next != id => {
                let at = expired.flight_end().max(now - MAX_DT);
                self.hand_off(nodes, id, &next, at, transport);
            }
            _ => {
                tracing::warn!("{}: chain links are orphaned, continuing standalone", id);
                let info = transport.loop_info(now);
                if let Some(node) = nodes.get_mut(id) {
                    node.schedule_relaunch(expired.flight_end(), &info);
                }
            }
        }
    }

    /// Move the turn from `from` to `to` at time `at`.
    pub fn hand_off(&mut self, nodes: &mut Nodes, from: &str, to: &str, at: f64, transport: &TransportClock) {
        if let Some(node) = nodes.get_mut(from) {
            node.deactivate();
        }
        let Some(node) = nodes.get_mut(to) else {
            return;
        };
        let activation = node.activate(at, transport);
        self.just_activated.insert(to.to_string());
        tracing::debug!("Turn {} -> {} ({:?})", from, to, activation);
        if activation == Activation::Ghost {
            tracing::debug!("{}: holding the turn with a ghost ball", to);
        }
    }
}
