//! Node manager: tracks cluster nodes and their capacity.
//!
//! Owns the node inventory, each node's health classification and the
//! reservations components hold on it. `reserve` and `release` are the
//! only way capacity accounting changes; both run under the inventory's
//! write lock, so they are linearizable with respect to each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use pipegrid_core::config::HealthConfig;
use pipegrid_state::{NodeId, NodeProfile, epoch_secs};

use crate::data::DataManager;
use crate::error::{ClusterError, ClusterResult};
use crate::health::{HealthTracker, NodeHealth, ProbeResult};

/// Point-in-time view of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub profile: NodeProfile,
    pub health: NodeHealth,
    /// Component key → reserved memory (MB).
    pub reservations: BTreeMap<String, u64>,
    /// Unix timestamp of registration.
    pub registered_at: u64,
}

impl Node {
    pub fn reserved_mb(&self) -> u64 {
        self.reservations.values().sum()
    }

    /// Memory still free for new reservations.
    pub fn available_mb(&self) -> u64 {
        self.profile.memory_mb.saturating_sub(self.reserved_mb())
    }

    /// Number of components currently holding a reservation here.
    pub fn assigned_count(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_alive(&self) -> bool {
        self.health == NodeHealth::Alive
    }
}

struct NodeEntry {
    node: Node,
    tracker: HealthTracker,
}

/// Live inventory of compute nodes.
pub struct NodeManager {
    nodes: RwLock<BTreeMap<NodeId, NodeEntry>>,
    data: Arc<DataManager>,
    health_config: HealthConfig,
}

impl NodeManager {
    pub fn new(data: Arc<DataManager>) -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            data,
            health_config: HealthConfig::default(),
        }
    }

    /// Set the probe thresholds used for newly registered nodes.
    pub fn with_health_config(mut self, config: HealthConfig) -> Self {
        self.health_config = config;
        self
    }

    /// Register a node, or refresh the profile of a known one.
    ///
    /// A re-registered node keeps its reservations and comes back `Alive`.
    /// A refresh that advertises less memory than is already reserved is
    /// rejected and leaves the node untouched. Returns true when the node
    /// was not known before.
    pub async fn register(&self, node_id: &str, profile: NodeProfile) -> ClusterResult<bool> {
        let mut nodes = self.nodes.write().await;
        match nodes.get_mut(node_id) {
            Some(entry) => {
                let reserved_mb = entry.node.reserved_mb();
                if profile.memory_mb < reserved_mb {
                    warn!(
                        node = %node_id,
                        memory_mb = profile.memory_mb,
                        reserved_mb,
                        "re-registration rejected: capacity below reservations"
                    );
                    return Err(ClusterError::CapacityBelowReserved {
                        node_id: node_id.to_string(),
                        memory_mb: profile.memory_mb,
                        reserved_mb,
                    });
                }
                entry.node.profile = profile;
                entry.node.health = NodeHealth::Alive;
                entry.tracker.force(NodeHealth::Alive);
                debug!(node = %node_id, "node re-registered");
                Ok(false)
            }
            None => {
                info!(
                    node = %node_id,
                    class = %profile.class,
                    memory_mb = profile.memory_mb,
                    accelerator = profile.accelerator,
                    "node registered"
                );
                nodes.insert(
                    node_id.to_string(),
                    NodeEntry {
                        node: Node {
                            id: node_id.to_string(),
                            profile,
                            health: NodeHealth::Alive,
                            reservations: BTreeMap::new(),
                            registered_at: epoch_secs(),
                        },
                        tracker: HealthTracker::new(&self.health_config),
                    },
                );
                Ok(true)
            }
        }
    }

    /// Drop a node and every reservation on it.
    ///
    /// Its data locations are invalidated. Components that were placed on
    /// it are noticed by the next reconciliation pass.
    pub async fn remove(&self, node_id: &str) -> Option<Node> {
        let removed = {
            let mut nodes = self.nodes.write().await;
            nodes.remove(node_id)
        };

        let entry = removed?;
        let invalidated = self.data.invalidate(node_id).await;
        info!(
            node = %node_id,
            reservations = entry.node.reservations.len(),
            datasets = invalidated,
            "node removed"
        );
        Some(entry.node)
    }

    /// Consistent copy of every node, ordered by ID.
    pub async fn snapshot(&self) -> Vec<Node> {
        let nodes = self.nodes.read().await;
        nodes.values().map(|e| e.node.clone()).collect()
    }

    pub async fn get(&self, node_id: &str) -> Option<Node> {
        let nodes = self.nodes.read().await;
        nodes.get(node_id).map(|e| e.node.clone())
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    /// Atomically check headroom on `node_id` and reserve `memory_mb` for
    /// `component`.
    ///
    /// Reserving again for a component that already holds a reservation on
    /// the same node is a no-op success. A component can hold a reservation
    /// on at most one node.
    pub async fn reserve(&self, node_id: &str, component: &str, memory_mb: u64) -> ClusterResult<()> {
        let mut nodes = self.nodes.write().await;

        if let Some(other) = nodes
            .values()
            .find(|e| e.node.id != node_id && e.node.reservations.contains_key(component))
        {
            return Err(ClusterError::AlreadyReserved {
                component: component.to_string(),
                node_id: other.node.id.clone(),
            });
        }

        let entry = nodes
            .get_mut(node_id)
            .ok_or_else(|| ClusterError::UnknownNode(node_id.to_string()))?;

        if entry.node.reservations.contains_key(component) {
            return Ok(());
        }
        if entry.node.health == NodeHealth::Dead {
            return Err(ClusterError::NodeUnavailable(node_id.to_string()));
        }

        let available_mb = entry.node.available_mb();
        if memory_mb > available_mb {
            return Err(ClusterError::InsufficientCapacity {
                node_id: node_id.to_string(),
                requested_mb: memory_mb,
                available_mb,
            });
        }

        entry
            .node
            .reservations
            .insert(component.to_string(), memory_mb);
        debug!(
            node = %node_id,
            %component,
            memory_mb,
            remaining_mb = available_mb - memory_mb,
            "capacity reserved"
        );
        Ok(())
    }

    /// Release `component`'s reservation on `node_id`.
    ///
    /// Unknown nodes and unknown reservations are a no-op. Returns true
    /// when something was released.
    pub async fn release(&self, node_id: &str, component: &str) -> bool {
        let mut nodes = self.nodes.write().await;
        let released = nodes
            .get_mut(node_id)
            .and_then(|e| e.node.reservations.remove(component))
            .is_some();
        if released {
            debug!(node = %node_id, %component, "capacity released");
        }
        released
    }

    /// Whether `node_id` currently holds a reservation for `component`.
    pub async fn holds(&self, node_id: &str, component: &str) -> bool {
        let nodes = self.nodes.read().await;
        nodes
            .get(node_id)
            .is_some_and(|e| e.node.reservations.contains_key(component))
    }

    /// Apply an externally determined health classification.
    ///
    /// Returns the previous classification.
    pub async fn set_health(&self, node_id: &str, health: NodeHealth) -> ClusterResult<NodeHealth> {
        let prev = {
            let mut nodes = self.nodes.write().await;
            let entry = nodes
                .get_mut(node_id)
                .ok_or_else(|| ClusterError::UnknownNode(node_id.to_string()))?;
            let prev = entry.node.health;
            entry.tracker.force(health);
            entry.node.health = health;
            prev
        };

        self.on_health_change(node_id, prev, health).await;
        Ok(prev)
    }

    /// Fold a raw probe result into the node's classification.
    ///
    /// Returns the classification after the probe.
    pub async fn record_probe(&self, node_id: &str, result: ProbeResult) -> ClusterResult<NodeHealth> {
        let (prev, next) = {
            let mut nodes = self.nodes.write().await;
            let entry = nodes
                .get_mut(node_id)
                .ok_or_else(|| ClusterError::UnknownNode(node_id.to_string()))?;
            let prev = entry.node.health;
            let next = entry.tracker.record(result);
            entry.node.health = next;
            (prev, next)
        };

        self.on_health_change(node_id, prev, next).await;
        Ok(next)
    }

    async fn on_health_change(&self, node_id: &str, prev: NodeHealth, next: NodeHealth) {
        if prev == next {
            return;
        }
        info!(
            node = %node_id,
            from = prev.label(),
            to = next.label(),
            "node health changed"
        );
        if next == NodeHealth::Dead {
            self.data.invalidate(node_id).await;
        }
    }
}
