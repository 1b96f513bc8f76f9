//! DecisionUnit: turns a ranked candidate list into a reservation.
//!
//! The unit holds no state of its own. `NodeManager::reserve` is the only
//! synchronization point: when a concurrent decision wins the race for a
//! node, the reservation fails and the next candidate is tried.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use pipegrid_cluster::{DataLocation, Node, NodeManager};
use pipegrid_state::{NodeId, ResourceRequirement};

use crate::scorer::rank_candidates;

/// Outcome of a placement decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    /// Capacity was reserved on `node_id`.
    Assigned { node_id: NodeId, co_located: bool },
    /// No node in the snapshot could take the component.
    NoEligibleNode,
}

impl Decision {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Decision::Assigned { node_id, .. } => Some(node_id),
            Decision::NoEligibleNode => None,
        }
    }
}

#[derive(Clone)]
pub struct DecisionUnit {
    nodes: Arc<NodeManager>,
}

impl DecisionUnit {
    pub fn new(nodes: Arc<NodeManager>) -> Self {
        Self { nodes }
    }

    /// Pick a node for the component identified by `key` and reserve its
    /// memory there.
    ///
    /// Candidates come from `snapshot`; `hint` is the location set of the
    /// component's dataset, if any.
    pub async fn decide(
        &self,
        key: &str,
        req: &ResourceRequirement,
        snapshot: &[Node],
        hint: Option<&DataLocation>,
    ) -> Decision {
        let candidates = rank_candidates(req, snapshot, hint);
        if candidates.is_empty() {
            debug!(component = %key, nodes = snapshot.len(), "no eligible node in snapshot");
            return Decision::NoEligibleNode;
        }

        for candidate in &candidates {
            match self
                .nodes
                .reserve(&candidate.node_id, key, req.memory_mb)
                .await
            {
                Ok(()) => {
                    debug!(
                        component = %key,
                        node = %candidate.node_id,
                        co_located = candidate.co_located,
                        available_mb = candidate.available_mb,
                        "placement decided"
                    );
                    return Decision::Assigned {
                        node_id: candidate.node_id.clone(),
                        co_located: candidate.co_located,
                    };
                }
                Err(e) => {
                    debug!(
                        component = %key,
                        node = %candidate.node_id,
                        error = %e,
                        "reservation lost, trying next candidate"
                    );
                }
            }
        }

        debug!(component = %key, candidates = candidates.len(), "all candidates exhausted");
        Decision::NoEligibleNode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipegrid_cluster::{DataManager, NodeHealth};
    use pipegrid_core::CapacityClass;
    use pipegrid_state::NodeProfile;

    fn profile(class: CapacityClass, memory_mb: u64) -> NodeProfile {
        NodeProfile {
            class,
            memory_mb,
            accelerator: false,
        }
    }

    fn req(memory_mb: u64) -> ResourceRequirement {
        ResourceRequirement {
            memory_mb,
            ..ResourceRequirement::default()
        }
    }

    async fn setup(nodes: &[(&str, u64)]) -> (DecisionUnit, Arc<NodeManager>, Arc<DataManager>) {
        let data = Arc::new(DataManager::new());
        let manager = Arc::new(NodeManager::new(Arc::clone(&data)));
        for (id, mb) in nodes {
            manager.register(id, profile(CapacityClass::Medium, *mb)).await.unwrap();
        }
        (DecisionUnit::new(Arc::clone(&manager)), manager, data)
    }

    #[tokio::test]
    async fn empty_cluster_has_no_eligible_node() {
        let (unit, nodes, _) = setup(&[]).await;
        let snapshot = nodes.snapshot().await;
        assert_eq!(
            unit.decide("p/a", &req(128), &snapshot, None).await,
            Decision::NoEligibleNode
        );
    }

    #[tokio::test]
    async fn assigns_and_reserves() {
        let (unit, nodes, _) = setup(&[("n1", 1024), ("n2", 2048)]).await;
        let snapshot = nodes.snapshot().await;

        let decision = unit.decide("p/a", &req(512), &snapshot, None).await;
        assert_eq!(decision.node_id(), Some("n2"));
        assert!(nodes.holds("n2", "p/a").await);
        assert_eq!(nodes.get("n2").await.unwrap().available_mb(), 1536);
    }

    #[tokio::test]
    async fn stale_snapshot_falls_through_to_next_candidate() {
        let (unit, nodes, _) = setup(&[("n1", 1024), ("n2", 2048)]).await;
        let snapshot = nodes.snapshot().await;

        // Someone else takes n2's headroom after the snapshot was taken.
        nodes.reserve("n2", "other/x", 2048).await.unwrap();

        let decision = unit.decide("p/a", &req(512), &snapshot, None).await;
        assert_eq!(decision.node_id(), Some("n1"));
        assert!(!nodes.holds("n2", "p/a").await);
    }

    #[tokio::test]
    async fn exhausted_candidates_leave_no_reservation() {
        let (unit, nodes, _) = setup(&[("n1", 1024)]).await;
        let snapshot = nodes.snapshot().await;
        nodes.reserve("n1", "other/x", 1024).await.unwrap();

        assert_eq!(
            unit.decide("p/a", &req(512), &snapshot, None).await,
            Decision::NoEligibleNode
        );
        assert!(!nodes.holds("n1", "p/a").await);
    }

    #[tokio::test]
    async fn prefers_dataset_holder() {
        let (unit, nodes, data) = setup(&[("n1", 1024), ("n2", 4096)]).await;
        data.record_location("ds", "n1").await;
        let snapshot = nodes.snapshot().await;
        let hint = data.locations_for("ds").await;

        let decision = unit.decide("p/a", &req(512), &snapshot, Some(&hint)).await;
        assert_eq!(
            decision,
            Decision::Assigned {
                node_id: "n1".to_string(),
                co_located: true,
            }
        );
    }

    #[tokio::test]
    async fn dead_nodes_are_never_chosen() {
        let (unit, nodes, _) = setup(&[("n1", 4096), ("n2", 1024)]).await;
        nodes.set_health("n1", NodeHealth::Dead).await.unwrap();
        let snapshot = nodes.snapshot().await;

        let decision = unit.decide("p/a", &req(512), &snapshot, None).await;
        assert_eq!(decision.node_id(), Some("n2"));
    }

    #[tokio::test]
    async fn identical_snapshots_decide_identically() {
        let mut chosen = Vec::new();
        for _ in 0..3 {
            let (unit, nodes, _) = setup(&[("b", 2048), ("a", 2048), ("c", 1024)]).await;
            let snapshot = nodes.snapshot().await;
            let d = unit.decide("p/a", &req(256), &snapshot, None).await;
            chosen.push(d.node_id().map(str::to_string));
        }
        assert_eq!(chosen, vec![Some("a".to_string()); 3]);
    }

    #[tokio::test]
    async fn concurrent_decisions_do_not_overcommit() {
        let (unit, nodes, _) = setup(&[("n1", 1024), ("n2", 1024)]).await;
        let snapshot = Arc::new(nodes.snapshot().await);

        let mut handles = Vec::new();
        for i in 0..8 {
            let unit = unit.clone();
            let snapshot = Arc::clone(&snapshot);
            handles.push(tokio::spawn(async move {
                unit.decide(&format!("p/c{i}"), &req(512), &snapshot, None)
                    .await
            }));
        }

        let mut assigned = 0;
        for h in handles {
            if h.await.unwrap() != Decision::NoEligibleNode {
                assigned += 1;
            }
        }
        assert_eq!(assigned, 4);
        for node in nodes.snapshot().await {
            assert!(node.reserved_mb() <= node.profile.memory_mb);
        }
    }
}
