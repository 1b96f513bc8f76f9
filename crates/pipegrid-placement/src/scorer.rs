//! Candidate ranking for placement decisions.
//!
//! Ranking is a total order, so identical snapshots and hints always
//! produce the same candidate list:
//! - **Locality**: nodes already holding the component's dataset first
//!   (skipped when the hint is stale)
//! - **Headroom**: most available memory first
//! - **Load**: fewest assigned components first
//! - **Node ID**: ascending, as the final tie-break

use std::cmp::Ordering;

use serde::Serialize;

use pipegrid_cluster::{DataLocation, Node};
use pipegrid_state::{NodeId, ResourceRequirement};

/// A node that can take the component, with the keys it is ranked by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub node_id: NodeId,
    pub co_located: bool,
    pub available_mb: u64,
    pub assigned_count: usize,
}

impl Candidate {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .co_located
            .cmp(&self.co_located)
            .then_with(|| other.available_mb.cmp(&self.available_mb))
            .then_with(|| self.assigned_count.cmp(&other.assigned_count))
            .then_with(|| self.node_id.cmp(&other.node_id))
    }
}

/// Whether `node` can host a component with `req` right now.
pub fn is_eligible(node: &Node, req: &ResourceRequirement) -> bool {
    if !node.is_alive() {
        return false;
    }
    if !node.profile.class.satisfies(req.class) {
        return false;
    }
    if req.accelerator && !node.profile.accelerator {
        return false;
    }
    node.available_mb() >= req.memory_mb
}

/// Filter `nodes` to eligible ones and return them best first.
///
/// `hint` is the location set of the component's dataset, if it declares
/// one. An empty or stale hint gives no locality preference.
pub fn rank_candidates(
    req: &ResourceRequirement,
    nodes: &[Node],
    hint: Option<&DataLocation>,
) -> Vec<Candidate> {
    let locality = hint.filter(|h| !h.stale && !h.is_empty());

    let mut candidates: Vec<Candidate> = nodes
        .iter()
        .filter(|n| is_eligible(n, req))
        .map(|n| Candidate {
            node_id: n.id.clone(),
            co_located: locality.is_some_and(|h| h.contains(&n.id)),
            available_mb: n.available_mb(),
            assigned_count: n.assigned_count(),
        })
        .collect();

    candidates.sort_by(Candidate::rank_cmp);
    candidates
}
