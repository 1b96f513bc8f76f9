//! DataManager: where datasets live.
//!
//! Tracks, per dataset, the set of nodes known to hold a usable replica
//! or cached copy. Unknown datasets are not an error: they simply have
//! no location and therefore no locality preference.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use pipegrid_state::{DatasetId, NodeId};

/// Known replicas of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataLocation {
    pub nodes: BTreeSet<NodeId>,
    /// Set when the replica list may no longer reflect reality.
    pub stale: bool,
}

impl DataLocation {
    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains(node_id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Default)]
pub struct DataManager {
    locations: RwLock<HashMap<DatasetId, DataLocation>>,
}

impl DataManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes holding `dataset_id`; empty when the dataset is unknown.
    pub async fn locations_for(&self, dataset_id: &str) -> DataLocation {
        let locations = self.locations.read().await;
        locations.get(dataset_id).cloned().unwrap_or_default()
    }

    /// Record a replica of `dataset_id` on `node_id`.
    ///
    /// Returns true when the pair was not known before. Recording clears
    /// the dataset's stale flag.
    pub async fn record_location(&self, dataset_id: &str, node_id: &str) -> bool {
        let mut locations = self.locations.write().await;
        let entry = locations.entry(dataset_id.to_string()).or_default();
        entry.stale = false;
        let inserted = entry.nodes.insert(node_id.to_string());
        if inserted {
            debug!(dataset = %dataset_id, node = %node_id, "data location recorded");
        }
        inserted
    }

    /// Drop `node_id` from every dataset. Returns how many datasets lost it.
    pub async fn invalidate(&self, node_id: &str) -> usize {
        let mut locations = self.locations.write().await;
        let mut touched = 0;
        locations.retain(|_, location| {
            if location.nodes.remove(node_id) {
                touched += 1;
            }
            !location.nodes.is_empty()
        });
        if touched > 0 {
            debug!(node = %node_id, datasets = touched, "data locations invalidated");
        }
        touched
    }

    /// Flag a dataset's locations as stale. Returns false for unknown datasets.
    pub async fn mark_stale(&self, dataset_id: &str) -> bool {
        let mut locations = self.locations.write().await;
        match locations.get_mut(dataset_id) {
            Some(location) => {
                location.stale = true;
                true
            }
            None => false,
        }
    }

    /// All known datasets, sorted by ID.
    pub async fn datasets(&self) -> Vec<(DatasetId, DataLocation)> {
        let locations = self.locations.read().await;
        let mut all: Vec<_> = locations
            .iter()
            .map(|(id, loc)| (id.clone(), loc.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
