//! Scheduler context: the long-lived managers, built once at startup
//! and shared by the periodic runner and the API.

use std::sync::Arc;

use tracing::{info, warn};

use pipegrid_cluster::{DataManager, NodeManager};
use pipegrid_core::PipegridConfig;
use pipegrid_state::{NodeProfile, ResourceRequirement, StateStore};

use crate::manager::PipelineManager;

pub struct SchedulerContext {
    pub config: PipegridConfig,
    pub nodes: Arc<NodeManager>,
    pub data: Arc<DataManager>,
    pub pipelines: Arc<PipelineManager>,
    pub store: StateStore,
}

impl SchedulerContext {
    /// Wire the managers together and register the static inventory
    /// (`[[nodes]]`, `[[datasets]]`) from the config.
    pub async fn new(config: PipegridConfig, store: StateStore) -> Self {
        let data = Arc::new(DataManager::new());
        let nodes = Arc::new(
            NodeManager::new(Arc::clone(&data)).with_health_config(config.health.clone()),
        );
        let pipelines = Arc::new(PipelineManager::new(
            Arc::clone(&nodes),
            Arc::clone(&data),
            store.clone(),
            config.scheduler.max_placement_attempts,
        ));

        for seed in &config.nodes {
            let profile = NodeProfile {
                class: seed.class,
                memory_mb: seed.memory_mb,
                accelerator: seed.accelerator,
            };
            if let Err(e) = nodes.register(&seed.id, profile).await {
                warn!(node = %seed.id, error = %e, "static node not registered");
            }
        }
        for seed in &config.datasets {
            for node_id in &seed.nodes {
                if nodes.get(node_id).await.is_none() {
                    warn!(dataset = %seed.id, node = %node_id, "dataset seeded on unknown node");
                }
                data.record_location(&seed.id, node_id).await;
            }
        }

        info!(
            nodes = config.nodes.len(),
            datasets = config.datasets.len(),
            "scheduler context ready"
        );

        Self {
            config,
            nodes,
            data,
            pipelines,
            store,
        }
    }

    /// Requirement for components submitted without one.
    pub fn default_requirement(&self) -> ResourceRequirement {
        ResourceRequirement::from_defaults(&self.config.defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipegrid_core::{CapacityClass, DatasetSeed, NodeSeed};

    #[tokio::test]
    async fn seeds_nodes_and_datasets() {
        let mut config = PipegridConfig::default();
        config.nodes = vec![
            NodeSeed {
                id: "edge-1".to_string(),
                class: CapacityClass::Medium,
                memory_mb: 4096,
                accelerator: false,
            },
            NodeSeed {
                id: "gpu-1".to_string(),
                class: CapacityClass::Large,
                memory_mb: 16384,
                accelerator: true,
            },
        ];
        config.datasets = vec![DatasetSeed {
            id: "imagenet-mini".to_string(),
            nodes: vec!["edge-1".to_string()],
        }];

        let ctx = SchedulerContext::new(config, StateStore::open_in_memory().unwrap()).await;

        assert_eq!(ctx.nodes.len().await, 2);
        assert!(ctx.nodes.get("gpu-1").await.unwrap().profile.accelerator);
        assert!(ctx.data.locations_for("imagenet-mini").await.contains("edge-1"));
        assert!(ctx.pipelines.is_empty().await);
    }

    #[tokio::test]
    async fn default_requirement_follows_config() {
        let mut config = PipegridConfig::default();
        config.defaults.memory_mb = 2048;
        config.defaults.class = CapacityClass::Large;

        let ctx = SchedulerContext::new(config, StateStore::open_in_memory().unwrap()).await;
        let req = ctx.default_requirement();
        assert_eq!(req.memory_mb, 2048);
        assert_eq!(req.class, CapacityClass::Large);
        assert!(req.dataset.is_none());
    }
}
