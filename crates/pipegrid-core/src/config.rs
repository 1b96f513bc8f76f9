//! pipegrid.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::types::CapacityClass;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipegridConfig {
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub health: HealthConfig,
    pub defaults: DefaultsConfig,
    pub nodes: Vec<NodeSeed>,
    pub datasets: Vec<DatasetSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between placement passes (`process_pipelines`).
    pub wait_interval_secs: u64,
    /// Seconds between reconciliation passes (`update_pipelines`).
    pub update_interval_secs: u64,
    /// Failed placement attempts a component may accumulate before its
    /// pipeline is marked failed.
    pub max_placement_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wait_interval_secs: 10,
            update_interval_secs: 30,
            max_placement_attempts: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/pipegrid"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8470 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub suspect_after_failures: u32,
    pub dead_after_failures: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            suspect_after_failures: 1,
            dead_after_failures: 3,
        }
    }
}

/// Requirement applied to submitted components that declare none.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub memory_mb: u64,
    pub class: CapacityClass,
    pub accelerator: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            memory_mb: 512,
            class: CapacityClass::Small,
            accelerator: false,
        }
    }
}

/// A node registered at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSeed {
    pub id: String,
    #[serde(default)]
    pub class: CapacityClass,
    pub memory_mb: u64,
    #[serde(default)]
    pub accelerator: bool,
}

/// A dataset with replicas known at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSeed {
    pub id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

impl PipegridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipegridConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scheduler.wait_interval_secs == 0 {
            bail!("scheduler.wait_interval_secs must be positive");
        }
        if self.scheduler.update_interval_secs == 0 {
            bail!("scheduler.update_interval_secs must be positive");
        }
        if self.scheduler.max_placement_attempts == 0 {
            bail!("scheduler.max_placement_attempts must be positive");
        }
        if self.health.suspect_after_failures == 0 {
            bail!("health.suspect_after_failures must be positive");
        }
        if self.health.dead_after_failures < self.health.suspect_after_failures {
            bail!(
                "health.dead_after_failures ({}) must be >= suspect_after_failures ({})",
                self.health.dead_after_failures,
                self.health.suspect_after_failures
            );
        }
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                bail!("node id must not be empty");
            }
            if !seen.insert(node.id.as_str()) {
                bail!("duplicate node id in config: {}", node.id);
            }
        }
        Ok(())
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.wait_interval_secs)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.update_interval_secs)
    }

    /// Path of the redb file holding persisted pipelines.
    pub fn pipelines_db_path(&self) -> PathBuf {
        self.storage.data_dir.join("pipelines.redb")
    }
}
