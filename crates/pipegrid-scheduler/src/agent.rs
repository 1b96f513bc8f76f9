//! Deployment agent: hands placement decisions to whatever starts
//! components on nodes.
//!
//! The scheduler only decides where a component runs. Once
//! `process_pipelines` assigns a node, the runner turns each assignment
//! into a `DeployCommand` and passes it to a `DeploymentAgent`. The agent
//! reports back through `PipelineManager::report_component`.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::manager::Assignment;

/// Instruction to start one component on one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployCommand {
    pub node_id: String,
    pub pipeline_id: String,
    pub component: String,
    pub filename: String,
    pub memory_mb: u64,
}

impl From<&Assignment> for DeployCommand {
    fn from(a: &Assignment) -> Self {
        Self {
            node_id: a.node_id.clone(),
            pipeline_id: a.pipeline_id.clone(),
            component: a.component.clone(),
            filename: a.filename.clone(),
            memory_mb: a.memory_mb,
        }
    }
}

/// Delivers deploy commands to nodes.
///
/// Called outside of any scheduler lock. A failed delivery is logged and
/// does not change placement state.
pub trait DeploymentAgent: Send + Sync {
    fn deploy(&self, cmd: &DeployCommand) -> anyhow::Result<()>;
}

/// Agent that only logs the command. Used when no runtime is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAgent;

impl DeploymentAgent for LoggingAgent {
    fn deploy(&self, cmd: &DeployCommand) -> anyhow::Result<()> {
        let payload = serde_json::to_string(cmd)?;
        info!(
            node = %cmd.node_id,
            pipeline_id = %cmd.pipeline_id,
            component = %cmd.component,
            %payload,
            "deploy command issued"
        );
        Ok(())
    }
}
