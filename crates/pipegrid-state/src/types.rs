//! Domain types for pipelines, components and nodes.
//!
//! All types are serializable to/from JSON. A `Pipeline` record is
//! self-contained: reloading it restores every component's placement
//! state without consulting any other table.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pipegrid_core::{CapacityClass, DefaultsConfig, normalize_component_name};

/// Unique identifier for a submitted pipeline.
pub type PipelineId = String;

/// Stable identifier of a compute node.
pub type NodeId = String;

/// Identifier of a dataset or artifact a component may depend on.
pub type DatasetId = String;

/// Identity of a component across pipelines: `{pipeline_id}/{component_name}`.
///
/// Used as the reservation key on nodes.
pub fn component_key(pipeline_id: &str, component_name: &str) -> String {
    format!("{pipeline_id}/{component_name}")
}

// ── Resources ─────────────────────────────────────────────────────

/// What a component needs from the node it runs on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRequirement {
    #[serde(default)]
    pub class: CapacityClass,
    pub memory_mb: u64,
    #[serde(default)]
    pub accelerator: bool,
    /// Dataset the component reads; drives locality preference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetId>,
    /// Dataset the component writes; recorded at its node on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produces: Option<DatasetId>,
}

impl ResourceRequirement {
    pub fn from_defaults(defaults: &DefaultsConfig) -> Self {
        Self {
            class: defaults.class,
            memory_mb: defaults.memory_mb,
            accelerator: defaults.accelerator,
            dataset: None,
            produces: None,
        }
    }
}

impl Default for ResourceRequirement {
    fn default() -> Self {
        Self::from_defaults(&DefaultsConfig::default())
    }
}

/// Advertised capability of a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeProfile {
    #[serde(default)]
    pub class: CapacityClass,
    /// Total memory the node offers to components (MB).
    pub memory_mb: u64,
    #[serde(default)]
    pub accelerator: bool,
}

// ── Components ────────────────────────────────────────────────────

/// Placement state of a single component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlacementState {
    Unplaced,
    Assigned { node_id: NodeId },
    Running { node_id: NodeId },
    /// The node holding this component was lost.
    Unreachable { node_id: NodeId },
    Completed { node_id: NodeId },
    Failed { reason: String },
}

impl PlacementState {
    /// Node currently hosting the component (`Assigned` or `Running`).
    pub fn active_node(&self) -> Option<&str> {
        match self {
            PlacementState::Assigned { node_id } | PlacementState::Running { node_id } => {
                Some(node_id)
            }
            _ => None,
        }
    }

    /// Last node associated with the component, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            PlacementState::Assigned { node_id }
            | PlacementState::Running { node_id }
            | PlacementState::Unreachable { node_id }
            | PlacementState::Completed { node_id } => Some(node_id),
            PlacementState::Unplaced | PlacementState::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlacementState::Completed { .. } | PlacementState::Failed { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlacementState::Unplaced => "unplaced",
            PlacementState::Assigned { .. } => "assigned",
            PlacementState::Running { .. } => "running",
            PlacementState::Unreachable { .. } => "unreachable",
            PlacementState::Completed { .. } => "completed",
            PlacementState::Failed { .. } => "failed",
        }
    }
}

/// Filename that does not yield a usable component name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid component filename: {0:?}")]
pub struct InvalidComponentName(pub String);

/// One deployable unit within a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentSpec {
    /// Filename as submitted.
    pub filename: String,
    /// Normalized name, unique within the pipeline.
    pub name: String,
    pub requirement: ResourceRequirement,
    pub state: PlacementState,
    /// Consecutive placement attempts that found no eligible node since
    /// the component last became unplaced.
    #[serde(default)]
    pub attempts: u32,
    /// Number of times the component has been assigned to a node.
    #[serde(default)]
    pub placements: u32,
}

impl ComponentSpec {
    /// Build an unplaced component, normalizing its name from the filename.
    pub fn new(
        filename: impl Into<String>,
        requirement: ResourceRequirement,
    ) -> Result<Self, InvalidComponentName> {
        let filename = filename.into();
        let name = normalize_component_name(&filename)
            .ok_or_else(|| InvalidComponentName(filename.clone()))?;
        Ok(Self {
            filename,
            name,
            requirement,
            state: PlacementState::Unplaced,
            attempts: 0,
            placements: 0,
        })
    }

    pub fn is_unplaced(&self) -> bool {
        self.state == PlacementState::Unplaced
    }

    /// Whether this component has never been considered for placement.
    pub fn is_pristine(&self) -> bool {
        self.is_unplaced() && self.attempts == 0 && self.placements == 0
    }
}

// ── Pipelines ─────────────────────────────────────────────────────

/// Lifecycle state of a pipeline, derived from its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Submitted,
    Placing,
    Placed,
    Degraded,
    Completed,
    Failed,
}

impl PipelineState {
    /// Derive the lifecycle state from component placement states.
    ///
    /// Precedence: failed, completed, degraded, placed, submitted, placing.
    pub fn derive(components: &[ComponentSpec]) -> Self {
        let any = |f: fn(&ComponentSpec) -> bool| components.iter().any(f);
        let all = |f: fn(&ComponentSpec) -> bool| components.iter().all(f);

        if any(|c| matches!(c.state, PlacementState::Failed { .. })) {
            PipelineState::Failed
        } else if all(|c| matches!(c.state, PlacementState::Completed { .. })) {
            PipelineState::Completed
        } else if any(|c| matches!(c.state, PlacementState::Unreachable { .. })) {
            PipelineState::Degraded
        } else if all(|c| {
            matches!(
                c.state,
                PlacementState::Assigned { .. }
                    | PlacementState::Running { .. }
                    | PlacementState::Completed { .. }
            )
        }) {
            PipelineState::Placed
        } else if all(ComponentSpec::is_pristine) {
            PipelineState::Submitted
        } else {
            PipelineState::Placing
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }

    /// States picked up by placement passes.
    pub fn needs_placement(&self) -> bool {
        matches!(self, PipelineState::Submitted | PipelineState::Placing)
    }

    /// States picked up by reconciliation passes.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, PipelineState::Placed | PipelineState::Degraded)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Submitted => "submitted",
            PipelineState::Placing => "placing",
            PipelineState::Placed => "placed",
            PipelineState::Degraded => "degraded",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A user-submitted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pipeline {
    pub id: PipelineId,
    pub name: String,
    /// Components in submission order.
    pub components: Vec<ComponentSpec>,
    pub state: PipelineState,
    /// Unix timestamp (seconds) of submission.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last state change.
    pub updated_at: u64,
}

impl Pipeline {
    pub fn new(id: impl Into<String>, name: impl Into<String>, components: Vec<ComponentSpec>) -> Self {
        let now = epoch_secs();
        let state = PipelineState::derive(&components);
        Self {
            id: id.into(),
            name: name.into(),
            components,
            state,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn component_mut(&mut self, name: &str) -> Option<&mut ComponentSpec> {
        self.components.iter_mut().find(|c| c.name == name)
    }

    /// Recompute `state` from the components.
    ///
    /// Returns the previous state when it changed.
    pub fn refresh_state(&mut self) -> Option<PipelineState> {
        let next = PipelineState::derive(&self.components);
        if next == self.state {
            return None;
        }
        let prev = self.state;
        self.state = next;
        self.updated_at = epoch_secs();
        Some(prev)
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
