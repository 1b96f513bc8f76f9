//! pipegrid-scheduler: pipeline lifecycle and the periodic passes.
//!
//! Owns the set of submitted pipelines and moves each one through
//! `Submitted → Placing → Placed` (and `Degraded`, `Completed`, `Failed`)
//! by running two passes:
//!
//! - **placement** (`process_pipelines`) asks the `DecisionUnit` for a node
//!   for every unplaced component
//! - **reconciliation** (`update_pipelines`) checks placed components
//!   against the current node inventory and requeues the ones that lost
//!   their node
//!
//! # Architecture
//!
//! ```text
//! SchedulerContext
//!   ├── NodeManager ──► DataManager
//!   ├── DataManager
//!   ├── PipelineManager
//!   │     ├── DecisionUnit (reserve via NodeManager)
//!   │     └── StateStore (dump / load)
//!   └── StateStore
//!
//! Runner
//!   ├── placement loop  (wait interval)   ──► DeploymentAgent
//!   └── reconcile loop  (update interval)
//! ```

pub mod agent;
pub mod context;
pub mod error;
pub mod events;
pub mod manager;
pub mod runner;

pub use agent::{DeployCommand, DeploymentAgent, LoggingAgent};
pub use context::SchedulerContext;
pub use error::{SchedulerError, SchedulerResult};
pub use events::ComponentEvent;
pub use manager::{Assignment, PipelineManager, PlacementReport, ReconcileReport};
pub use runner::{Runner, dispatch};
