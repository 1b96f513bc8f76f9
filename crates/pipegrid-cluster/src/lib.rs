//! pipegrid-cluster: live view of compute nodes and data replicas.
//!
//! # Components
//!
//! - **`data`**: `DataManager`: dataset → nodes holding a usable replica
//! - **`nodes`**: `NodeManager`: node inventory, health, and the single
//!   mutation path for capacity accounting (`reserve` / `release`)
//! - **`health`**: consecutive-failure tracking that turns raw probe
//!   results into `Alive` / `Suspect` / `Dead`
//!
//! `NodeManager` owns an `Arc<DataManager>` so that losing a node drops
//! it from every dataset's location set. `DataManager` depends on nothing.

pub mod data;
pub mod error;
pub mod health;
pub mod nodes;

pub use data::{DataLocation, DataManager};
pub use error::{ClusterError, ClusterResult};
pub use health::{HealthTracker, NodeHealth, ProbeResult};
pub use nodes::{Node, NodeManager};
