pub mod config;
pub mod naming;
pub mod types;

pub use config::{DatasetSeed, DefaultsConfig, NodeSeed, PipegridConfig};
pub use naming::normalize_component_name;
pub use types::*;
