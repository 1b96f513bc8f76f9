//! pipegrid-state: domain types and pipeline persistence.
//!
//! Backed by [redb](https://docs.rs/redb). The scheduler keeps pipelines
//! in memory and only touches the store when dumping at shutdown and
//! loading at startup.
//!
//! # Architecture
//!
//! Pipelines are JSON-serialized into redb's `&[u8]` value column, keyed
//! by pipeline ID. One record holds the whole pipeline: its components,
//! their placement states and the derived lifecycle state.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
