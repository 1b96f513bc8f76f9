//! pipegrid placement: which node a component should run on.
//!
//! This crate does not own any state. It filters and ranks a node
//! snapshot for a component's requirement, then walks the ranking and
//! asks `NodeManager` to reserve capacity until one node accepts.
//!
//! # Components
//!
//! - **`scorer`**: eligibility filter and deterministic candidate ranking
//!   (data locality, headroom, load, node ID)
//! - **`decision`**: `DecisionUnit`: ranking + reservation, producing a
//!   `Decision`

pub mod decision;
pub mod scorer;

pub use decision::{Decision, DecisionUnit};
pub use scorer::{Candidate, is_eligible, rank_candidates};
