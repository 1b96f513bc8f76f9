//! redb table definitions for the pipeline store.
//!
//! Uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Pipelines keyed by `{pipeline_id}`.
pub const PIPELINES: TableDefinition<&str, &[u8]> = TableDefinition::new("pipelines");
