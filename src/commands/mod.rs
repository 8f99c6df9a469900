//! CLI command implementations.

pub mod demo;
pub mod inspect;
pub mod plan;

use serde_json::{json, Map, Value};

use crate::types::TrajectoryEntry;

/// Params map selecting the default `text` state key.
pub(crate) fn text_key_params() -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("key".to_string(), json!("text"));
    params
}

/// One-line rendering of a trajectory entry.
pub(crate) fn format_entry(entry: &TrajectoryEntry) -> String {
    format!(
        "{:>4}  {}  {:<22} {:<16} {}",
        entry.seq_num,
        entry.timestamp.format("%H:%M:%S%.3f"),
        entry.entry_type.as_str(),
        entry.agent_id,
        entry.content
    )
}
