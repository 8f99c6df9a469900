//! Deeply-copied session views for safe observation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::TrajectoryEntry;

/// A disconnected view of a session at one instant.
///
/// Snapshots own every byte they expose: the state map and trajectory
/// entries are deep copies, and artifacts appear as names only. Nothing an
/// observer does to a snapshot can reach the live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: BTreeMap<String, Value>,
    pub state_version: u64,
    /// Most recent trajectory entries, oldest first.
    pub trajectory: Vec<TrajectoryEntry>,
    /// Artifact names; bytes stay in the session.
    pub artifacts: Vec<String>,
    pub snapshot_time: DateTime<Utc>,
    /// Total trajectory length at snapshot time (the `trajectory` field may
    /// hold fewer entries when a depth limit was applied).
    pub trajectory_len: u64,
}

impl SessionSnapshot {
    /// Sequence number of the newest entry included in this snapshot.
    #[must_use]
    pub fn latest_seq_num(&self) -> Option<u64> {
        self.trajectory.last().map(|e| e.seq_num)
    }
}
