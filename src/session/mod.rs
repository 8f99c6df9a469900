//! Session: versioned key-value state, append-only trajectory, and a
//! size-bounded artifact store behind one coordinating object.
//!
//! Every accepted mutation appends exactly one trajectory entry with a dense
//! sequence number and a coherent state version. Values cross the session
//! boundary as owned deep copies, so callers can never reach into live
//! state. Sessions persist to a single-file SQLite database and reload with
//! full fidelity.

mod error;
mod persist;
mod snapshot;

pub use error::{Result, SessionError};
pub use snapshot::SessionSnapshot;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::types::{EntryType, TrajectoryEntry};

/// Persistence format version, embedded at creation and checked on load.
pub const SCHEMA_VERSION: i64 = 1;

/// Default ceiling for a single artifact (100 MiB).
pub const DEFAULT_MAX_ARTIFACT_SIZE: u64 = 100 * 1024 * 1024;

/// Attribution used for session-internal trajectory entries.
pub const SYSTEM_AGENT_ID: &str = "system";

// ============================================================================
// Options
// ============================================================================

/// Construction options for [`Session::with_options`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Preset session id; a UUID v4 is generated when absent.
    pub session_id: Option<String>,
    /// Artifact size ceiling in bytes; defaults to 100 MiB.
    pub max_artifact_size: Option<u64>,
}

/// Filter for [`Session::query_trajectory`].
///
/// `since_seq` keeps entries with `seq_num > since_seq`, `entry_type`
/// restricts to one type, and `limit` truncates to the newest N matches
/// (results stay in ascending order).
#[derive(Debug, Clone, Default)]
pub struct TrajectoryQuery {
    pub since_seq: Option<u64>,
    pub entry_type: Option<EntryType>,
    pub limit: Option<usize>,
}

// ============================================================================
// Session
// ============================================================================

/// The unit of execution, audit, and persistence.
///
/// A session is single-owner and synchronous: it is not safe for concurrent
/// mutation, and callers that need to share one across threads must wrap it
/// in their own lock.
#[derive(Debug, Clone)]
pub struct Session {
    session_id: String,
    max_artifact_size: u64,
    state: BTreeMap<String, Value>,
    state_version: u64,
    trajectory: Vec<TrajectoryEntry>,
    next_seq_num: u64,
    artifacts: BTreeMap<String, Vec<u8>>,
}

impl Session {
    /// Create a session with a generated id and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(SessionOptions::default())
    }

    /// Create a session with explicit options.
    #[must_use]
    pub fn with_options(options: SessionOptions) -> Self {
        let session_id = options
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let max_artifact_size = options.max_artifact_size.unwrap_or(DEFAULT_MAX_ARTIFACT_SIZE);

        let mut session = Self {
            session_id,
            max_artifact_size,
            state: BTreeMap::new(),
            state_version: 0,
            trajectory: Vec::new(),
            next_seq_num: 1,
            artifacts: BTreeMap::new(),
        };

        let content = json!({
            "session_id": session.session_id,
            "max_artifact_size": session.max_artifact_size,
            "schema_version": SCHEMA_VERSION,
        });
        session.append_internal(SYSTEM_AGENT_ID, EntryType::SessionCreated, content);
        session
    }

    /// Internal constructor used by the persistence engine.
    pub(crate) fn restore(
        session_id: String,
        max_artifact_size: u64,
        state: BTreeMap<String, Value>,
        state_version: u64,
        trajectory: Vec<TrajectoryEntry>,
        artifacts: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        let next_seq_num = trajectory.last().map_or(1, |e| e.seq_num + 1);
        Self {
            session_id,
            max_artifact_size,
            state,
            state_version,
            trajectory,
            next_seq_num,
            artifacts,
        }
    }

    /// Unique identifier for this session.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Configured ceiling for a single artifact, in bytes.
    #[must_use]
    pub fn max_artifact_size(&self) -> u64 {
        self.max_artifact_size
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Set a state value, returning the new state version.
    ///
    /// The value is converted to JSON once on the way in, which both
    /// validates it and makes the stored copy independent of the caller's
    /// data. Records a `state_set` trajectory entry.
    pub fn set(&mut self, key: &str, value: impl Serialize) -> Result<u64> {
        if key.is_empty() {
            return Err(SessionError::InvalidKey);
        }

        let value = serde_json::to_value(value)
            .map_err(|e| SessionError::invalid_value(format!("not JSON-serializable: {e}")))?;

        let old_value = self.state.get(key).cloned().unwrap_or(Value::Null);
        self.state.insert(key.to_string(), value.clone());
        self.state_version += 1;

        let content = json!({
            "key": key,
            "old_value": old_value,
            "new_value": value,
            "state_version": self.state_version,
        });
        self.append_internal(SYSTEM_AGENT_ID, EntryType::StateSet, content);

        debug!(key, state_version = self.state_version, "state set");
        Ok(self.state_version)
    }

    /// Get a state value as an owned deep copy.
    ///
    /// Pure read: no version bump, no trajectory entry. Mutating the
    /// returned value never affects the session.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.get(key).cloned()
    }

    /// Whether a state key is present.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    /// Delete a state key, returning the new state version.
    ///
    /// Deleting an absent key is a no-op: returns `None` and records
    /// nothing.
    pub fn delete(&mut self, key: &str) -> Option<u64> {
        let old_value = self.state.remove(key)?;
        self.state_version += 1;

        let content = json!({
            "key": key,
            "old_value": old_value,
            "state_version": self.state_version,
        });
        self.append_internal(SYSTEM_AGENT_ID, EntryType::StateDeleted, content);

        debug!(key, state_version = self.state_version, "state deleted");
        Some(self.state_version)
    }

    /// Current state keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.state.keys().cloned().collect()
    }

    /// Deep copy of the whole state map.
    #[must_use]
    pub fn state(&self) -> BTreeMap<String, Value> {
        self.state.clone()
    }

    /// Current state version (0 until the first accepted mutation).
    #[must_use]
    pub fn state_version(&self) -> u64 {
        self.state_version
    }

    // ========================================================================
    // Trajectory
    // ========================================================================

    /// Append an entry attributed to `agent_id`.
    ///
    /// `content` must serialize to a JSON object. Returns a copy of the
    /// created entry.
    pub fn append(
        &mut self,
        agent_id: &str,
        entry_type: EntryType,
        content: impl Serialize,
    ) -> Result<TrajectoryEntry> {
        if agent_id.trim().is_empty() {
            return Err(SessionError::invalid_value("agent_id must not be empty"));
        }

        let content = serde_json::to_value(content)
            .map_err(|e| SessionError::invalid_value(format!("not JSON-serializable: {e}")))?;
        if !content.is_object() {
            return Err(SessionError::invalid_value(
                "trajectory content must be a JSON object",
            ));
        }

        Ok(self.append_internal(agent_id, entry_type, content))
    }

    /// Append without validation; callers guarantee a non-empty agent id
    /// and object-shaped content.
    fn append_internal(
        &mut self,
        agent_id: &str,
        entry_type: EntryType,
        content: Value,
    ) -> TrajectoryEntry {
        let entry = TrajectoryEntry {
            seq_num: self.next_seq_num,
            timestamp: self.next_timestamp(),
            agent_id: agent_id.to_string(),
            entry_type,
            content,
        };
        self.next_seq_num += 1;
        self.trajectory.push(entry.clone());
        entry
    }

    /// Timestamps never go backwards along the trajectory, even if the
    /// wall clock does.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.trajectory.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }

    /// Read-only view of the full trajectory in append order.
    #[must_use]
    pub fn trajectory(&self) -> &[TrajectoryEntry] {
        &self.trajectory
    }

    /// Number of trajectory entries.
    #[must_use]
    pub fn trajectory_len(&self) -> u64 {
        self.trajectory.len() as u64
    }

    /// Look up a single entry by sequence number.
    #[must_use]
    pub fn entry(&self, seq_num: u64) -> Option<&TrajectoryEntry> {
        self.trajectory
            .binary_search_by_key(&seq_num, |e| e.seq_num)
            .ok()
            .map(|index| &self.trajectory[index])
    }

    /// Query the trajectory with filters; see [`TrajectoryQuery`].
    #[must_use]
    pub fn query_trajectory(&self, query: &TrajectoryQuery) -> Vec<TrajectoryEntry> {
        let since = query.since_seq.unwrap_or(0);
        let mut matches: Vec<&TrajectoryEntry> = self
            .trajectory
            .iter()
            .filter(|e| e.seq_num > since)
            .filter(|e| query.entry_type.map_or(true, |t| e.entry_type == t))
            .collect();

        if let Some(limit) = query.limit {
            if matches.len() > limit {
                matches.drain(..matches.len() - limit);
            }
        }

        matches.into_iter().cloned().collect()
    }

    // ========================================================================
    // Artifacts
    // ========================================================================

    /// Store a named byte blob, overwriting any existing entry.
    ///
    /// Records an `artifact_written` entry with the blob's size and SHA-256
    /// digest. A rejected write (empty name, oversized data) leaves the
    /// store untouched and records nothing.
    pub fn write_artifact(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if name.is_empty() {
            return Err(SessionError::InvalidName);
        }

        let size = data.len() as u64;
        if size > self.max_artifact_size {
            return Err(SessionError::ArtifactTooLarge {
                size,
                max: self.max_artifact_size,
            });
        }

        let overwrote = self.artifacts.contains_key(name);
        let digest = format!("{:x}", Sha256::digest(data));
        self.artifacts.insert(name.to_string(), data.to_vec());

        let content = json!({
            "name": name,
            "size": size,
            "sha256": digest,
            "overwrote": overwrote,
        });
        self.append_internal(SYSTEM_AGENT_ID, EntryType::ArtifactWritten, content);

        debug!(name, size, overwrote, "artifact written");
        Ok(())
    }

    /// Read an artifact's bytes.
    ///
    /// The returned slice is immutable; callers that need an owned copy
    /// can `to_vec` it.
    pub fn read_artifact(&self, name: &str) -> Result<&[u8]> {
        self.artifacts
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| SessionError::ArtifactNotFound {
                name: name.to_string(),
            })
    }

    /// Size of an artifact in bytes.
    pub fn artifact_size(&self, name: &str) -> Result<u64> {
        self.read_artifact(name).map(|data| data.len() as u64)
    }

    /// Names of all stored artifacts, sorted.
    #[must_use]
    pub fn list_artifacts(&self) -> Vec<String> {
        self.artifacts.keys().cloned().collect()
    }

    /// Remove an artifact, recording an `artifact_deleted` entry.
    pub fn delete_artifact(&mut self, name: &str) -> Result<()> {
        let data = self
            .artifacts
            .remove(name)
            .ok_or_else(|| SessionError::ArtifactNotFound {
                name: name.to_string(),
            })?;

        let content = json!({
            "name": name,
            "size": data.len() as u64,
        });
        self.append_internal(SYSTEM_AGENT_ID, EntryType::ArtifactDeleted, content);

        debug!(name, "artifact deleted");
        Ok(())
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Build a disconnected view of the session for an observing agent.
    ///
    /// The snapshot owns deep copies of the state and the last `depth`
    /// trajectory entries (all entries when `depth` is `None`), and lists
    /// artifact names without their bytes. Mutating the snapshot never
    /// affects the session, and later session mutations never show up in
    /// a snapshot already taken.
    #[must_use]
    pub fn snapshot_for_agent(&self, agent_id: &str, depth: Option<usize>) -> SessionSnapshot {
        let trajectory = match depth {
            Some(depth) => {
                let start = self.trajectory.len().saturating_sub(depth);
                self.trajectory[start..].to_vec()
            }
            None => self.trajectory.clone(),
        };

        debug!(agent_id, entries = trajectory.len(), "snapshot taken");
        SessionSnapshot {
            session_id: self.session_id.clone(),
            state: self.state.clone(),
            state_version: self.state_version,
            trajectory,
            artifacts: self.list_artifacts(),
            snapshot_time: Utc::now(),
            trajectory_len: self.trajectory_len(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
