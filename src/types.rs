//! Core value types shared by sessions, agents, and the dispatcher.
//!
//! Everything here is a plain serializable value: trajectory entries are
//! immutable once created, invocation results carry either data or a
//! structured error, and error codes form a closed set so callers can
//! match on them programmatically.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ============================================================================
// Entry Types
// ============================================================================

/// Classification of trajectory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Session was initialized.
    SessionCreated,
    /// A state key was set or updated.
    StateSet,
    /// A state key was removed.
    StateDeleted,
    /// An artifact was stored.
    ArtifactWritten,
    /// An artifact was removed.
    ArtifactDeleted,
    /// An agent capability was called.
    AgentInvoked,
    /// An agent finished execution.
    AgentCompleted,
    /// An agent encountered an error.
    AgentFailed,
    /// The dispatcher routed a capability call.
    CapabilityDispatched,
    /// The planner produced a capability call sequence.
    PlanGenerated,
    /// Free-form entry for callers with their own semantics.
    Custom,
}

impl EntryType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::SessionCreated => "session_created",
            EntryType::StateSet => "state_set",
            EntryType::StateDeleted => "state_deleted",
            EntryType::ArtifactWritten => "artifact_written",
            EntryType::ArtifactDeleted => "artifact_deleted",
            EntryType::AgentInvoked => "agent_invoked",
            EntryType::AgentCompleted => "agent_completed",
            EntryType::AgentFailed => "agent_failed",
            EntryType::CapabilityDispatched => "capability_dispatched",
            EntryType::PlanGenerated => "plan_generated",
            EntryType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unrecognized entry type tag.
#[derive(Debug, Error)]
#[error("unknown entry type: {0}")]
pub struct UnknownEntryType(pub String);

impl std::str::FromStr for EntryType {
    type Err = UnknownEntryType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "session_created" => EntryType::SessionCreated,
            "state_set" => EntryType::StateSet,
            "state_deleted" => EntryType::StateDeleted,
            "artifact_written" => EntryType::ArtifactWritten,
            "artifact_deleted" => EntryType::ArtifactDeleted,
            "agent_invoked" => EntryType::AgentInvoked,
            "agent_completed" => EntryType::AgentCompleted,
            "agent_failed" => EntryType::AgentFailed,
            "capability_dispatched" => EntryType::CapabilityDispatched,
            "plan_generated" => EntryType::PlanGenerated,
            "custom" => EntryType::Custom,
            other => return Err(UnknownEntryType(other.to_string())),
        })
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Closed set of error codes surfaced by the substrate and its collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidKey,
    InvalidValue,
    InvalidName,
    ArtifactNotFound,
    ArtifactTooLarge,
    UnknownCapability,
    DuplicateCapability,
    AgentError,
    PersistenceError,
    LlmError,
    PlanParseError,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidKey => "INVALID_KEY",
            ErrorCode::InvalidValue => "INVALID_VALUE",
            ErrorCode::InvalidName => "INVALID_NAME",
            ErrorCode::ArtifactNotFound => "ARTIFACT_NOT_FOUND",
            ErrorCode::ArtifactTooLarge => "ARTIFACT_TOO_LARGE",
            ErrorCode::UnknownCapability => "UNKNOWN_CAPABILITY",
            ErrorCode::DuplicateCapability => "DUPLICATE_CAPABILITY",
            ErrorCode::AgentError => "AGENT_ERROR",
            ErrorCode::PersistenceError => "PERSISTENCE_ERROR",
            ErrorCode::LlmError => "LLM_ERROR",
            ErrorCode::PlanParseError => "PLAN_PARSE_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Trajectory Entry
// ============================================================================

/// An immutable record of one action or event in a session's trajectory.
///
/// Entries are assigned their sequence number and timestamp by the session
/// at append time; sequence numbers are dense and start at 1. Cloning an
/// entry is a deep copy, so handing clones out never exposes session
/// internals to mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryEntry {
    /// Dense, strictly increasing sequence number (1-indexed).
    pub seq_num: u64,
    /// UTC instant the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// Who produced the entry ("system" for session-internal mutations).
    pub agent_id: String,
    pub entry_type: EntryType,
    /// Type-specific payload; always a JSON object.
    pub content: Value,
}

// ============================================================================
// Invocation Results
// ============================================================================

/// Structured error carried inside a failed [`InvokeResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeError {
    #[serde(rename = "error_code")]
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl InvokeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for InvokeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of invoking an agent capability.
///
/// Exactly one of `result` and `error` is populated, matching `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<InvokeError>,
    pub agent_id: String,
    pub capability: String,
}

impl InvokeResult {
    /// Create a successful result.
    #[must_use]
    pub fn ok(agent_id: impl Into<String>, capability: impl Into<String>, result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            agent_id: agent_id.into(),
            capability: capability.into(),
        }
    }

    /// Create a failed result.
    #[must_use]
    pub fn fail(
        agent_id: impl Into<String>,
        capability: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(InvokeError::new(code, message)),
            agent_id: agent_id.into(),
            capability: capability.into(),
        }
    }

    /// Attach details to the error of a failed result.
    #[must_use]
    pub fn with_error_details(mut self, details: Value) -> Self {
        if let Some(error) = self.error.take() {
            self.error = Some(error.with_details(details));
        }
        self
    }
}

// ============================================================================
// Capability Calls
// ============================================================================

/// A request to invoke a named capability with parameters.
///
/// This is what the planner produces and the dispatcher consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCall {
    pub capability: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl CapabilityCall {
    pub fn new(capability: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            capability: capability.into(),
            params,
        }
    }
}

// ============================================================================
// Agent Info
// ============================================================================

/// Metadata an agent declares about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub name: String,
    pub version: String,
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
}

impl AgentInfo {
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        capabilities: &[&str],
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            version: version.into(),
            capabilities: capabilities.iter().map(|c| (*c).to_string()).collect(),
            description: String::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check that the metadata is usable for registration.
    pub fn validate(&self) -> Result<(), String> {
        if self.agent_id.trim().is_empty() {
            return Err("agent_id must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.capabilities.is_empty() {
            return Err("capabilities must not be empty".to_string());
        }
        if self.capabilities.iter().any(|c| c.trim().is_empty()) {
            return Err("capability names must not be empty".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
