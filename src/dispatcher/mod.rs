//! Capability routing and sequential dispatch.
//!
//! The dispatcher maps capability names to registered agents and drives
//! their execution against a session. Each capability belongs to at most
//! one agent; conflicts are rejected at registration time. Dispatch is
//! strictly sequential with fail-fast semantics, and every routed call is
//! bracketed by `capability_dispatched` trajectory entries.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::session::Session;
use crate::types::{
    AgentInfo, CapabilityCall, EntryType, ErrorCode, InvokeError, InvokeResult,
};

/// Attribution used for dispatcher-generated trajectory entries.
pub const DISPATCHER_AGENT_ID: &str = "dispatcher";

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while registering an agent.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The capability already belongs to another registered agent.
    #[error("capability '{capability}' is already registered to agent '{agent_id}'")]
    DuplicateCapability { capability: String, agent_id: String },

    /// The agent's declared metadata failed validation.
    #[error("invalid agent metadata: {reason}")]
    InvalidAgent { reason: String },
}

impl RegisterError {
    /// The wire-level error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            RegisterError::DuplicateCapability { .. } => ErrorCode::DuplicateCapability,
            RegisterError::InvalidAgent { .. } => ErrorCode::AgentError,
        }
    }
}

// ============================================================================
// Sequence Result
// ============================================================================

/// Aggregate outcome of [`Dispatcher::dispatch_sequence`].
///
/// On failure, `failed_at` is the index of the first failed call, `error`
/// is that call's error, and `results` ends with the failing result so the
/// caller can inspect it.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceResult {
    pub success: bool,
    pub failed_at: Option<usize>,
    pub error: Option<InvokeError>,
    pub results: Vec<InvokeResult>,
}

// ============================================================================
// Dispatcher
// ============================================================================

struct Registration {
    agent_id: String,
    agent: Arc<dyn Agent>,
}

/// Routes capability calls to registered agents.
#[derive(Default)]
pub struct Dispatcher {
    by_capability: BTreeMap<String, Registration>,
    infos: BTreeMap<String, AgentInfo>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register an agent for every capability it declares.
    ///
    /// All-or-nothing: if any declared capability is already taken, nothing
    /// is registered. Re-registering a capability requires an explicit
    /// [`Dispatcher::unregister`] first.
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Result<(), RegisterError> {
        let info = agent.info();
        info.validate()
            .map_err(|reason| RegisterError::InvalidAgent { reason })?;

        for capability in &info.capabilities {
            if let Some(existing) = self.by_capability.get(capability) {
                return Err(RegisterError::DuplicateCapability {
                    capability: capability.clone(),
                    agent_id: existing.agent_id.clone(),
                });
            }
        }

        for capability in &info.capabilities {
            self.by_capability.insert(
                capability.clone(),
                Registration {
                    agent_id: info.agent_id.clone(),
                    agent: Arc::clone(&agent),
                },
            );
        }

        debug!(agent_id = %info.agent_id, capabilities = ?info.capabilities, "agent registered");
        self.infos.insert(info.agent_id.clone(), info);
        Ok(())
    }

    /// Remove an agent and all of its capabilities.
    ///
    /// Returns `false` (and changes nothing) when the agent is unknown.
    pub fn unregister(&mut self, agent_id: &str) -> bool {
        if self.infos.remove(agent_id).is_none() {
            return false;
        }
        self.by_capability.retain(|_, reg| reg.agent_id != agent_id);
        debug!(agent_id, "agent unregistered");
        true
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// All registered capability names, sorted.
    #[must_use]
    pub fn get_capabilities(&self) -> Vec<String> {
        self.by_capability.keys().cloned().collect()
    }

    /// Metadata for every registered agent.
    #[must_use]
    pub fn get_agents(&self) -> Vec<AgentInfo> {
        self.infos.values().cloned().collect()
    }

    /// Whether a capability is registered.
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.by_capability.contains_key(capability)
    }

    /// Metadata for the agent owning a capability.
    #[must_use]
    pub fn agent_for_capability(&self, capability: &str) -> Option<&AgentInfo> {
        let registration = self.by_capability.get(capability)?;
        self.infos.get(&registration.agent_id)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Route one capability call to its agent and return the result.
    ///
    /// The call is bracketed by `capability_dispatched` entries attributed
    /// to the dispatcher: `started` before the agent runs, then `completed`
    /// or `failed` after it returns. Entries the agent appends itself land
    /// between the two markers — guaranteed by the session being driven
    /// from a single thread, not by any protocol-level check. An unknown
    /// capability yields one `status: "unknown"` entry and a failed result.
    ///
    /// A panicking agent is caught and converted into an `AGENT_ERROR`
    /// result; whatever the agent mutated before panicking stays in place.
    pub fn dispatch_single(
        &self,
        capability: &str,
        session: &mut Session,
        params: &Map<String, Value>,
    ) -> InvokeResult {
        let Some(registration) = self.by_capability.get(capability) else {
            warn!(capability, "dispatch requested for unknown capability");
            record(
                session,
                json!({"capability": capability, "status": "unknown"}),
            );
            return InvokeResult::fail(
                DISPATCHER_AGENT_ID,
                capability,
                ErrorCode::UnknownCapability,
                format!("no agent registered for capability '{capability}'"),
            )
            .with_error_details(json!({"available_capabilities": self.get_capabilities()}));
        };

        debug!(capability, agent_id = %registration.agent_id, "dispatching");
        record(
            session,
            json!({
                "capability": capability,
                "agent_id": registration.agent_id,
                "status": "started",
            }),
        );

        let invocation = panic::catch_unwind(AssertUnwindSafe(|| {
            registration.agent.invoke(capability, session, params)
        }));
        let result = invocation.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            warn!(capability, agent_id = %registration.agent_id, %message, "agent panicked");
            InvokeResult::fail(
                registration.agent_id.clone(),
                capability,
                ErrorCode::AgentError,
                format!("agent panicked: {message}"),
            )
        });

        let status = if result.success { "completed" } else { "failed" };
        record(
            session,
            json!({
                "capability": capability,
                "agent_id": registration.agent_id,
                "status": status,
            }),
        );
        result
    }

    /// Execute capability calls strictly in order, stopping at the first
    /// failure.
    ///
    /// The failing call's result is included in `results`; calls after it
    /// never run. An empty call list succeeds with no results.
    pub fn dispatch_sequence(
        &self,
        calls: &[CapabilityCall],
        session: &mut Session,
    ) -> SequenceResult {
        let mut results = Vec::with_capacity(calls.len());

        for (index, call) in calls.iter().enumerate() {
            let result = self.dispatch_single(&call.capability, session, &call.params);
            let failed = !result.success;
            let error = result.error.clone();
            results.push(result);

            if failed {
                return SequenceResult {
                    success: false,
                    failed_at: Some(index),
                    error,
                    results,
                };
            }
        }

        SequenceResult {
            success: true,
            failed_at: None,
            error: None,
            results,
        }
    }
}

/// Record a `capability_dispatched` entry attributed to the dispatcher.
///
/// Content is always a freshly-built object, so append cannot reject it; a
/// failure here is logged rather than propagated.
fn record(session: &mut Session, content: Value) {
    if let Err(err) = session.append(
        DISPATCHER_AGENT_ID,
        EntryType::CapabilityDispatched,
        content,
    ) {
        warn!(%err, "failed to record dispatch entry");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
