//! Agent contract and built-in agents.
//!
//! An agent is any unit that declares capabilities through [`Agent::info`]
//! and executes them through [`Agent::invoke`]. Agents are stateless: all
//! mutable data lives in the [`Session`] they are handed. Failures are
//! encoded in the returned [`InvokeResult`] rather than raised.

mod reverse;
mod uppercase;

pub use reverse::ReverseAgent;
pub use uppercase::UppercaseAgent;

use serde_json::{Map, Value};
use tracing::warn;

use crate::session::Session;
use crate::types::{AgentInfo, EntryType, ErrorCode, InvokeResult};

/// A callable unit with declared capabilities.
pub trait Agent: Send + Sync {
    /// Metadata about this agent: identity, version, capability set.
    ///
    /// Must be pure and cheap; the dispatcher calls it at registration
    /// time and may call it again at any point.
    fn info(&self) -> AgentInfo;

    /// Execute a capability against the session.
    ///
    /// May read and write state, append trajectory entries, and touch
    /// artifacts. Error conditions must come back as a failed
    /// [`InvokeResult`]; a capability the agent does not advertise must
    /// yield [`ErrorCode::UnknownCapability`].
    fn invoke(
        &self,
        capability: &str,
        session: &mut Session,
        params: &Map<String, Value>,
    ) -> InvokeResult;

    /// Standard failure for a capability this agent does not handle.
    fn unknown_capability(&self, capability: &str) -> InvokeResult {
        let info = self.info();
        let available: Vec<&String> = info.capabilities.iter().collect();
        InvokeResult::fail(
            info.agent_id.clone(),
            capability,
            ErrorCode::UnknownCapability,
            format!("unknown capability '{capability}', available: {available:?}"),
        )
    }
}

/// Extract the `key` parameter naming the state entry an agent operates on.
///
/// Returns the ready-made failure result when the parameter is missing or
/// not a string.
pub(crate) fn state_key_param(
    agent_id: &str,
    capability: &str,
    params: &Map<String, Value>,
) -> Result<String, InvokeResult> {
    match params.get("key") {
        Some(Value::String(key)) if !key.is_empty() => Ok(key.clone()),
        Some(other) => Err(InvokeResult::fail(
            agent_id,
            capability,
            ErrorCode::AgentError,
            format!("parameter 'key' must be a non-empty string, got {other}"),
        )),
        None => Err(InvokeResult::fail(
            agent_id,
            capability,
            ErrorCode::AgentError,
            "missing required parameter: key",
        )),
    }
}

/// Record a trajectory entry on behalf of an agent.
///
/// Content built by the agents is always a fresh JSON object and the agent
/// ids are non-empty constants, so append cannot reject it; a failure here
/// is logged rather than propagated.
pub(crate) fn record(session: &mut Session, agent_id: &str, entry_type: EntryType, content: Value) {
    if let Err(err) = session.append(agent_id, entry_type, content) {
        warn!(%err, agent_id, "failed to record agent trajectory entry");
    }
}
