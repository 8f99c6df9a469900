//! Built-in agent that reverses a string stored in session state.

use serde_json::{json, Map, Value};

use super::{record, state_key_param, Agent};
use crate::session::Session;
use crate::types::{AgentInfo, EntryType, ErrorCode, InvokeResult};

const AGENT_ID: &str = "reverse_agent";
const CAPABILITY: &str = "reverse";

/// Reverses the string at `params.key`, writing the result back in place.
///
/// Reports `{original, reversed}` on success. Serves as the reference
/// implementation of the [`Agent`] contract.
pub struct ReverseAgent;

impl Agent for ReverseAgent {
    fn info(&self) -> AgentInfo {
        AgentInfo::new(AGENT_ID, "Reverse Agent", "1.0.0", &[CAPABILITY])
            .with_description("Reverses text stored in session state")
    }

    fn invoke(
        &self,
        capability: &str,
        session: &mut Session,
        params: &Map<String, Value>,
    ) -> InvokeResult {
        if capability != CAPABILITY {
            return self.unknown_capability(capability);
        }

        let key = match state_key_param(AGENT_ID, capability, params) {
            Ok(key) => key,
            Err(failure) => return failure,
        };

        let original = match session.get(&key) {
            Some(Value::String(text)) => text,
            Some(other) => {
                return InvokeResult::fail(
                    AGENT_ID,
                    capability,
                    ErrorCode::AgentError,
                    format!("value at '{key}' must be a string, got {other}"),
                );
            }
            None => {
                return InvokeResult::fail(
                    AGENT_ID,
                    capability,
                    ErrorCode::AgentError,
                    format!("no value found at key '{key}'"),
                );
            }
        };

        record(
            session,
            AGENT_ID,
            EntryType::AgentInvoked,
            json!({"capability": capability, "params": params, "input_value": original}),
        );

        let reversed: String = original.chars().rev().collect();
        if let Err(err) = session.set(&key, &reversed) {
            record(
                session,
                AGENT_ID,
                EntryType::AgentFailed,
                json!({"capability": capability, "error": err.to_string()}),
            );
            return InvokeResult::fail(AGENT_ID, capability, ErrorCode::AgentError, err.to_string());
        }

        record(
            session,
            AGENT_ID,
            EntryType::AgentCompleted,
            json!({"capability": capability, "original": original, "reversed": reversed}),
        );

        InvokeResult::ok(
            AGENT_ID,
            capability,
            json!({"original": original, "reversed": reversed}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_params(key: &str) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("key".to_string(), json!(key));
        params
    }

    #[test]
    fn reverses_text_in_place() {
        let mut session = Session::new();
        session.set("text", "hello").unwrap();

        let result = ReverseAgent.invoke("reverse", &mut session, &key_params("text"));

        assert!(result.success);
        assert_eq!(result.result, Some(json!({"original": "hello", "reversed": "olleh"})));
        assert_eq!(session.get("text"), Some(json!("olleh")));
        assert_eq!(session.state_version(), 2);
    }

    #[test]
    fn records_invoked_and_completed_entries() {
        let mut session = Session::new();
        session.set("text", "ab").unwrap();

        ReverseAgent.invoke("reverse", &mut session, &key_params("text"));

        let types: Vec<EntryType> = session.trajectory().iter().map(|e| e.entry_type).collect();
        assert_eq!(
            types,
            vec![
                EntryType::SessionCreated,
                EntryType::StateSet,
                EntryType::AgentInvoked,
                EntryType::StateSet,
                EntryType::AgentCompleted,
            ]
        );
        assert!(session
            .trajectory()
            .iter()
            .filter(|e| e.agent_id == AGENT_ID)
            .count()
            >= 2);
    }

    #[test]
    fn handles_multibyte_text() {
        let mut session = Session::new();
        session.set("text", "héllo").unwrap();

        let result = ReverseAgent.invoke("reverse", &mut session, &key_params("text"));

        assert!(result.success);
        assert_eq!(session.get("text"), Some(json!("olléh")));
    }

    #[test]
    fn fails_on_missing_key() {
        let mut session = Session::new();

        let result = ReverseAgent.invoke("reverse", &mut session, &key_params("absent"));

        assert!(!result.success);
        assert_eq!(result.error.unwrap().code, ErrorCode::AgentError);
    }

    #[test]
    fn fails_on_non_string_value() {
        let mut session = Session::new();
        session.set("num", 42).unwrap();

        let result = ReverseAgent.invoke("reverse", &mut session, &key_params("num"));

        assert!(!result.success);
        assert_eq!(session.get("num"), Some(json!(42)));
    }

    #[test]
    fn rejects_unknown_capability() {
        let mut session = Session::new();
        let result = ReverseAgent.invoke("uppercase", &mut session, &Map::new());
        assert_eq!(result.error.unwrap().code, ErrorCode::UnknownCapability);
    }
}
