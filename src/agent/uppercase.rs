//! Built-in agent that uppercases a string stored in session state.

use serde_json::{json, Map, Value};

use super::{record, state_key_param, Agent};
use crate::session::Session;
use crate::types::{AgentInfo, EntryType, ErrorCode, InvokeResult};

const AGENT_ID: &str = "uppercase_agent";
const CAPABILITY: &str = "uppercase";

/// Uppercases the string at `params.key`, writing the result back in place.
pub struct UppercaseAgent;

impl Agent for UppercaseAgent {
    fn info(&self) -> AgentInfo {
        AgentInfo::new(AGENT_ID, "Uppercase Agent", "1.0.0", &[CAPABILITY])
            .with_description("Uppercases text stored in session state")
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

        let uppercased = original.to_uppercase();
        if let Err(err) = session.set(&key, &uppercased) {
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
            json!({"capability": capability, "original": original, "uppercased": uppercased}),
        );

        InvokeResult::ok(
            AGENT_ID,
            capability,
            json!({"original": original, "uppercased": uppercased}),
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
    fn uppercases_text_in_place() {
        let mut session = Session::new();
        session.set("text", "hello").unwrap();

        let result = UppercaseAgent.invoke("uppercase", &mut session, &key_params("text"));

        assert!(result.success);
        assert_eq!(session.get("text"), Some(json!("HELLO")));
        assert_eq!(
            result.result,
            Some(json!({"original": "hello", "uppercased": "HELLO"}))
        );
    }

    #[test]
    fn already_uppercase_is_stable() {
        let mut session = Session::new();
        session.set("text", "LOUD").unwrap();

        let result = UppercaseAgent.invoke("uppercase", &mut session, &key_params("text"));

        assert!(result.success);
        assert_eq!(session.get("text"), Some(json!("LOUD")));
    }

    #[test]
    fn fails_on_missing_params() {
        let mut session = Session::new();
        let result = UppercaseAgent.invoke("uppercase", &mut session, &Map::new());
        assert_eq!(result.error.unwrap().code, ErrorCode::AgentError);
    }

    #[test]
    fn rejects_unknown_capability() {
        let mut session = Session::new();
        let result = UppercaseAgent.invoke("reverse", &mut session, &Map::new());
        assert_eq!(result.error.unwrap().code, ErrorCode::UnknownCapability);
    }
}
