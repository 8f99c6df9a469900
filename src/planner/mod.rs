//! LLM-backed planning: natural language in, ordered capability calls out.
//!
//! The planner knows which capabilities are available, prompts the LLM for
//! a bare JSON array of capability calls, validates the plan, and records
//! it in the session trajectory. It never executes anything; that is the
//! dispatcher's job.

use serde_json::json;
use tracing::{debug, warn};

use crate::llm::LlmProvider;
use crate::session::Session;
use crate::types::{CapabilityCall, EntryType, ErrorCode, InvokeError};

/// Attribution used for planner-generated trajectory entries.
pub const PLANNER_AGENT_ID: &str = "planner";

// ============================================================================
// Plan Result
// ============================================================================

/// Outcome of a planning request.
#[derive(Debug)]
pub struct PlanResult {
    pub success: bool,
    /// Ordered calls to execute; empty when the request maps to nothing.
    pub calls: Vec<CapabilityCall>,
    pub error: Option<InvokeError>,
    /// Raw LLM response text, kept for debugging failed parses.
    pub raw_response: Option<String>,
}

impl PlanResult {
    fn ok(calls: Vec<CapabilityCall>, raw_response: Option<String>) -> Self {
        Self {
            success: true,
            calls,
            error: None,
            raw_response,
        }
    }

    fn fail(error: InvokeError, raw_response: Option<String>) -> Self {
        Self {
            success: false,
            calls: Vec::new(),
            error: Some(error),
            raw_response,
        }
    }
}

// ============================================================================
// Planner
// ============================================================================

/// Converts user prompts into capability call sequences using an LLM.
pub struct Planner {
    provider: Box<dyn LlmProvider>,
    capabilities: Vec<String>,
}

impl Planner {
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self {
            provider,
            capabilities: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn set_capabilities(&mut self, capabilities: Vec<String>) {
        self.capabilities = capabilities;
    }

    pub fn add_capability(&mut self, capability: impl Into<String>) {
        let capability = capability.into();
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
    }

    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Generate a plan for `prompt`.
    ///
    /// When a session is supplied, a successful plan is recorded as a
    /// `plan_generated` entry with `{prompt, calls, model}`.
    pub fn plan(&self, prompt: &str, session: Option<&mut Session>) -> PlanResult {
        if self.capabilities.is_empty() {
            return PlanResult::fail(
                InvokeError::new(
                    ErrorCode::PlanParseError,
                    "no capabilities available; register agents before planning",
                ),
                None,
            );
        }

        let system = self.system_prompt();
        let response = match self.provider.complete(prompt, Some(&system)) {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "planner llm call failed");
                return PlanResult::fail(
                    InvokeError::new(ErrorCode::LlmError, err.to_string()),
                    None,
                );
            }
        };

        let raw = response.text.trim().to_string();
        let calls = match parse_calls(&raw) {
            Ok(calls) => calls,
            Err(reason) => {
                return PlanResult::fail(
                    InvokeError::new(
                        ErrorCode::PlanParseError,
                        format!("failed to parse plan: {reason}"),
                    )
                    .with_details(json!({"raw_response": raw})),
                    Some(raw),
                );
            }
        };

        if let Some(unknown) = calls
            .iter()
            .find(|call| !self.capabilities.contains(&call.capability))
        {
            return PlanResult::fail(
                InvokeError::new(
                    ErrorCode::PlanParseError,
                    format!(
                        "plan references unknown capability '{}', available: {:?}",
                        unknown.capability, self.capabilities
                    ),
                )
                .with_details(json!({"raw_response": raw})),
                Some(raw),
            );
        }

        debug!(calls = calls.len(), model = %response.model, "plan generated");
        if let Some(session) = session {
            let content = json!({
                "prompt": prompt,
                "calls": calls,
                "model": response.model,
            });
            if let Err(err) = session.append(PLANNER_AGENT_ID, EntryType::PlanGenerated, content) {
                warn!(%err, "failed to record plan entry");
            }
        }

        PlanResult::ok(calls, Some(raw))
    }

    fn system_prompt(&self) -> String {
        let listing: String = self
            .capabilities
            .iter()
            .map(|c| format!("- {c}\n"))
            .collect();
        format!(
            "You are a planning assistant that converts user requests into a \
sequence of capability calls.\n\n\
Available capabilities:\n{listing}\n\
Each capability call must have this format:\n\
{{\"capability\": \"capability_name\", \"params\": {{\"key\": \"text\"}}}}\n\n\
The \"key\" parameter names the state entry to operate on; use \"text\" as \
the default key.\n\n\
Rules:\n\
- Return ONLY a JSON array of capability call objects, no other text\n\
- List the calls in execution order\n\
- If the request matches no capabilities, return an empty array []\n\n\
Example request: \"reverse the text and make it uppercase\"\n\
Example output: [{{\"capability\": \"reverse\", \"params\": {{\"key\": \"text\"}}}}, \
{{\"capability\": \"uppercase\", \"params\": {{\"key\": \"text\"}}}}]"
        )
    }
}

/// Extract a JSON array of capability calls from LLM output.
///
/// Models often wrap the array in prose; take everything between the first
/// `[` and the last `]` and parse that strictly.
fn parse_calls(text: &str) -> Result<Vec<CapabilityCall>, String> {
    let (start, end) = match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            // A refusal like "no capabilities apply" maps to an empty plan.
            let lowered = text.to_lowercase();
            if ["empty", "none", "no "].iter().any(|w| lowered.contains(w)) {
                return Ok(Vec::new());
            }
            return Err(format!("no JSON array found in response: {text:.200}"));
        }
    };

    let slice = &text[start..=end];
    let calls: Vec<CapabilityCall> =
        serde_json::from_str(slice).map_err(|e| format!("invalid JSON: {e}"))?;

    if let Some(call) = calls.iter().find(|c| c.capability.trim().is_empty()) {
        return Err(format!("call has empty capability name: {call:?}"));
    }
    Ok(calls)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, LlmResponse};

    /// Provider that replays a canned response.
    struct StubProvider {
        reply: Result<String, String>,
    }

    impl StubProvider {
        fn text(reply: &str) -> Box<Self> {
            Box::new(Self {
                reply: Ok(reply.to_string()),
            })
        }

        fn failing(message: &str) -> Box<Self> {
            Box::new(Self {
                reply: Err(message.to_string()),
            })
        }
    }

    impl LlmProvider for StubProvider {
        fn model_name(&self) -> &str {
            "stub"
        }

        fn complete(&self, _prompt: &str, _system: Option<&str>) -> Result<LlmResponse, LlmError> {
            match &self.reply {
                Ok(text) => Ok(LlmResponse {
                    text: text.clone(),
                    model: "stub".to_string(),
                    usage: None,
                }),
                Err(message) => Err(LlmError::Api {
                    status: 500,
                    message: message.clone(),
                }),
            }
        }
    }

    fn planner_with(reply: Box<StubProvider>) -> Planner {
        Planner::new(reply)
            .with_capabilities(vec!["reverse".to_string(), "uppercase".to_string()])
    }

    #[test]
    fn plan_parses_array_with_surrounding_prose() {
        let planner = planner_with(StubProvider::text(
            "Sure! Here is the plan:\n[{\"capability\": \"reverse\", \"params\": {\"key\": \"text\"}}]\nDone.",
        ));

        let result = planner.plan("reverse it", None);

        assert!(result.success);
        assert_eq!(result.calls.len(), 1);
        assert_eq!(result.calls[0].capability, "reverse");
        assert_eq!(result.calls[0].params["key"], "text");
    }

    #[test]
    fn plan_records_trajectory_entry() {
        let planner = planner_with(StubProvider::text(
            "[{\"capability\": \"uppercase\", \"params\": {\"key\": \"text\"}}]",
        ));
        let mut session = Session::new();

        let result = planner.plan("shout it", Some(&mut session));
        assert!(result.success);

        let entry = session.trajectory().last().unwrap();
        assert_eq!(entry.entry_type, EntryType::PlanGenerated);
        assert_eq!(entry.agent_id, PLANNER_AGENT_ID);
        assert_eq!(entry.content["prompt"], json!("shout it"));
        assert_eq!(entry.content["model"], json!("stub"));
        assert_eq!(entry.content["calls"][0]["capability"], json!("uppercase"));
    }

    #[test]
    fn plan_rejects_unknown_capability() {
        let planner = planner_with(StubProvider::text(
            "[{\"capability\": \"translate\", \"params\": {}}]",
        ));

        let result = planner.plan("translate it", None);

        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.code, ErrorCode::PlanParseError);
        assert!(error.message.contains("translate"));
    }

    #[test]
    fn plan_surfaces_llm_failure() {
        let planner = planner_with(StubProvider::failing("server on fire"));

        let result = planner.plan("anything", None);

        assert!(!result.success);
        assert_eq!(result.error.unwrap().code, ErrorCode::LlmError);
    }

    #[test]
    fn plan_without_capabilities_fails() {
        let planner = Planner::new(StubProvider::text("[]"));
        let result = planner.plan("anything", None);
        assert!(!result.success);
    }

    #[test]
    fn plan_with_malformed_json_fails() {
        let planner = planner_with(StubProvider::text("[{\"capability\": ]"));

        let result = planner.plan("anything", None);

        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.code, ErrorCode::PlanParseError);
        assert!(error.details.is_some());
    }

    #[test]
    fn refusal_text_maps_to_empty_plan() {
        let planner = planner_with(StubProvider::text("There are no matching capabilities."));

        let result = planner.plan("make coffee", None);

        assert!(result.success);
        assert!(result.calls.is_empty());
    }

    #[test]
    fn add_capability_deduplicates() {
        let mut planner = Planner::new(StubProvider::text("[]"));
        planner.add_capability("reverse");
        planner.add_capability("reverse");
        assert_eq!(planner.capabilities(), ["reverse".to_string()]);
    }

    #[test]
    fn system_prompt_lists_capabilities() {
        let planner = planner_with(StubProvider::text("[]"));
        let prompt = planner.system_prompt();
        assert!(prompt.contains("- reverse"));
        assert!(prompt.contains("- uppercase"));
        assert!(prompt.contains("JSON array"));
    }
}
