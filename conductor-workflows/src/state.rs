//! ABOUTME: Orchestrator rolling state and the partial-update merge contract
//! ABOUTME: Ported from orchestrator.py's `OrchestratorState` TypedDict and its `{**state, **result}` merge idiom

use conductor_agents::{AgentSpec, AgentStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    CreateAgent,
    ModifyAgent,
    ClarificationNeeded,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClarificationNeeded {
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub missing_info: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedIntent {
    pub intent_type: IntentType,
    pub confidence: f64,
    #[serde(default)]
    pub entities: HashMap<String, serde_json::Value>,
    pub clarification_needed: Option<ClarificationNeeded>,
}

/// Outcome of a deployment: where the agent's generated code ran, if at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionContext {
    pub agent_id: Option<String>,
    pub deployed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub container_id: Option<String>,
    pub sandbox_status: Option<String>,
    pub exit_code: Option<i64>,
    /// The structured result blob `extract_result` pulled from the
    /// container's logs, if any.
    pub result: Option<serde_json::Value>,
    /// Last-N lines of stdout+stderr, newest last.
    #[serde(default)]
    pub log_tail: Vec<String>,
}

/// The rolling state threaded through every orchestrator node. Nodes never
/// mutate this directly; they return a [`PartialUpdate`] that the driver
/// merges in, mirroring the original's `{**state, **result}` spread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorState {
    pub user_request: String,
    pub session_id: String,
    pub parsed_intent: Option<ParsedIntent>,
    #[serde(default)]
    pub existing_agents: Vec<AgentSpec>,
    pub agent_spec: Option<AgentSpec>,
    pub generated_code: Option<String>,
    pub deployment_status: DeploymentStatus,
    pub error_message: Option<String>,
    pub execution_context: ExecutionContext,
    #[serde(default)]
    pub retry_count: u32,
    pub needs_clarification: Option<bool>,
    #[serde(default)]
    pub clarification_questions: Vec<String>,
    #[serde(default)]
    pub missing_info: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl conductor_storage::CheckpointPreview for OrchestratorState {
    fn preview_status(&self) -> String {
        serde_json::to_value(self.deployment_status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn preview_request(&self) -> String {
        self.user_request.clone()
    }
}

impl OrchestratorState {
    pub fn new(user_request: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_request: user_request.into(),
            session_id: session_id.into(),
            parsed_intent: None,
            existing_agents: Vec::new(),
            agent_spec: None,
            generated_code: None,
            deployment_status: DeploymentStatus::Pending,
            error_message: None,
            execution_context: ExecutionContext::default(),
            retry_count: 0,
            needs_clarification: None,
            clarification_questions: Vec::new(),
            missing_info: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

/// A point-in-time snapshot returned by `get_agent_status`: the
/// declarative spec's own status plus whatever runtime info is on hand.
#[derive(Debug, Clone)]
pub struct AgentStatusView {
    pub name: String,
    pub spec_status: AgentStatus,
    pub execution: Option<ExecutionContext>,
    pub container_stats: Option<conductor_security::SandboxStats>,
}

/// A node's output: only the fields it touched. `None` means "leave
/// unchanged"; every `Some` overwrites the corresponding state field.
#[derive(Debug, Clone, Default)]
pub struct PartialUpdate {
    pub parsed_intent: Option<Option<ParsedIntent>>,
    pub existing_agents: Option<Vec<AgentSpec>>,
    pub agent_spec: Option<Option<AgentSpec>>,
    pub generated_code: Option<Option<String>>,
    pub deployment_status: Option<DeploymentStatus>,
    pub error_message: Option<Option<String>>,
    pub execution_context: Option<ExecutionContext>,
    pub retry_count: Option<u32>,
    pub needs_clarification: Option<Option<bool>>,
    pub clarification_questions: Option<Vec<String>>,
    pub missing_info: Option<Vec<String>>,
    pub suggestions: Option<Vec<String>>,
    pub user_request: Option<String>,
}

impl PartialUpdate {
    pub fn error(message: impl Into<String>, status: DeploymentStatus, retry_count: u32) -> Self {
        Self {
            error_message: Some(Some(message.into())),
            deployment_status: Some(status),
            retry_count: Some(retry_count),
            ..Default::default()
        }
    }

    /// Apply this update onto `state`, exactly mirroring `{**state, **result}`.
    pub fn merge_into(self, state: &mut OrchestratorState) {
        if let Some(v) = self.parsed_intent {
            state.parsed_intent = v;
        }
        if let Some(v) = self.existing_agents {
            state.existing_agents = v;
        }
        if let Some(v) = self.agent_spec {
            state.agent_spec = v;
        }
        if let Some(v) = self.generated_code {
            state.generated_code = v;
        }
        if let Some(v) = self.deployment_status {
            state.deployment_status = v;
        }
        if let Some(v) = self.error_message {
            state.error_message = v;
        }
        if let Some(v) = self.execution_context {
            state.execution_context = v;
        }
        if let Some(v) = self.retry_count {
            state.retry_count = v;
        }
        if let Some(v) = self.needs_clarification {
            state.needs_clarification = v;
        }
        if let Some(v) = self.clarification_questions {
            state.clarification_questions = v;
        }
        if let Some(v) = self.missing_info {
            state.missing_info = v;
        }
        if let Some(v) = self.suggestions {
            state.suggestions = v;
        }
        if let Some(v) = self.user_request {
            state.user_request = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_only_touches_set_fields() {
        let mut state = OrchestratorState::new("monitor my inbox", "session_1");
        state.retry_count = 2;

        let update = PartialUpdate {
            deployment_status: Some(DeploymentStatus::Failed),
            ..Default::default()
        };
        update.merge_into(&mut state);

        assert_eq!(state.deployment_status, DeploymentStatus::Failed);
        assert_eq!(state.retry_count, 2, "untouched field must survive the merge");
    }

    #[test]
    fn error_update_increments_retry_and_sets_message() {
        let mut state = OrchestratorState::new("x", "s1");
        let update = PartialUpdate::error("boom", DeploymentStatus::Failed, 1);
        update.merge_into(&mut state);
        assert_eq!(state.error_message.as_deref(), Some("boom"));
        assert_eq!(state.retry_count, 1);
    }
}
