//! ABOUTME: The checkpointed node pipeline and its top-level entry points
//! ABOUTME: Ported from `HeyJarvisOrchestrator`'s graph, `process_request`, and agent-management methods

use crate::context::ConversationContext;
use crate::deps::OrchestratorDeps;
use crate::nodes::{self, Branch};
use crate::state::{AgentStatusView, DeploymentStatus, OrchestratorState, PartialUpdate};
use conductor_agents::AgentSpec;
use conductor_core::{ConductorError, Result};
use conductor_storage::{CheckpointEnvelope, SessionSummary};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

const CONVERSATION_CONTEXT_TTL_S: u64 = 86_400;
const STOP_GRACE: Duration = Duration::from_secs(10);

/// `(node_name, progress_pct, message)` — fixed per §4.3, shown via the
/// progress callback as each node starts.
const NODE_PROGRESS: &[(&str, u8, &str)] = &[
    ("parse_request", 20, "Understanding your request..."),
    ("understand_intent", 40, "Analyzing intent..."),
    ("check_existing_agents", 60, "Checking existing agents..."),
    ("create_agent", 80, "Creating your agent..."),
    ("deploy_agent", 100, "Deploying agent..."),
];

fn node_progress(name: &str) -> (u8, &'static str) {
    NODE_PROGRESS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, pct, msg)| (*pct, *msg))
        .unwrap_or((0, ""))
}

/// The five nodes in pipeline order, used to resolve where a resumed
/// session should re-enter `run_pipeline`.
const NODE_ORDER: &[&str] = &[
    "parse_request",
    "understand_intent",
    "check_existing_agents",
    "create_agent",
    "deploy_agent",
];

/// Map a checkpoint's `step` to the node `run_pipeline` should (re)start
/// at: a bare node name or an `_error` step means that node never
/// finished and must run again; a `_complete` step advances to whatever
/// follows it (the last node's `_complete` just re-runs itself, since a
/// resumable session by definition hasn't reached `Completed`).
fn resume_from(step: &str) -> &'static str {
    if let Some(node) = step.strip_suffix("_complete") {
        return match NODE_ORDER.iter().position(|n| *n == node) {
            Some(i) if i + 1 < NODE_ORDER.len() => NODE_ORDER[i + 1],
            Some(i) => NODE_ORDER[i],
            None => NODE_ORDER[0],
        };
    }
    let node = step.strip_suffix("_error").unwrap_or(step);
    NODE_ORDER.iter().find(|n| **n == node).copied().unwrap_or(NODE_ORDER[0])
}

pub type ProgressCallback = Arc<dyn Fn(&str, u8, &str) + Send + Sync>;

/// Generic fallback questions when the classifier didn't produce its own,
/// keyed off a coarse keyword match against the raw request text.
fn default_clarification_questions(user_request: &str) -> Vec<String> {
    let lower = user_request.to_lowercase();
    let questions: &[&str] = if lower.contains("monitor") {
        &[
            "What specifically would you like to monitor?",
            "How often should the monitoring happen?",
            "How would you like to be notified?",
        ]
    } else if lower.contains("backup") {
        &[
            "Which files or folders should be backed up?",
            "Where should the backups be stored?",
            "How frequently should backups occur?",
        ]
    } else if lower.contains("social media") {
        &[
            "Which social media platforms?",
            "What type of content or activity?",
            "What actions should be taken?",
        ]
    } else if lower.contains("email") {
        &[
            "Which email account or service?",
            "What types of emails are you interested in?",
            "What should happen when conditions are met?",
        ]
    } else {
        &[
            "What specific task would you like to automate?",
            "What triggers should start this automation?",
            "What outcome are you looking for?",
        ]
    };
    questions.iter().map(|s| s.to_string()).collect()
}

/// Drives the five-node state machine, owns the per-session conversation
/// context cache, and exposes the post-deployment agent management surface.
pub struct Orchestrator {
    deps: OrchestratorDeps,
    progress_callback: Option<ProgressCallback>,
    contexts: Mutex<HashMap<String, ConversationContext>>,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            deps,
            progress_callback: None,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress_callback = Some(callback);
    }

    fn emit_progress(&self, node: &str) {
        if let Some(cb) = &self.progress_callback {
            let (pct, msg) = node_progress(node);
            cb(node, pct, msg);
        }
    }

    /// Checkpoint the pre-node snapshot and emit its progress update.
    async fn checkpoint_before(&self, state: &OrchestratorState, node: &str) {
        self.deps.checkpoints.save(&state.session_id, node, state).await.ok();
        self.emit_progress(node);
    }

    /// Merge a node's result into `state`: on success, clear
    /// `error_message` (every node's success path does this in the
    /// original); on failure, synthesize a retry/exhausted error update.
    /// Either way, checkpoint the outcome.
    async fn apply_node_result(
        &self,
        node: &str,
        state: &mut OrchestratorState,
        retriable_msg: &str,
        result: Result<PartialUpdate>,
    ) {
        match result {
            Ok(update) => {
                update.merge_into(state);
                state.error_message = None;
                self.deps
                    .checkpoints
                    .save(&state.session_id, &format!("{node}_complete"), state)
                    .await
                    .ok();
            }
            Err(e) => {
                error!(node, error = %e, "orchestrator node failed");
                let message = if state.retry_count < self.deps.max_retries {
                    retriable_msg.to_string()
                } else {
                    format!("Failed at {node} after {} attempts: {e}", self.deps.max_retries)
                };
                let update = PartialUpdate::error(message, DeploymentStatus::Failed, state.retry_count + 1);
                update.merge_into(state);
                self.deps
                    .checkpoints
                    .save(&state.session_id, &format!("{node}_error"), state)
                    .await
                    .ok();
            }
        }
    }

    /// Run the five-node pipeline against an already-initialized state,
    /// starting at `start_from` (one of [`NODE_ORDER`]) and skipping every
    /// node before it — so resuming a session re-runs from the last
    /// incomplete step instead of redoing already-completed ones. Fresh
    /// sessions pass `"parse_request"`, the first node. Short-circuits
    /// exactly where the original's `process_request` stream loop does:
    /// right after `understand_intent` sets `needs_clarification`, and at
    /// the `end` branch after `check_existing_agents`.
    async fn run_pipeline(&self, state: &mut OrchestratorState, start_from: &str) -> Result<()> {
        let session = state.session_id.clone();
        let start_idx = NODE_ORDER.iter().position(|n| *n == start_from).unwrap_or(0);

        if start_idx <= 0 {
            self.checkpoint_before(state, "parse_request").await;
            let result = nodes::parse_request(state);
            self.apply_node_result(
                "parse_request",
                state,
                "I couldn't understand that. Could you rephrase?",
                result,
            )
            .await;
        }

        let context = self.contexts.lock().await.get(&session).cloned();

        if start_idx <= 1 {
            self.checkpoint_before(state, "understand_intent").await;
            let result = nodes::understand_intent(&self.deps, state, context.as_ref()).await;
            self.apply_node_result(
                "understand_intent",
                state,
                "I had trouble understanding your request. Could you be more specific?",
                result,
            )
            .await;

            if state.needs_clarification == Some(true) {
                if state.clarification_questions.is_empty() {
                    state.clarification_questions = default_clarification_questions(&state.user_request);
                }
                return Ok(());
            }
        }

        if start_idx <= 2 {
            self.checkpoint_before(state, "check_existing_agents").await;
            let result = nodes::check_existing_agents(&self.deps, state).await;
            self.apply_node_result(
                "check_existing_agents",
                state,
                "Failed to check existing agents, retrying...",
                result,
            )
            .await;

            if matches!(nodes::should_create_or_modify(state), Branch::End) {
                return Ok(());
            }
        }

        if start_idx <= 3 {
            self.checkpoint_before(state, "create_agent").await;
            let result = nodes::create_agent(&self.deps, state).await;
            self.apply_node_result("create_agent", state, "Failed to create agent, retrying...", result)
                .await;
        }

        self.checkpoint_before(state, "deploy_agent").await;
        let result = nodes::deploy_agent(&self.deps, state).await;
        self.apply_node_result("deploy_agent", state, "Failed to deploy agent, retrying...", result)
            .await;

        Ok(())
    }

    async fn load_conversation_context(&self, session_id: &str) {
        let mut contexts = self.contexts.lock().await;
        if contexts.contains_key(session_id) {
            return;
        }
        let key = format!("conversation_context:{session_id}");
        let loaded = match self.deps.store.get(&key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).ok(),
            _ => None,
        };
        contexts
            .entry(session_id.to_string())
            .or_insert_with(|| loaded.unwrap_or_else(|| ConversationContext::new(session_id)));
    }

    async fn save_conversation_context(&self, session_id: &str) {
        let contexts = self.contexts.lock().await;
        let Some(context) = contexts.get(session_id) else {
            return;
        };
        let Ok(payload) = serde_json::to_vec(context) else {
            return;
        };
        let key = format!("conversation_context:{session_id}");
        self.deps.store.setex(&key, CONVERSATION_CONTEXT_TTL_S, payload).await.ok();
    }

    /// Top-level entry point: resumes an in-flight session, processes a
    /// clarification response, or starts a fresh request.
    pub async fn process_request(
        &self,
        user_request: &str,
        session_id: &str,
        clarification_responses: Option<HashMap<String, String>>,
    ) -> Result<OrchestratorState> {
        self.load_conversation_context(session_id).await;

        {
            let mut contexts = self.contexts.lock().await;
            let context = contexts.get_mut(session_id).expect("loaded above");
            if let Some(responses) = &clarification_responses {
                for (question, answer) in responses {
                    context.add_user_message(format!("{question}: {answer}"), 3);
                }
            } else {
                context.add_user_message(user_request, 2);
            }
        }

        let existing_envelope: Option<CheckpointEnvelope<OrchestratorState>> =
            self.deps.checkpoints.load(session_id, None).await?;
        let existing: Option<OrchestratorState> = existing_envelope.as_ref().map(|e| e.state.clone());
        let existing_step: Option<String> = existing_envelope.map(|e| e.step);

        if let (Some(responses), Some(mut state)) = (clarification_responses.clone(), existing.clone()) {
            let clarifications = responses
                .iter()
                .map(|(q, a)| format!("{q}: {a}"))
                .collect::<Vec<_>>()
                .join(" ");
            state.user_request = format!("{}. Additional details: {clarifications}", state.user_request);
            state.needs_clarification = Some(false);
            state.parsed_intent = None;
            state.deployment_status = DeploymentStatus::Pending;

            // Parsing and intent classification already ran before the
            // clarification gate stopped the pipeline; re-enter at
            // `understand_intent` with the merged request.
            self.run_pipeline(&mut state, "understand_intent").await?;
            self.save_conversation_context(session_id).await;
            return Ok(state);
        }

        let (mut state, start_from) = match existing {
            Some(state) if state.deployment_status != DeploymentStatus::Completed => {
                let mut resumed = state;
                resumed.user_request = user_request.to_string();
                let start_from = existing_step.as_deref().map(resume_from).unwrap_or(NODE_ORDER[0]);
                (resumed, start_from)
            }
            _ => (OrchestratorState::new(user_request, session_id), NODE_ORDER[0]),
        };

        self.run_pipeline(&mut state, start_from).await?;
        self.save_conversation_context(session_id).await;
        Ok(state)
    }

    /// Recover a session's last-known state without running the pipeline.
    pub async fn recover_session(&self, session_id: &str) -> Result<Option<OrchestratorState>> {
        Ok(self
            .deps
            .checkpoints
            .load(session_id, None)
            .await?
            .map(|envelope| envelope.state))
    }

    pub async fn list_active_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.deps.checkpoints.list_sessions::<OrchestratorState>().await
    }

    async fn load_agents(&self, session_id: &str) -> Result<Vec<AgentSpec>> {
        let key = format!("agents:{session_id}");
        match self.deps.store.get(&key).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| ConductorError::Storage(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn save_agents(&self, session_id: &str, agents: &[AgentSpec]) -> Result<()> {
        let key = format!("agents:{session_id}");
        let payload = serde_json::to_vec(agents).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.deps.store.setex(&key, self.deps.session_timeout, payload).await
    }

    /// Stop a deployed agent's sandbox container, if it has one.
    pub async fn stop_agent(&self, session_id: &str, agent_name: &str) -> Result<bool> {
        let mut records = nodes::load_runtime_records(&self.deps, session_id).await?;
        let Some(record) = records.get_mut(agent_name) else {
            return Ok(false);
        };
        let Some(container_id) = record.container_id.clone() else {
            return Ok(false);
        };
        let Some(sandbox) = &self.deps.sandbox else {
            return Ok(false);
        };

        sandbox.stop(&container_id, STOP_GRACE).await?;
        record.sandbox_status = Some("stopped".to_string());
        nodes::save_runtime_records(&self.deps, session_id, &records).await?;
        Ok(true)
    }

    /// Fetch stdout+stderr for a deployed agent's container.
    pub async fn get_agent_logs(&self, session_id: &str, agent_name: &str) -> Result<Vec<String>> {
        let records = nodes::load_runtime_records(&self.deps, session_id).await?;
        let Some(record) = records.get(agent_name) else {
            return Ok(Vec::new());
        };
        let (Some(container_id), Some(sandbox)) = (&record.container_id, &self.deps.sandbox) else {
            return Ok(Vec::new());
        };
        let logs = sandbox.logs(container_id, true, true).await?;
        Ok(logs.lines().map(str::to_string).collect())
    }

    /// Combine the declarative spec, last known runtime context, and live
    /// sandbox stats (if available) into a status snapshot.
    pub async fn get_agent_status(&self, session_id: &str, agent_name: &str) -> Result<Option<AgentStatusView>> {
        let agents = self.load_agents(session_id).await?;
        let Some(spec) = agents.into_iter().find(|a| a.name == agent_name) else {
            return Ok(None);
        };
        let records = nodes::load_runtime_records(&self.deps, session_id).await?;
        let execution = records.get(agent_name).cloned();

        let stats = match (&execution, &self.deps.sandbox) {
            (Some(ctx), Some(sandbox)) => match &ctx.container_id {
                Some(id) => sandbox.stats(id).await.ok(),
                None => None,
            },
            _ => None,
        };

        Ok(Some(AgentStatusView {
            name: spec.name,
            spec_status: spec.status,
            execution,
            container_stats: stats,
        }))
    }

    /// Remove a deployed agent's sandbox container and drop it from the
    /// session's agent list.
    pub async fn cleanup_agent(&self, session_id: &str, agent_name: &str) -> Result<bool> {
        let mut records = nodes::load_runtime_records(&self.deps, session_id).await?;
        let removed_container = match records.get(agent_name).and_then(|r| r.container_id.clone()) {
            Some(container_id) => {
                if let Some(sandbox) = &self.deps.sandbox {
                    sandbox.remove(&container_id).await.ok();
                }
                true
            }
            None => false,
        };

        records.remove(agent_name);
        nodes::save_runtime_records(&self.deps, session_id, &records).await?;

        let mut agents = self.load_agents(session_id).await?;
        let before = agents.len();
        agents.retain(|a| a.name != agent_name);
        if agents.len() != before {
            self.save_agents(session_id, &agents).await?;
        }

        info!(session_id, agent_name, removed_container, "agent cleaned up");
        Ok(removed_container || before != agents.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_providers::{Completion, MockCompletion};
    use conductor_state_traits::StateStore;

    fn deps(script: Vec<String>) -> OrchestratorDeps {
        let completion: Arc<dyn Completion> = Arc::new(MockCompletion::new(script));
        let store: Arc<dyn StateStore> = Arc::new(conductor_storage::InMemoryStateStore::new());
        OrchestratorDeps::new(completion, store, 3600, None, 3600, 3)
    }

    fn understand_intent_response() -> String {
        serde_json::json!({
            "intent_type": "create_agent",
            "confidence": 0.9,
            "entities": {},
        })
        .to_string()
    }

    /// Capabilities chosen so `match_template` scores >= 0.7 and the
    /// template fast path renders directly, with no further `Completion`
    /// calls needed for synthesis.
    fn agent_builder_response() -> String {
        serde_json::json!({
            "pattern": "sync",
            "name": "Drive Backup Sync",
            "description": "keeps the shared drive folder mirrored to the backup bucket",
            "capabilities": ["file_sync", "data_processing"],
            "targets": ["google_drive", "dropbox"],
            "frequency_minutes": null,
            "schedule": null,
            "integrations": {},
        })
        .to_string()
    }

    #[tokio::test]
    async fn process_request_deploys_a_new_agent() {
        let orchestrator = Orchestrator::new(deps(vec![understand_intent_response(), agent_builder_response()]));
        let state = orchestrator
            .process_request("sync my drive folder nightly", "session_1", None)
            .await
            .unwrap();
        assert_eq!(state.deployment_status, DeploymentStatus::Completed);
        assert!(state.agent_spec.is_some());
        assert!(state.generated_code.is_some());
        assert_ne!(state.needs_clarification, Some(true));
    }

    #[tokio::test]
    async fn process_request_asks_for_clarification_on_low_confidence() {
        let low_confidence = serde_json::json!({
            "intent_type": "clarification_needed",
            "confidence": 0.2,
            "entities": {},
            "clarification_needed": {
                "questions": ["What should be monitored?"],
                "missing_info": [],
                "suggestions": [],
            },
        })
        .to_string();
        let orchestrator = Orchestrator::new(deps(vec![low_confidence]));
        let state = orchestrator
            .process_request("automate something", "session_2", None)
            .await
            .unwrap();
        assert_eq!(state.needs_clarification, Some(true));
        assert!(!state.clarification_questions.is_empty());
        assert!(state.agent_spec.is_none());
    }

    #[tokio::test]
    async fn completed_session_is_recoverable() {
        let orchestrator = Orchestrator::new(deps(vec![understand_intent_response(), agent_builder_response()]));
        orchestrator
            .process_request("sync my drive folder nightly", "session_3", None)
            .await
            .unwrap();

        let recovered = orchestrator.recover_session("session_3").await.unwrap();
        let state = recovered.expect("checkpoint should have been saved");
        assert_eq!(state.deployment_status, DeploymentStatus::Completed);
    }

    #[test]
    fn resume_from_advances_past_completed_nodes() {
        assert_eq!(resume_from("parse_request_complete"), "understand_intent");
        assert_eq!(resume_from("understand_intent_complete"), "check_existing_agents");
        assert_eq!(resume_from("check_existing_agents_complete"), "create_agent");
        assert_eq!(resume_from("create_agent_complete"), "deploy_agent");
        assert_eq!(resume_from("deploy_agent_complete"), "deploy_agent");
    }

    #[test]
    fn resume_from_retries_an_unfinished_or_failed_node() {
        assert_eq!(resume_from("check_existing_agents"), "check_existing_agents");
        assert_eq!(resume_from("create_agent_error"), "create_agent");
        assert_eq!(resume_from("unknown_step"), "parse_request");
    }

    #[tokio::test]
    async fn resume_skips_already_completed_nodes() {
        let completion: Arc<dyn Completion> = Arc::new(MockCompletion::new(vec![agent_builder_response()]));
        let store: Arc<dyn StateStore> = Arc::new(conductor_storage::InMemoryStateStore::new());
        let checkpoints = conductor_storage::CheckpointStore::new(store.clone(), 3600);

        let mut state = OrchestratorState::new("sync my drive folder nightly", "session_resume");
        state.parsed_intent = Some(crate::state::ParsedIntent {
            intent_type: crate::state::IntentType::CreateAgent,
            confidence: 0.9,
            entities: HashMap::new(),
            clarification_needed: None,
        });
        checkpoints
            .save("session_resume", "parse_request_complete", &state)
            .await
            .unwrap();
        checkpoints
            .save("session_resume", "understand_intent_complete", &state)
            .await
            .unwrap();
        checkpoints
            .save("session_resume", "check_existing_agents_complete", &state)
            .await
            .unwrap();

        let before: CheckpointEnvelope<OrchestratorState> = checkpoints
            .load("session_resume", Some("parse_request_complete"))
            .await
            .unwrap()
            .unwrap();

        let deps = OrchestratorDeps::new(completion, store.clone(), 3600, None, 3600, 3);
        let orchestrator = Orchestrator::new(deps);
        let final_state = orchestrator
            .process_request("sync my drive folder nightly", "session_resume", None)
            .await
            .unwrap();
        assert_eq!(final_state.deployment_status, DeploymentStatus::Completed);

        let after: CheckpointEnvelope<OrchestratorState> = checkpoints
            .load("session_resume", Some("parse_request_complete"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            before.timestamp, after.timestamp,
            "no checkpoint earlier than check_existing_agents_complete should be rewritten on resume"
        );
        assert!(checkpoints
            .load::<OrchestratorState>("session_resume", Some("understand_intent"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn cleanup_agent_removes_it_from_the_session_list() {
        let orchestrator = Orchestrator::new(deps(vec![understand_intent_response(), agent_builder_response()]));
        let state = orchestrator
            .process_request("sync my drive folder nightly", "session_4", None)
            .await
            .unwrap();
        let agent_name = state.agent_spec.as_ref().unwrap().name.clone();

        let removed = orchestrator.cleanup_agent("session_4", &agent_name).await.unwrap();
        assert!(removed);
        let status = orchestrator.get_agent_status("session_4", &agent_name).await.unwrap();
        assert!(status.is_none());
    }
}
