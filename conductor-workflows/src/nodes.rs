//! ABOUTME: The five orchestrator node bodies
//! ABOUTME: Ported from orchestrator.py's `_parse_request`/`_understand_intent`/`_check_existing_agents`/`_create_agent`/`_deploy_agent`

use crate::context::ConversationContext;
use crate::deps::OrchestratorDeps;
use crate::state::{
    ClarificationNeeded, DeploymentStatus, ExecutionContext, IntentType, OrchestratorState, ParsedIntent, PartialUpdate,
};
use conductor_agents::{factories, AgentSpec, ResourceLimits, Trigger};
use conductor_core::{ConductorError, Result};
use conductor_providers::CompletionOptions;
use conductor_security::extract_result;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

pub enum Branch {
    Create,
    Modify,
    End,
}

/// Trim and collapse whitespace; fail on an effectively empty request.
pub fn parse_request(state: &OrchestratorState) -> Result<PartialUpdate> {
    let cleaned = state.user_request.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return Err(ConductorError::Parse("unintelligible".to_string()));
    }
    Ok(PartialUpdate {
        user_request: Some(cleaned),
        ..Default::default()
    })
}

fn strip_json_fences(content: &str) -> &str {
    let content = content.trim();
    let content = content.strip_prefix("```json").unwrap_or(content);
    let content = content.strip_prefix("```").unwrap_or(content);
    content.strip_suffix("```").unwrap_or(content).trim()
}

fn extract_json_object(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => content,
    }
}

/// Build a prompt from the request plus recent conversation turns, classify
/// intent via `Completion`, and derive the clarification gate.
pub async fn understand_intent(
    deps: &OrchestratorDeps,
    state: &OrchestratorState,
    context: Option<&ConversationContext>,
) -> Result<PartialUpdate> {
    let system_prompt = "You are an intent classifier for an agent automation system. \
Return a JSON object with: intent_type (\"create_agent\", \"modify_agent\", \"clarification_needed\", or \"other\"), \
confidence (0.0-1.0), entities (object, may include \"agent_name\"), and clarification_needed \
(object with questions/missing_info/suggestions, present only when intent_type is clarification_needed). \
Make reasonable assumptions and avoid asking for clarification unless the request is truly ambiguous.";

    let mut user_prompt = format!("User request: {}", state.user_request);
    if let Some(context) = context {
        if !context.is_empty() {
            user_prompt.push_str("\n\nRecent conversation:\n");
            user_prompt.push_str(&context.as_prompt_fragment());
        }
    }

    let response = deps
        .completion
        .generate(system_prompt, &user_prompt, CompletionOptions::default())
        .await
        .map_err(|e| ConductorError::Completion(e.to_string()))?;

    let json_text = extract_json_object(strip_json_fences(&response.text));
    let mut parsed: ParsedIntent =
        serde_json::from_str(json_text).map_err(|e| ConductorError::Parse(format!("intent response: {e}")))?;

    let needs_clarification =
        parsed.confidence < 0.5 || matches!(parsed.intent_type, IntentType::ClarificationNeeded);

    let mut update = PartialUpdate {
        needs_clarification: Some(Some(needs_clarification)),
        ..Default::default()
    };

    if needs_clarification {
        let clarification = parsed.clarification_needed.take().unwrap_or(ClarificationNeeded {
            questions: vec![],
            missing_info: vec![],
            suggestions: vec![],
        });
        update.clarification_questions = Some(clarification.questions.clone());
        update.missing_info = Some(clarification.missing_info.clone());
        update.suggestions = Some(clarification.suggestions.clone());
    }

    update.parsed_intent = Some(Some(parsed));
    Ok(update)
}

/// Load `agents:{session}` from the `StateStore` and attach it to state.
pub async fn check_existing_agents(deps: &OrchestratorDeps, state: &OrchestratorState) -> Result<PartialUpdate> {
    let key = format!("agents:{}", state.session_id);
    let existing_agents = match deps.store.get(&key).await? {
        Some(bytes) => {
            let specs: Vec<AgentSpec> =
                serde_json::from_slice(&bytes).map_err(|e| ConductorError::Parse(e.to_string()))?;
            specs
        }
        None => Vec::new(),
    };
    Ok(PartialUpdate {
        existing_agents: Some(existing_agents),
        ..Default::default()
    })
}

/// `create` / `modify` both route to `create_agent`; anything else ends.
pub fn should_create_or_modify(state: &OrchestratorState) -> Branch {
    if state.error_message.is_some() {
        return Branch::End;
    }
    match &state.parsed_intent {
        Some(intent) => match intent.intent_type {
            IntentType::CreateAgent => Branch::Create,
            IntentType::ModifyAgent => Branch::Modify,
            _ => Branch::End,
        },
        None => Branch::End,
    }
}

#[derive(serde::Deserialize)]
struct AgentBuilderResponse {
    #[serde(default = "default_pattern")]
    pattern: String,
    name: String,
    description: String,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    targets: Vec<String>,
    frequency_minutes: Option<u32>,
    schedule: Option<String>,
    #[serde(default)]
    integrations: HashMap<String, serde_json::Value>,
}

fn default_pattern() -> String {
    "custom".to_string()
}

const AGENT_BUILDER_SYSTEM_PROMPT: &str = "You are an advanced AI agent builder. Analyze the request and return a \
JSON object with: pattern (\"monitor\", \"sync\", \"report\", or \"custom\"), name (2-50 chars, alphanumeric + \
spaces), description (10-500 chars), capabilities (list from the allowed capability vocabulary, at least one), \
targets (array of what to act on), frequency_minutes (for monitor/sync), schedule (cron expression, for sync/\
report), and integrations (object keyed by service name).";

async fn build_agent_from_completion(deps: &OrchestratorDeps, state: &OrchestratorState) -> Result<AgentSpec> {
    let mut user_prompt = format!("User request: {}", state.user_request);
    if !state.existing_agents.is_empty() {
        let existing_json =
            serde_json::to_string(&state.existing_agents).map_err(|e| ConductorError::Storage(e.to_string()))?;
        user_prompt.push_str(&format!("\nExisting agents: {existing_json}"));
    }

    let response = deps
        .completion
        .generate(AGENT_BUILDER_SYSTEM_PROMPT, &user_prompt, CompletionOptions::default())
        .await
        .map_err(|e| ConductorError::Completion(e.to_string()))?;

    let json_text = extract_json_object(strip_json_fences(&response.text));
    let agent_data: AgentBuilderResponse =
        serde_json::from_str(json_text).map_err(|e| ConductorError::Parse(format!("agent builder response: {e}")))?;

    match agent_data.pattern.as_str() {
        "monitor" => {
            let target = agent_data.targets.first().map(String::as_str).unwrap_or("unknown");
            factories::create_monitor_agent(
                target,
                agent_data.frequency_minutes.unwrap_or(5),
                &state.session_id,
                Some(&agent_data.name),
                &[],
            )
        }
        "sync" => {
            let source = agent_data.targets.first().map(String::as_str).unwrap_or("unknown");
            let destination = agent_data.targets.get(1).map(String::as_str).unwrap_or("unknown");
            factories::create_sync_agent(
                source,
                destination,
                &state.session_id,
                agent_data.schedule.as_deref(),
                Some(&agent_data.name),
            )
        }
        "report" => {
            let data_source = agent_data.targets.first().map(String::as_str).unwrap_or("unknown");
            let schedule = agent_data.schedule.as_deref().unwrap_or("0 9 * * 1");
            factories::create_report_agent(data_source, schedule, &state.session_id, None, Some(&agent_data.name))
        }
        _ => AgentSpec::new(
            agent_data.name,
            agent_data.description,
            agent_data.capabilities,
            vec![Trigger::Manual(conductor_agents::ManualTrigger::new(
                "Manually triggered agent",
            )?)],
            HashMap::new(),
            &state.session_id,
            ResourceLimits::default(),
        ),
    }
}

/// Create or modify an agent spec, then attach synthesized source (§4.2).
pub async fn create_agent(deps: &OrchestratorDeps, state: &OrchestratorState) -> Result<PartialUpdate> {
    let intent = state
        .parsed_intent
        .as_ref()
        .ok_or_else(|| ConductorError::Internal("create_agent reached with no parsed_intent".to_string()))?;
    let is_modification = matches!(intent.intent_type, IntentType::ModifyAgent);

    let spec = if is_modification {
        let agent_name = intent
            .entities
            .get("agent_name")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let existing = agent_name
            .and_then(|name| state.existing_agents.iter().find(|a| a.name == name).cloned())
            .or_else(|| state.existing_agents.first().cloned())
            .ok_or_else(|| ConductorError::Validation {
                field: "existing_agents".to_string(),
                reason: "no existing agent to modify".to_string(),
            })?;
        let mut spec = existing;
        spec.increment_version(conductor_agents::VersionKind::Patch)?;
        spec
    } else {
        build_agent_from_completion(deps, state).await?
    };

    let code = deps.synthesizer.synthesize(&spec).await?;
    info!(agent = %spec.name, modification = is_modification, "agent spec ready for deployment");

    Ok(PartialUpdate {
        agent_spec: Some(Some(spec)),
        generated_code: Some(Some(code)),
        deployment_status: Some(DeploymentStatus::Pending),
        ..Default::default()
    })
}

/// Upsert the spec into the session's agent list, persist it, and
/// optionally run it in the sandbox.
pub async fn deploy_agent(deps: &OrchestratorDeps, state: &OrchestratorState) -> Result<PartialUpdate> {
    let spec = state
        .agent_spec
        .clone()
        .ok_or_else(|| ConductorError::Validation {
            field: "agent_spec".to_string(),
            reason: "no agent specification to deploy".to_string(),
        })?;

    let mut agents = state.existing_agents.clone();
    match agents.iter().position(|a| a.name == spec.name) {
        Some(idx) => agents[idx] = spec.clone(),
        None => agents.push(spec.clone()),
    }

    let key = format!("agents:{}", state.session_id);
    let payload = serde_json::to_vec(&agents).map_err(|e| ConductorError::Storage(e.to_string()))?;
    deps.store.setex(&key, deps.session_timeout, payload).await?;

    let mut execution_context = ExecutionContext {
        agent_id: Some(format!("{}:{}", state.session_id, spec.name)),
        deployed_at: Some(chrono::Utc::now()),
        container_id: None,
        sandbox_status: None,
        exit_code: None,
        result: None,
        log_tail: Vec::new(),
    };

    if let Some(sandbox) = &deps.sandbox {
        let container_name = spec.name.replace(' ', "_").to_lowercase();
        match run_in_sandbox(sandbox.as_ref(), &container_name, &spec).await {
            Ok(run) => {
                execution_context.container_id = Some(run.container_id);
                execution_context.sandbox_status = Some(run.status);
                execution_context.exit_code = run.exit_code;
                execution_context.result = Some(run.result);
                execution_context.log_tail = run.log_tail;
            }
            Err(e) => {
                warn!(agent = %spec.name, error = %e, "sandbox execution failed");
                execution_context.sandbox_status = Some("sandbox_error".to_string());
            }
        }
    }

    save_runtime_record(deps, &state.session_id, &spec.name, &execution_context).await?;

    Ok(PartialUpdate {
        existing_agents: Some(agents),
        deployment_status: Some(DeploymentStatus::Completed),
        execution_context: Some(execution_context),
        ..Default::default()
    })
}

fn runtime_key(session_id: &str) -> String {
    format!("agent_runtime:{session_id}")
}

/// Load the `agent_name -> ExecutionContext` side table that tracks
/// per-agent sandbox state (container id, last known status) outside the
/// declarative `AgentSpec` list.
pub async fn load_runtime_records(
    deps: &OrchestratorDeps,
    session_id: &str,
) -> Result<HashMap<String, ExecutionContext>> {
    match deps.store.get(&runtime_key(session_id)).await? {
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| ConductorError::Storage(e.to_string())),
        None => Ok(HashMap::new()),
    }
}

/// Persist the whole `agent_name -> ExecutionContext` side table.
pub async fn save_runtime_records(
    deps: &OrchestratorDeps,
    session_id: &str,
    records: &HashMap<String, ExecutionContext>,
) -> Result<()> {
    let payload = serde_json::to_vec(records).map_err(|e| ConductorError::Storage(e.to_string()))?;
    deps.store.setex(&runtime_key(session_id), deps.session_timeout, payload).await
}

async fn save_runtime_record(
    deps: &OrchestratorDeps,
    session_id: &str,
    agent_name: &str,
    context: &ExecutionContext,
) -> Result<()> {
    let mut records = load_runtime_records(deps, session_id).await?;
    records.insert(agent_name.to_string(), context.clone());
    save_runtime_records(deps, session_id, &records).await
}

/// Number of trailing log lines kept on the runtime context.
const LOG_TAIL_LINES: usize = 20;

struct SandboxRun {
    container_id: String,
    status: String,
    exit_code: Option<i64>,
    result: serde_json::Value,
    log_tail: Vec<String>,
}

async fn run_in_sandbox(
    sandbox: &dyn conductor_security::SandboxRuntime,
    name: &str,
    spec: &AgentSpec,
) -> Result<SandboxRun> {
    let image = "conductor-agent-runtime:latest";
    sandbox.ensure_image(image).await?;
    sandbox.ensure_network("conductor-agents").await?;

    let opts = conductor_security::CreateOpts {
        image: image.to_string(),
        name: name.to_string(),
        env: HashMap::new(),
        volumes: vec![],
        network: "conductor-agents".to_string(),
        read_only_root: true,
        tmpfs: vec![],
        mem_limit_mb: spec.resource_limits.memory as u64,
        cpu_period: 100_000,
        cpu_quota: (spec.resource_limits.cpu * 100_000.0) as i64,
        security_options: vec!["no-new-privileges".to_string()],
        user: "nobody".to_string(),
        working_dir: "/workspace".to_string(),
        command: vec![],
    };

    let container_id = sandbox.create(opts).await?;
    sandbox.start(&container_id).await?;
    let outcome = sandbox
        .wait(&container_id, Duration::from_secs(spec.resource_limits.timeout as u64))
        .await?;

    let logs = sandbox.logs(&container_id, true, true).await.unwrap_or_default();
    let result = extract_result(&logs);
    sandbox.remove(&container_id).await.ok();

    let (status, exit_code) = match outcome {
        conductor_security::WaitOutcome::Completed { exit_code } if exit_code == 0 => {
            ("completed".to_string(), Some(exit_code))
        }
        conductor_security::WaitOutcome::Completed { exit_code } => ("failed".to_string(), Some(exit_code)),
        conductor_security::WaitOutcome::Timeout => ("timeout".to_string(), None),
    };
    let log_tail = logs
        .lines()
        .rev()
        .take(LOG_TAIL_LINES)
        .map(str::to_string)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    Ok(SandboxRun {
        container_id,
        status,
        exit_code,
        result,
        log_tail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_security::{CreateOpts, SandboxStats, WaitOutcome};
    use std::sync::Mutex;

    struct StubSandbox {
        logs: String,
        outcome: Mutex<Option<WaitOutcome>>,
    }

    #[async_trait]
    impl conductor_security::SandboxRuntime for StubSandbox {
        async fn ensure_image(&self, _image: &str) -> Result<()> {
            Ok(())
        }
        async fn ensure_network(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn create(&self, _opts: CreateOpts) -> Result<String> {
            Ok("container_abc".to_string())
        }
        async fn start(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn wait(&self, _id: &str, _timeout: Duration) -> Result<WaitOutcome> {
            Ok(self.outcome.lock().unwrap().take().unwrap())
        }
        async fn stop(&self, _id: &str, _grace: Duration) -> Result<()> {
            Ok(())
        }
        async fn remove(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn logs(&self, _id: &str, _stdout: bool, _stderr: bool) -> Result<String> {
            Ok(self.logs.clone())
        }
        async fn stats(&self, _id: &str) -> Result<SandboxStats> {
            Ok(SandboxStats::default())
        }
        async fn list(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn sample_spec() -> AgentSpec {
        AgentSpec::new(
            "Drive Backup Sync".to_string(),
            "keeps the shared drive folder mirrored".to_string(),
            vec!["data_processing".to_string()],
            vec![Trigger::Manual(conductor_agents::ManualTrigger::new("manual").unwrap())],
            HashMap::new(),
            "session_1",
            ResourceLimits::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn run_in_sandbox_surfaces_extracted_result_and_log_tail() {
        let sandbox = StubSandbox {
            logs: "booting\nworking\n{\"status\": \"ok\", \"count\": 3}\n".to_string(),
            outcome: Mutex::new(Some(WaitOutcome::Completed { exit_code: 0 })),
        };
        let spec = sample_spec();

        let run = run_in_sandbox(&sandbox, "drive_backup_sync", &spec).await.unwrap();

        assert_eq!(run.status, "completed");
        assert_eq!(run.exit_code, Some(0));
        assert_eq!(run.result["status"], "ok");
        assert_eq!(run.result["count"], 3);
        assert_eq!(run.log_tail, vec!["booting", "working", "{\"status\": \"ok\", \"count\": 3}"]);
    }

    #[test]
    fn parse_request_rejects_blank_input() {
        let state = OrchestratorState::new("   \t  ", "s1");
        assert!(parse_request(&state).is_err());
    }

    #[test]
    fn parse_request_collapses_whitespace() {
        let state = OrchestratorState::new("  monitor   my   inbox  ", "s1");
        let update = parse_request(&state).unwrap();
        assert_eq!(update.user_request.as_deref(), Some("monitor my inbox"));
    }

    #[test]
    fn branch_routes_create_and_modify_to_create_agent() {
        let mut state = OrchestratorState::new("x", "s1");
        state.parsed_intent = Some(ParsedIntent {
            intent_type: IntentType::CreateAgent,
            confidence: 0.9,
            entities: HashMap::new(),
            clarification_needed: None,
        });
        assert!(matches!(should_create_or_modify(&state), Branch::Create));

        state.parsed_intent.as_mut().unwrap().intent_type = IntentType::ModifyAgent;
        assert!(matches!(should_create_or_modify(&state), Branch::Modify));

        state.parsed_intent.as_mut().unwrap().intent_type = IntentType::Other;
        assert!(matches!(should_create_or_modify(&state), Branch::End));
    }

    #[test]
    fn branch_ends_on_error() {
        let mut state = OrchestratorState::new("x", "s1");
        state.error_message = Some("boom".to_string());
        assert!(matches!(should_create_or_modify(&state), Branch::End));
    }
}
