//! ABOUTME: DepartmentOrchestrator coordination modes over a department's agent roster
//! ABOUTME: Ported from departments/base_department.py's `DepartmentOrchestrator`

use crate::department::Department;
use async_trait::async_trait;
use conductor_agents::AgentSpec;
use conductor_core::Result;
use conductor_events::{MessageBus, MessagePriority, MessageType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

const DEFAULT_COLLABORATION_TIMEOUT_S: u64 = 300;
const MAX_AGENTS_FOR_COMPLEX: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinationMode {
    Parallel,
    Sequential,
    Collaborative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskComplexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

/// Input to a `coordinate` call: which agents qualify and what they work on.
#[derive(Debug, Clone, Default)]
pub struct CoordinationContext {
    pub required_capabilities: Vec<String>,
    pub complexity: TaskComplexity,
    /// Partitioned round-robin across selected agents in parallel mode; used
    /// as the initial payload in sequential/collaborative mode when non-empty.
    pub work_items: Vec<Value>,
    pub collaboration_timeout: Option<Duration>,
    pub payload: Value,
}

/// What a single agent invocation hands back to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTaskOutcome {
    pub success: bool,
    pub agent_id: String,
    #[serde(default)]
    pub output: Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentTaskContext {
    pub agent_id: String,
    pub execution_mode: CoordinationMode,
    pub step_number: Option<usize>,
    pub previous_results: HashMap<String, AgentTaskOutcome>,
    pub other_agents: Vec<String>,
    pub session_id: Option<String>,
    pub payload: Value,
}

/// Executes a single agent's share of a coordinated workflow. The original
/// left this step as an explicit placeholder ("in a real implementation,
/// this would interact with the sandbox manager and execute the agent
/// code") simulated with a sleep and a canned success; this trait is the
/// seam a real implementation plugs a `SandboxRuntime`/`CodeSynthesizer`
/// backed runner into.
#[async_trait]
pub trait AgentTaskRunner: Send + Sync {
    async fn run(&self, agent: &AgentSpec, context: AgentTaskContext) -> Result<AgentTaskOutcome>;
}

/// A runner that always succeeds and echoes its input back as output.
/// Direct translation of the original's `_execute_agent_task` placeholder;
/// useful as a default for departments that haven't wired a real executor.
pub struct NoopAgentTaskRunner;

#[async_trait]
impl AgentTaskRunner for NoopAgentTaskRunner {
    async fn run(&self, agent: &AgentSpec, context: AgentTaskContext) -> Result<AgentTaskOutcome> {
        Ok(AgentTaskOutcome {
            success: true,
            agent_id: agent.name.clone(),
            output: context.payload,
            error: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationOutcome {
    pub success: bool,
    pub execution_mode: String,
    pub agent_results: HashMap<String, AgentTaskOutcome>,
    #[serde(default)]
    pub combined_output: Value,
    pub error: Option<String>,
}

/// Pick agents whose capabilities intersect `required_capabilities`; for
/// `Complex` tasks keep adding agents (regardless of match) until 3 are
/// selected or the roster is exhausted. Falls back to the first available
/// agent if nothing qualified.
fn select_agents(agents: &[AgentSpec], required_capabilities: &[String], complexity: TaskComplexity) -> Vec<AgentSpec> {
    let mut selected = Vec::new();
    for agent in agents {
        let matches = agent.capabilities.iter().any(|c| required_capabilities.contains(c));
        if matches {
            selected.push(agent.clone());
        } else if complexity == TaskComplexity::Complex && selected.len() < MAX_AGENTS_FOR_COMPLEX {
            selected.push(agent.clone());
        }
    }
    if selected.is_empty() {
        if let Some(first) = agents.first() {
            selected.push(first.clone());
        }
    }
    selected
}

fn merge_object_into(target: &mut Value, source: &Value) {
    let (Some(target_obj), Some(source_obj)) = (target.as_object_mut(), source.as_object()) else {
        return;
    };
    for (k, v) in source_obj {
        target_obj.insert(k.clone(), v.clone());
    }
}

/// Coordinates a department's micro-agents through one of three execution
/// modes. Ported from `DepartmentOrchestrator.coordinate_agents` and its
/// `_coordinate_*_execution` helpers.
pub struct DepartmentOrchestrator {
    department: Arc<dyn Department>,
    message_bus: Option<Arc<MessageBus>>,
    runner: Arc<dyn AgentTaskRunner>,
}

impl DepartmentOrchestrator {
    pub fn new(department: Arc<dyn Department>, message_bus: Option<Arc<MessageBus>>, runner: Arc<dyn AgentTaskRunner>) -> Self {
        Self { department, message_bus, runner }
    }

    /// `workflow_name` selects the coordination mode exactly as the original
    /// dispatched on it; anything that isn't `parallel_execution` or
    /// `sequential_execution` falls back to collaborative, matching the
    /// original's default branch.
    pub async fn coordinate(&self, workflow_name: &str, context: CoordinationContext) -> Result<CoordinationOutcome> {
        let agents = self.department.core().agents().await;
        let selected = select_agents(&agents, &context.required_capabilities, context.complexity);
        let mode = match workflow_name {
            "parallel_execution" => CoordinationMode::Parallel,
            "sequential_execution" => CoordinationMode::Sequential,
            _ => CoordinationMode::Collaborative,
        };
        info!(
            department = %self.department.core().name,
            workflow_name,
            agents = selected.len(),
            "coordinating agents"
        );

        match mode {
            CoordinationMode::Parallel => self.coordinate_parallel(&selected, &context).await,
            CoordinationMode::Sequential => self.coordinate_sequential(&selected, &context).await,
            CoordinationMode::Collaborative => self.coordinate_collaborative(&selected, &context).await,
        }
    }

    /// Round-robin partitions `work_items` across `agents`, runs every
    /// share concurrently. Success iff every agent succeeds.
    async fn coordinate_parallel(&self, agents: &[AgentSpec], context: &CoordinationContext) -> Result<CoordinationOutcome> {
        let work_items = if context.work_items.is_empty() { vec![context.payload.clone()] } else { context.work_items.clone() };
        let agent_count = agents.len().max(1);

        let mut handles = Vec::new();
        for (i, agent) in agents.iter().enumerate() {
            let share: Vec<Value> = work_items.iter().skip(i).step_by(agent_count).cloned().collect();
            if share.is_empty() {
                continue;
            }
            let task_context = AgentTaskContext {
                agent_id: agent.name.clone(),
                execution_mode: CoordinationMode::Parallel,
                step_number: None,
                previous_results: HashMap::new(),
                other_agents: Vec::new(),
                session_id: None,
                payload: Value::Array(share),
            };
            let runner = self.runner.clone();
            let agent = agent.clone();
            handles.push(tokio::spawn(async move {
                let name = agent.name.clone();
                (name, runner.run(&agent, task_context).await)
            }));
        }

        let mut agent_results = HashMap::new();
        for handle in handles {
            match handle.await {
                Ok((name, Ok(outcome))) => {
                    agent_results.insert(name, outcome);
                }
                Ok((name, Err(e))) => {
                    agent_results.insert(name.clone(), AgentTaskOutcome { success: false, agent_id: name, output: Value::Null, error: Some(e.to_string()) });
                }
                Err(e) => error!(error = %e, "agent task panicked"),
            }
        }

        let success = !agent_results.is_empty() && agent_results.values().all(|r| r.success);
        Ok(CoordinationOutcome {
            success,
            execution_mode: "parallel".to_string(),
            agent_results,
            combined_output: Value::Null,
            error: None,
        })
    }

    /// Runs agents in order, threading each agent's output forward as the
    /// next agent's input. Stops early on a failure (the original treats any
    /// sequential-step failure as critical). Success iff every agent that
    /// ran succeeded.
    async fn coordinate_sequential(&self, agents: &[AgentSpec], context: &CoordinationContext) -> Result<CoordinationOutcome> {
        let mut agent_results: HashMap<String, AgentTaskOutcome> = HashMap::new();
        let mut workflow_context = context.payload.clone();

        for (i, agent) in agents.iter().enumerate() {
            let task_context = AgentTaskContext {
                agent_id: agent.name.clone(),
                execution_mode: CoordinationMode::Sequential,
                step_number: Some(i + 1),
                previous_results: agent_results.clone(),
                other_agents: Vec::new(),
                session_id: None,
                payload: workflow_context.clone(),
            };

            let outcome = match self.runner.run(agent, task_context).await {
                Ok(o) => o,
                Err(e) => AgentTaskOutcome { success: false, agent_id: agent.name.clone(), output: Value::Null, error: Some(e.to_string()) },
            };

            let failed = !outcome.success;
            merge_object_into(&mut workflow_context, &outcome.output);
            agent_results.insert(agent.name.clone(), outcome);

            if failed {
                warn!(department = %self.department.core().name, agent = %agent.name, step = i + 1, "sequential step failed, stopping");
                break;
            }
        }

        let success = !agent_results.is_empty() && agent_results.values().all(|r| r.success);
        Ok(CoordinationOutcome {
            success,
            execution_mode: "sequential".to_string(),
            agent_results,
            combined_output: workflow_context,
            error: None,
        })
    }

    /// Broadcasts a session opener, then runs every agent concurrently with
    /// a shared timeout (default 300s). Success iff any agent succeeds; a
    /// timeout yields `{success: false, error: "Collaboration timeout"}`
    /// exactly as the original.
    async fn coordinate_collaborative(&self, agents: &[AgentSpec], context: &CoordinationContext) -> Result<CoordinationOutcome> {
        let session_id = format!("collab_{}:{}", self.department.core().name.to_lowercase(), chrono::Utc::now().timestamp_millis());

        let opener = serde_json::json!({
            "session_id": session_id,
            "participants": agents.iter().map(|a| a.name.clone()).collect::<Vec<_>>(),
            "context": context.payload,
            "coordination_type": "collaborative",
        });
        self.broadcast_to_agents(opener).await.ok();

        let timeout_duration = context.collaboration_timeout.unwrap_or(Duration::from_secs(DEFAULT_COLLABORATION_TIMEOUT_S));

        let mut handles = Vec::new();
        for agent in agents {
            let other_agents: Vec<String> = agents.iter().filter(|a| a.name != agent.name).map(|a| a.name.clone()).collect();
            let task_context = AgentTaskContext {
                agent_id: agent.name.clone(),
                execution_mode: CoordinationMode::Collaborative,
                step_number: None,
                previous_results: HashMap::new(),
                other_agents,
                session_id: Some(session_id.clone()),
                payload: context.payload.clone(),
            };
            let runner = self.runner.clone();
            let agent = agent.clone();
            handles.push(tokio::spawn(async move {
                let name = agent.name.clone();
                (name, runner.run(&agent, task_context).await)
            }));
        }

        let joined = match timeout(timeout_duration, futures::future::join_all(handles)).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(session_id, "collaborative coordination timed out");
                return Ok(CoordinationOutcome {
                    success: false,
                    execution_mode: "collaborative".to_string(),
                    agent_results: HashMap::new(),
                    combined_output: Value::Null,
                    error: Some("Collaboration timeout".to_string()),
                });
            }
        };

        let mut agent_results = HashMap::new();
        for result in joined {
            match result {
                Ok((name, Ok(outcome))) => {
                    agent_results.insert(name, outcome);
                }
                Ok((name, Err(e))) => {
                    agent_results.insert(name.clone(), AgentTaskOutcome { success: false, agent_id: name, output: Value::Null, error: Some(e.to_string()) });
                }
                Err(e) => error!(error = %e, "agent task panicked"),
            }
        }

        let mut combined = serde_json::Map::new();
        for outcome in agent_results.values() {
            if outcome.success {
                if let Some(obj) = outcome.output.as_object() {
                    for (k, v) in obj {
                        combined.insert(k.clone(), v.clone());
                    }
                }
            }
        }

        let success = agent_results.values().any(|r| r.success);
        Ok(CoordinationOutcome {
            success,
            execution_mode: "collaborative".to_string(),
            agent_results,
            combined_output: Value::Object(combined),
            error: None,
        })
    }

    /// Sends every department agent an individual coordination message plus
    /// one department-wide broadcast. Ported from `broadcast_to_agents`.
    pub async fn broadcast_to_agents(&self, message: Value) -> Result<Vec<String>> {
        let Some(bus) = &self.message_bus else {
            warn!(department = %self.department.core().name, "no message bus configured, skipping broadcast");
            return Ok(Vec::new());
        };

        let dept_name = self.department.core().name.clone();
        let mut enriched = message;
        if let Some(obj) = enriched.as_object_mut() {
            obj.insert("department".to_string(), Value::String(dept_name.clone()));
            obj.insert("broadcast_time".to_string(), Value::String(chrono::Utc::now().to_rfc3339()));
            obj.insert("message_type".to_string(), Value::String("department_broadcast".to_string()));
        }

        let sender = format!("dept_{}", dept_name.to_lowercase());
        let mut message_ids = Vec::new();
        for agent in self.department.core().agents().await {
            match bus.publish(&sender, &agent.name, MessageType::Coordination, enriched.clone(), MessagePriority::Medium).await {
                Ok(id) => message_ids.push(id),
                Err(e) => error!(agent = %agent.name, error = %e, "failed to send coordination message"),
            }
        }

        match bus.broadcast(&dept_name.to_lowercase(), enriched, Some(&sender)).await {
            Ok(ids) => message_ids.extend(ids),
            Err(e) => error!(error = %e, "department broadcast failed"),
        }

        info!(department = %dept_name, recipients = message_ids.len(), "coordination broadcast sent");
        Ok(message_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::department::{DepartmentCore, DepartmentStatus, WorkflowOutcome};
    use async_trait::async_trait;
    use conductor_agents::{AgentSpec, AgentStatus, ResourceLimits};
    use conductor_storage::InMemoryStateStore;
    use std::collections::HashMap;

    struct TestDepartment {
        core: DepartmentCore,
    }

    impl TestDepartment {
        fn new(message_bus: Option<Arc<MessageBus>>) -> Self {
            Self { core: DepartmentCore::new("testing", "a test department", Arc::new(InMemoryStateStore::new()), message_bus) }
        }
    }

    #[async_trait]
    impl Department for TestDepartment {
        fn core(&self) -> &DepartmentCore {
            &self.core
        }

        async fn initialize_agents(&self) -> Result<bool> {
            Ok(true)
        }

        async fn execute_workflow(&self, _task: Value) -> Result<WorkflowOutcome> {
            Ok(WorkflowOutcome { success: true, results: Value::Null, errors: Vec::new() })
        }

        async fn get_status(&self) -> Result<DepartmentStatus> {
            Ok(self.core.status_snapshot().await)
        }

        async fn calculate_business_impact(&self) -> Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
    }

    fn agent(name: &str, capabilities: &[&str]) -> AgentSpec {
        let now = chrono::Utc::now();
        AgentSpec {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: "a test agent used only to exercise coordination".to_string(),
            version: "1.0.0".to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            triggers: Vec::new(),
            integrations: HashMap::new(),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            resource_limits: ResourceLimits::default(),
            created_at: now,
            updated_at: now,
            created_by: "tester".to_string(),
            status: AgentStatus::Active,
        }
    }

    async fn orchestrator_with_agents(agents: Vec<AgentSpec>) -> DepartmentOrchestrator {
        let dept = Arc::new(TestDepartment::new(None));
        for a in agents {
            dept.core().add_agent(a).await.unwrap();
        }
        DepartmentOrchestrator::new(dept, None, Arc::new(NoopAgentTaskRunner))
    }

    #[tokio::test]
    async fn select_agents_falls_back_to_first_when_nothing_matches() {
        let agents = vec![agent("a", &["billing"]), agent("b", &["billing"])];
        let selected = select_agents(&agents, &["support".to_string()], TaskComplexity::Moderate);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "a");
    }

    #[tokio::test]
    async fn select_agents_caps_complex_tasks_at_three() {
        let agents = vec![agent("a", &["x"]), agent("b", &["x"]), agent("c", &["x"]), agent("d", &["x"])];
        let selected = select_agents(&agents, &["support".to_string()], TaskComplexity::Complex);
        assert_eq!(selected.len(), 3);
    }

    #[tokio::test]
    async fn parallel_coordination_succeeds_when_all_agents_succeed() {
        let orchestrator = orchestrator_with_agents(vec![agent("a", &["support"]), agent("b", &["support"])]).await;
        let context = CoordinationContext {
            required_capabilities: vec!["support".to_string()],
            work_items: vec![serde_json::json!({"n": 1}), serde_json::json!({"n": 2})],
            ..Default::default()
        };
        let outcome = orchestrator.coordinate("parallel_execution", context).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.agent_results.len(), 2);
    }

    #[tokio::test]
    async fn sequential_coordination_threads_output_forward() {
        let orchestrator = orchestrator_with_agents(vec![agent("a", &["support"])]).await;
        let context = CoordinationContext {
            required_capabilities: vec!["support".to_string()],
            payload: serde_json::json!({"seed": true}),
            ..Default::default()
        };
        let outcome = orchestrator.coordinate("sequential_execution", context).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.combined_output["seed"], true);
    }

    struct FailingRunner;

    #[async_trait]
    impl AgentTaskRunner for FailingRunner {
        async fn run(&self, agent: &AgentSpec, _context: AgentTaskContext) -> Result<AgentTaskOutcome> {
            Ok(AgentTaskOutcome { success: false, agent_id: agent.name.clone(), output: Value::Null, error: Some("boom".to_string()) })
        }
    }

    #[tokio::test]
    async fn collaborative_coordination_succeeds_if_any_agent_succeeds() {
        let dept = Arc::new(TestDepartment::new(None));
        dept.core().add_agent(agent("a", &["support"])).await.unwrap();
        dept.core().add_agent(agent("b", &["support"])).await.unwrap();
        let orchestrator = DepartmentOrchestrator::new(dept, None, Arc::new(NoopAgentTaskRunner));

        let context = CoordinationContext { required_capabilities: vec!["support".to_string()], ..Default::default() };
        let outcome = orchestrator.coordinate("collaborative_session", context).await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn collaborative_coordination_times_out() {
        let dept = Arc::new(TestDepartment::new(None));
        dept.core().add_agent(agent("a", &["support"])).await.unwrap();
        let orchestrator = DepartmentOrchestrator::new(dept, None, Arc::new(FailingRunner));

        let context = CoordinationContext {
            required_capabilities: vec!["support".to_string()],
            collaboration_timeout: Some(Duration::from_millis(0)),
            ..Default::default()
        };
        let outcome = orchestrator.coordinate("collaborative_session", context).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Collaboration timeout"));
    }
}
