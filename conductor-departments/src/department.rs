//! ABOUTME: Department trait and its shared state/lifecycle core
//! ABOUTME: Ported from departments/base_department.py's `Department` ABC

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_agents::AgentSpec;
use conductor_core::{ConductorError, Result};
use conductor_events::MessageBus;
use conductor_state_traits::StateStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const STATE_TTL_S: u64 = 86_400;
const MAX_ERRORS: u32 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Paused,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DepartmentHealth {
    Healthy,
    Degraded,
    Critical,
    Offline,
}

/// What an `execute_workflow` implementation hands back; drives the
/// completed/failed transition and the rolling completion-time average.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowOutcome {
    pub success: bool,
    #[serde(default)]
    pub results: Value,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub task: Value,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: f64,
    #[serde(default)]
    pub assigned_agents: Vec<String>,
    #[serde(default)]
    pub results: Value,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Generic status snapshot a concrete department extends with its own
/// fields via `custom`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentStatus {
    pub name: String,
    pub health_status: DepartmentHealth,
    pub active_agents: usize,
    pub running_workflows: usize,
    pub workflows_completed: u64,
    pub workflows_failed: u64,
    pub average_completion_time: f64,
    pub error_count: u32,
    #[serde(default)]
    pub custom: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedHealth {
    health_status: DepartmentHealth,
    last_health_check: Option<DateTime<Utc>>,
    error_count: u32,
    workflows_completed: u64,
    workflows_failed: u64,
    average_completion_time: f64,
    shared_state: HashMap<String, Value>,
    business_metrics: Vec<String>,
}

struct HealthState {
    status: DepartmentHealth,
    last_check: Option<DateTime<Utc>>,
    error_count: u32,
    workflows_completed: u64,
    workflows_failed: u64,
    average_completion_time: f64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            status: DepartmentHealth::Offline,
            last_check: None,
            error_count: 0,
            workflows_completed: 0,
            workflows_failed: 0,
            average_completion_time: 0.0,
        }
    }
}

fn classify_health(error_count: u32, completed: u64, failed: u64) -> DepartmentHealth {
    let total = completed + failed;
    let success_rate = if total == 0 { 1.0 } else { completed as f64 / total as f64 };
    if error_count >= MAX_ERRORS || success_rate < 0.5 {
        DepartmentHealth::Critical
    } else if success_rate < 0.8 {
        DepartmentHealth::Degraded
    } else {
        DepartmentHealth::Healthy
    }
}

fn state_key(name: &str) -> String {
    format!("dept:{}:state", name.to_lowercase())
}
fn workflows_key(name: &str) -> String {
    format!("dept:{}:workflows", name.to_lowercase())
}
fn agents_key(name: &str) -> String {
    format!("dept:{}:agents", name.to_lowercase())
}

/// The shared fields and persistence/lifecycle logic every department
/// implementation embeds. Mirrors the concrete half of the original's
/// `Department` ABC; the abstract half lives on the [`Department`] trait.
pub struct DepartmentCore {
    pub name: String,
    pub description: String,
    store: Arc<dyn StateStore>,
    pub message_bus: Option<Arc<MessageBus>>,
    micro_agents: Mutex<Vec<AgentSpec>>,
    shared_state: Mutex<HashMap<String, Value>>,
    business_metrics: Mutex<Vec<String>>,
    active_workflows: Mutex<HashMap<String, WorkflowRecord>>,
    health: Mutex<HealthState>,
}

impl DepartmentCore {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        store: Arc<dyn StateStore>,
        message_bus: Option<Arc<MessageBus>>,
    ) -> Self {
        let name = name.into();
        info!(department = %name, "department initialized");
        Self {
            name,
            description: description.into(),
            store,
            message_bus,
            micro_agents: Mutex::new(Vec::new()),
            shared_state: Mutex::new(HashMap::new()),
            business_metrics: Mutex::new(Vec::new()),
            active_workflows: Mutex::new(HashMap::new()),
            health: Mutex::new(HealthState::default()),
        }
    }

    pub async fn health_status(&self) -> DepartmentHealth {
        self.health.lock().await.status
    }

    pub async fn set_business_metrics(&self, metrics: Vec<String>) {
        *self.business_metrics.lock().await = metrics;
    }

    pub async fn agents(&self) -> Vec<AgentSpec> {
        self.micro_agents.lock().await.clone()
    }

    pub async fn active_workflow_count(&self) -> usize {
        self.active_workflows.lock().await.len()
    }

    async fn set_health(&self, status: DepartmentHealth) {
        let mut health = self.health.lock().await;
        health.status = status;
        health.last_check = Some(Utc::now());
    }

    pub async fn add_agent(&self, spec: AgentSpec) -> Result<bool> {
        if spec.name.is_empty() || spec.capabilities.is_empty() {
            warn!(department = %self.name, "rejected invalid agent spec");
            return Ok(false);
        }

        if let Some(bus) = &self.message_bus {
            let dept_tag = self.name.to_lowercase();
            bus.subscribe(
                &spec.name,
                &[format!("dept_{dept_tag}_broadcast"), format!("agent_{}_direct", spec.name)],
            )
            .await?;
            bus.add_department_agent(&dept_tag, &spec.name).await?;
        }

        info!(department = %self.name, agent = %spec.name, "agent added");
        self.micro_agents.lock().await.push(spec);
        self.save_state().await?;
        Ok(true)
    }

    pub async fn remove_agent(&self, agent_name: &str) -> Result<bool> {
        let mut agents = self.micro_agents.lock().await;
        let before = agents.len();
        agents.retain(|a| a.name != agent_name);
        let removed = agents.len() != before;
        drop(agents);

        if removed {
            if let Some(bus) = &self.message_bus {
                bus.remove_department_agent(&self.name.to_lowercase(), agent_name).await.ok();
            }
            self.save_state().await?;
            info!(department = %self.name, agent = agent_name, "agent removed");
        } else {
            warn!(department = %self.name, agent = agent_name, "agent not found");
        }
        Ok(removed)
    }

    pub(crate) async fn begin_workflow(&self, workflow_id: &str, task: Value) -> bool {
        let mut workflows = self.active_workflows.lock().await;
        if workflows.contains_key(workflow_id) {
            return false;
        }
        workflows.insert(
            workflow_id.to_string(),
            WorkflowRecord {
                id: workflow_id.to_string(),
                task,
                status: WorkflowStatus::InProgress,
                started_at: Utc::now(),
                completed_at: None,
                progress: 0.0,
                assigned_agents: Vec::new(),
                results: Value::Null,
                errors: Vec::new(),
            },
        );
        true
    }

    pub(crate) async fn finish_workflow(&self, workflow_id: &str, outcome: Result<WorkflowOutcome>) {
        let started_at = {
            let mut workflows = self.active_workflows.lock().await;
            let Some(workflow) = workflows.get_mut(workflow_id) else {
                return;
            };
            let started_at = workflow.started_at;
            match outcome {
                Ok(o) => {
                    workflow.status = if o.success { WorkflowStatus::Completed } else { WorkflowStatus::Failed };
                    workflow.results = o.results;
                    workflow.errors = o.errors;
                    workflow.progress = 100.0;
                    workflow.completed_at = Some(Utc::now());
                    if !o.success {
                        self.record_failure_marker().await;
                    }
                }
                Err(e) => {
                    workflow.status = WorkflowStatus::Failed;
                    workflow.errors.push(e.to_string());
                    workflow.completed_at = Some(Utc::now());
                    self.record_failure_marker().await;
                }
            }
            started_at
        };

        let success = {
            let workflows = self.active_workflows.lock().await;
            workflows.get(workflow_id).map(|w| w.status == WorkflowStatus::Completed).unwrap_or(false)
        };
        self.record_outcome(success, started_at).await;
    }

    async fn record_failure_marker(&self) {
        // marks error_count before record_outcome recomputes health so a
        // single failed workflow is visible even if success_rate alone
        // wouldn't yet cross a threshold.
        self.health.lock().await.error_count += 1;
    }

    async fn record_outcome(&self, success: bool, started_at: DateTime<Utc>) {
        let mut health = self.health.lock().await;
        if success {
            health.workflows_completed += 1;
        } else {
            health.workflows_failed += 1;
        }

        let elapsed = (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0;
        let total = health.workflows_completed + health.workflows_failed;
        health.average_completion_time = if total > 1 {
            (health.average_completion_time * (total - 1) as f64 + elapsed) / total as f64
        } else {
            elapsed
        };

        health.status = classify_health(health.error_count, health.workflows_completed, health.workflows_failed);
        if health.status == DepartmentHealth::Healthy && health.error_count > 0 {
            health.error_count -= 1;
        }
        health.last_check = Some(Utc::now());
    }

    pub async fn stop_workflow(&self, workflow_id: &str) -> Result<bool> {
        let mut workflows = self.active_workflows.lock().await;
        let Some(workflow) = workflows.get_mut(workflow_id) else {
            warn!(department = %self.name, workflow_id, "workflow not found");
            return Ok(false);
        };
        workflow.status = WorkflowStatus::Paused;
        workflow.completed_at = Some(Utc::now());
        info!(department = %self.name, workflow_id, "workflow stopped");
        Ok(true)
    }

    pub async fn save_state(&self) -> Result<()> {
        let health = {
            let h = self.health.lock().await;
            PersistedHealth {
                health_status: h.status,
                last_health_check: h.last_check,
                error_count: h.error_count,
                workflows_completed: h.workflows_completed,
                workflows_failed: h.workflows_failed,
                average_completion_time: h.average_completion_time,
                shared_state: self.shared_state.lock().await.clone(),
                business_metrics: self.business_metrics.lock().await.clone(),
            }
        };
        let bytes = serde_json::to_vec(&health).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.store.setex(&state_key(&self.name), STATE_TTL_S, bytes).await?;

        let workflows = self.active_workflows.lock().await.clone();
        let bytes = serde_json::to_vec(&workflows).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.store.setex(&workflows_key(&self.name), STATE_TTL_S, bytes).await?;

        let agents = self.micro_agents.lock().await.clone();
        let bytes = serde_json::to_vec(&agents).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.store.setex(&agents_key(&self.name), STATE_TTL_S, bytes).await?;

        Ok(())
    }

    pub async fn load_state(&self) -> Result<()> {
        if let Some(bytes) = self.store.get(&state_key(&self.name)).await? {
            let persisted: PersistedHealth =
                serde_json::from_slice(&bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
            let mut health = self.health.lock().await;
            health.status = persisted.health_status;
            health.last_check = persisted.last_health_check;
            health.error_count = persisted.error_count;
            health.workflows_completed = persisted.workflows_completed;
            health.workflows_failed = persisted.workflows_failed;
            health.average_completion_time = persisted.average_completion_time;
            drop(health);
            *self.shared_state.lock().await = persisted.shared_state;
            *self.business_metrics.lock().await = persisted.business_metrics;
        }

        if let Some(bytes) = self.store.get(&workflows_key(&self.name)).await? {
            let workflows: HashMap<String, WorkflowRecord> =
                serde_json::from_slice(&bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
            *self.active_workflows.lock().await = workflows;
        }

        if let Some(bytes) = self.store.get(&agents_key(&self.name)).await? {
            let agents: Vec<AgentSpec> =
                serde_json::from_slice(&bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
            *self.micro_agents.lock().await = agents;
        }

        Ok(())
    }

    pub async fn status_snapshot(&self) -> DepartmentStatus {
        let health = self.health.lock().await;
        DepartmentStatus {
            name: self.name.clone(),
            health_status: health.status,
            active_agents: self.micro_agents.lock().await.len(),
            running_workflows: self.active_workflows.lock().await.len(),
            workflows_completed: health.workflows_completed,
            workflows_failed: health.workflows_failed,
            average_completion_time: health.average_completion_time,
            error_count: health.error_count,
            custom: HashMap::new(),
        }
    }
}

/// A business-function department coordinating a roster of micro-agents.
/// The four `async fn`s are the abstract hooks every concrete department
/// supplies; the default methods are the shared lifecycle the original's
/// base class implemented once for every subtype.
#[async_trait]
pub trait Department: Send + Sync {
    fn core(&self) -> &DepartmentCore;

    async fn initialize_agents(&self) -> Result<bool>;
    async fn execute_workflow(&self, task: Value) -> Result<WorkflowOutcome>;
    async fn get_status(&self) -> Result<DepartmentStatus>;
    async fn calculate_business_impact(&self) -> Result<HashMap<String, f64>>;

    async fn start(&self) -> Result<bool> {
        self.core().load_state().await?;

        if !self.initialize_agents().await? {
            warn!(department = %self.core().name, "agent initialization failed");
            return Ok(false);
        }

        if let Some(bus) = &self.core().message_bus {
            let tag = format!("dept_{}", self.core().name.to_lowercase());
            bus.subscribe(&tag, &[format!("{tag}_broadcast"), "global_announcements".to_string()]).await?;
        }

        self.core().set_health(DepartmentHealth::Healthy).await;
        self.core().save_state().await?;
        info!(department = %self.core().name, "department started");
        Ok(true)
    }

    async fn stop(&self) -> Result<bool> {
        let workflow_ids: Vec<String> = self.core().active_workflows.lock().await.keys().cloned().collect();
        for id in workflow_ids {
            self.core().stop_workflow(&id).await?;
        }
        self.core().set_health(DepartmentHealth::Offline).await;
        self.core().save_state().await?;
        info!(department = %self.core().name, "department stopped");
        Ok(true)
    }

    async fn add_agent(&self, spec: AgentSpec) -> Result<bool> {
        self.core().add_agent(spec).await
    }

    async fn remove_agent(&self, agent_name: &str) -> Result<bool> {
        self.core().remove_agent(agent_name).await
    }

    /// Runs the workflow to completion rather than detaching it the way
    /// the original fires an `asyncio.create_task`: borrowing `&self` into
    /// a spawned task needs `Arc<Self>`, which the trait can't assume.
    /// Callers that want fire-and-forget semantics wrap this call in their
    /// own `tokio::spawn` over an owned `Arc<dyn Department>`.
    async fn start_workflow(&self, workflow_id: &str, task: Value) -> Result<bool> {
        if !self.core().begin_workflow(workflow_id, task.clone()).await {
            warn!(department = %self.core().name, workflow_id, "workflow already active");
            return Ok(false);
        }

        info!(department = %self.core().name, workflow_id, "workflow started");
        let outcome = self.execute_workflow(task).await;
        self.core().finish_workflow(workflow_id, outcome).await;
        self.core().save_state().await?;
        Ok(true)
    }

    async fn stop_workflow(&self, workflow_id: &str) -> Result<bool> {
        let stopped = self.core().stop_workflow(workflow_id).await?;
        self.core().save_state().await?;
        Ok(stopped)
    }
}
