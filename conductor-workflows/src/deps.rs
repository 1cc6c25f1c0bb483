//! ABOUTME: Shared dependencies threaded through every orchestrator node
//! ABOUTME: Mirrors the constructor parameters of orchestrator.py's `HeyJarvisOrchestrator`

use conductor_agents::CodeSynthesizer;
use conductor_providers::Completion;
use conductor_security::SandboxRuntime;
use conductor_state_traits::StateStore;
use conductor_storage::CheckpointStore;
use std::sync::Arc;

/// Everything a node or the driver needs to reach outside this crate.
/// Built once per orchestrator instance and shared (by reference) across a
/// whole `process_request` call.
pub struct OrchestratorDeps {
    pub completion: Arc<dyn Completion>,
    pub synthesizer: CodeSynthesizer<Arc<dyn Completion>>,
    pub store: Arc<dyn StateStore>,
    pub checkpoints: CheckpointStore,
    /// `None` skips sandbox execution entirely; `deploy_agent` still
    /// persists the spec and reports `deployment_status = Completed`.
    pub sandbox: Option<Arc<dyn SandboxRuntime>>,
    pub session_timeout: u64,
    pub max_retries: u32,
}

impl OrchestratorDeps {
    pub fn new(
        completion: Arc<dyn Completion>,
        store: Arc<dyn StateStore>,
        checkpoint_ttl_s: u64,
        sandbox: Option<Arc<dyn SandboxRuntime>>,
        session_timeout: u64,
        max_retries: u32,
    ) -> Self {
        let synthesizer = CodeSynthesizer::new(completion.clone());
        let checkpoints = CheckpointStore::new(store.clone(), checkpoint_ttl_s);
        Self {
            completion,
            synthesizer,
            store,
            checkpoints,
            sandbox,
            session_timeout,
            max_retries,
        }
    }
}
