//! ABOUTME: Checkpointed orchestrator state machine for agent creation
//! ABOUTME: Ported from orchestration/orchestrator.py's `HeyJarvisOrchestrator`

pub mod context;
pub mod deps;
pub mod nodes;
pub mod orchestrator;
pub mod state;

pub use context::{ContextMessage, ConversationContext, MessageRole};
pub use deps::OrchestratorDeps;
pub use orchestrator::{Orchestrator, ProgressCallback};
pub use state::{
    AgentStatusView, ClarificationNeeded, DeploymentStatus, ExecutionContext, IntentType, OrchestratorState,
    ParsedIntent, PartialUpdate,
};
