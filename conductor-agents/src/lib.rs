//! ABOUTME: AgentSpec domain model, factories, and code synthesis
//! ABOUTME: The agent half of the orchestration core; consumed by conductor-workflows

pub mod capabilities;
pub mod factories;
pub mod spec;
pub mod synthesizer;
pub mod templates;
pub mod validate;

pub use spec::{
    AgentSpec, AgentStatus, AuthType, EventTrigger, FieldSchema, FieldType, IntegrationConfig,
    ManualTrigger, ResourceEstimate, ResourceLimits, TimeTrigger, Trigger, VersionKind,
};
pub use synthesizer::CodeSynthesizer;
pub use templates::TemplateKind;
pub use validate::ValidationResult;
