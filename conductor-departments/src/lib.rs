//! ABOUTME: Department lifecycle and DepartmentOrchestrator coordination modes
//! ABOUTME: Ported from departments/base_department.py's `Department`/`DepartmentOrchestrator`

pub mod coordinator;
pub mod department;

pub use coordinator::{
    AgentTaskContext, AgentTaskOutcome, AgentTaskRunner, CoordinationContext, CoordinationMode, CoordinationOutcome,
    DepartmentOrchestrator, NoopAgentTaskRunner, TaskComplexity,
};
pub use department::{
    Department, DepartmentCore, DepartmentHealth, DepartmentStatus, WorkflowOutcome, WorkflowRecord, WorkflowStatus,
};
