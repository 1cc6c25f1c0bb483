//! ABOUTME: Shared types, error taxonomy, and identifiers for Conductor
//! ABOUTME: Foundation layer with no I/O, depended on by every other crate

pub mod error;
pub mod ids;
pub mod logging;

pub use error::{ConductorError, Result, SandboxErrorKind};
pub use ids::{AgentId, DepartmentId, LeadAgentId, MessageId, PrefixedId, SessionId};
