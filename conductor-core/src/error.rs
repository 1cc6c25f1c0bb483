//! ABOUTME: Error types and handling for Conductor
//! ABOUTME: Provides ConductorError enum and Result type alias

use thiserror::Error;

/// Nested reason for a `SandboxError`, mirroring the sandbox lifecycle phase
/// that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxErrorKind {
    Timeout,
    Build,
    Create,
    Runtime,
}

impl std::fmt::Display for SandboxErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "Timeout",
            Self::Build => "Build",
            Self::Create => "Create",
            Self::Runtime => "Runtime",
        };
        write!(f, "{s}")
    }
}

/// Comprehensive error enum for all Conductor operations.
#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("Validation error on {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Code generation error: {0}")]
    CodeGeneration(String),

    #[error("Forbidden operation: {0}")]
    ForbiddenOperation(String),

    #[error("Sandbox error ({kind}): {message}")]
    Sandbox {
        kind: SandboxErrorKind,
        message: String,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Completion provider error: {0}")]
    Completion(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConductorError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn sandbox(kind: SandboxErrorKind, message: impl Into<String>) -> Self {
        Self::Sandbox {
            kind,
            message: message.into(),
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ConductorError>;
