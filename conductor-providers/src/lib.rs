//! ABOUTME: Completion provider integration for Conductor
//! ABOUTME: Trait + HTTP-backed implementation + a mock for deterministic tests

mod http;
mod mock;

pub use http::{HttpCompletion, ProviderConfig};
pub use mock::MockCompletion;

use async_trait::async_trait;
use conductor_core::Result;
use serde::{Deserialize, Serialize};

/// Options for a single `generate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: Option<Vec<String>>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
            stop: None,
        }
    }
}

/// Token accounting returned alongside generated text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A completed generation: text plus token usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: Usage,
}

/// The external text-completion capability. Treated as non-deterministic;
/// callers parse its output defensively (strip code fences, find the
/// outermost `{...}`, fall back to documented sentinel defaults).
#[async_trait]
pub trait Completion: Send + Sync {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        opts: CompletionOptions,
    ) -> Result<CompletionResponse>;
}

#[async_trait]
impl Completion for std::sync::Arc<dyn Completion> {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        opts: CompletionOptions,
    ) -> Result<CompletionResponse> {
        self.as_ref().generate(system, user, opts).await
    }
}
