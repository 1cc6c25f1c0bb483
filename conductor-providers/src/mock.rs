//! ABOUTME: Deterministic Completion mock for tests
//! ABOUTME: Returns scripted responses keyed by call order, or an echo default

use crate::{Completion, CompletionOptions, CompletionResponse, Usage};
use async_trait::async_trait;
use conductor_core::Result;
use parking_lot::Mutex;

/// A `Completion` that replays a fixed script of responses, one per call,
/// falling back to echoing the user prompt once the script is exhausted.
pub struct MockCompletion {
    script: Mutex<Vec<String>>,
}

impl MockCompletion {
    pub fn new(script: Vec<String>) -> Self {
        Self {
            script: Mutex::new(script),
        }
    }

    pub fn empty() -> Self {
        Self::new(vec![])
    }
}

#[async_trait]
impl Completion for MockCompletion {
    async fn generate(
        &self,
        _system: &str,
        user: &str,
        _opts: CompletionOptions,
    ) -> Result<CompletionResponse> {
        let text = {
            let mut script = self.script.lock();
            if script.is_empty() {
                user.to_string()
            } else {
                script.remove(0)
            }
        };
        Ok(CompletionResponse {
            text,
            usage: Usage {
                prompt_tokens: user.len() as u32 / 4,
                completion_tokens: 0,
            },
        })
    }
}
