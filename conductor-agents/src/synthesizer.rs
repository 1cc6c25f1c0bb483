//! ABOUTME: Two-phase agent code synthesis: template fast path, Completion-driven fallback
//! ABOUTME: Ported from the original AgentCodeGenerator.generate_agent_code retry loop

use crate::spec::AgentSpec;
use crate::templates::{self, TemplateKind};
use crate::validate::{self, APPROVED_LIBRARIES};
use conductor_core::{ConductorError, Result};
use conductor_providers::{Completion, CompletionOptions};
use tracing::{debug, info, warn};

const MAX_ATTEMPTS: u32 = 3;
const TEMPLATE_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Produces a validated source artifact for an `AgentSpec`.
pub struct CodeSynthesizer<C: Completion> {
    completion: C,
}

impl<C: Completion> CodeSynthesizer<C> {
    pub fn new(completion: C) -> Self {
        Self { completion }
    }

    /// Run the full §4.2 algorithm: template match, else generative
    /// fallback with up to `MAX_ATTEMPTS` retries.
    pub async fn synthesize(&self, spec: &AgentSpec) -> Result<String> {
        let matched = templates::match_template(spec);
        if matched.confidence >= TEMPLATE_CONFIDENCE_THRESHOLD && matched.kind != TemplateKind::Custom {
            let code = templates::render(matched.kind, spec);
            let result = validate::validate(&code);
            if result.is_valid {
                info!(agent = %spec.name, template = matched.kind.as_str(), "template fast path matched");
                return Ok(code);
            }
            warn!(agent = %spec.name, error = ?result.error, "template rendered invalid source, falling back");
        }

        self.generate_with_retries(spec).await
    }

    async fn generate_with_retries(&self, spec: &AgentSpec) -> Result<String> {
        let mut previous_error: Option<String> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            info!(agent = %spec.name, attempt, "code generation attempt");
            let system_prompt = build_system_prompt(spec);
            let user_prompt = build_user_prompt(spec, previous_error.as_deref());

            let response = self
                .completion
                .generate(&system_prompt, &user_prompt, CompletionOptions::default())
                .await
                .map_err(|e| ConductorError::Completion(e.to_string()))?;

            let code = strip_code_fences(&response.text);
            debug!(agent = %spec.name, len = code.len(), "generated candidate source");

            let result = validate::validate(&code);
            if result.is_valid {
                for warning in &result.warnings {
                    warn!(agent = %spec.name, warning, "synthesized code warning");
                }
                return Ok(code);
            }

            previous_error = result.error;
            warn!(agent = %spec.name, attempt, error = ?previous_error, "validation failed");
        }

        Err(ConductorError::CodeGeneration(
            previous_error.unwrap_or_else(|| "unknown synthesis failure".to_string()),
        ))
    }
}

fn strip_code_fences(content: &str) -> String {
    let content = content.trim();
    let content = if let Some(start) = content.find("```python") {
        let after = start + "```python".len();
        match content[after..].find("```") {
            Some(end) => content[after..after + end].trim(),
            None => content[after..].trim(),
        }
    } else if content.contains("```") {
        let parts: Vec<&str> = content.split("```").collect();
        if parts.len() >= 3 {
            parts[1].trim()
        } else {
            content.trim_matches('`').trim()
        }
    } else {
        content
    };

    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn build_system_prompt(spec: &AgentSpec) -> String {
    let approved = APPROVED_LIBRARIES.join(", ");
    format!(
        "You are an expert Python developer creating production-ready agent code.\n\n\
Generate clean, async Python code that:\n\
- is optimized for resource limits: CPU={cpu}, Memory={memory}MB\n\
- uses only these approved libraries: {approved}\n\
- includes comprehensive error handling and logging\n\n\
SECURITY RULES:\n\
- never use exec(), eval(), __import__(), subprocess, os.system(), globals(), locals(), compile()\n\
- never open files in write or append mode; use tempfile for scratch files\n\n\
STRUCTURE:\n\
1. class inheriting from SandboxAgent\n\
2. __init__(self) setting name, version, capabilities, config (call super().__init__())\n\
3. async initialize(self)\n\
4. async execute(self)\n\
5. async cleanup(self)\n\n\
Every method must have a non-empty body. Output only the source, no markdown fences, no commentary.",
        cpu = spec.resource_limits.cpu,
        memory = spec.resource_limits.memory,
        approved = approved,
    )
}

fn build_user_prompt(spec: &AgentSpec, previous_error: Option<&str>) -> String {
    let class = templates::class_name(&spec.name);
    let mut prompt = format!(
        "Generate Python code for an agent with these specifications:\n\n\
AGENT DETAILS:\n\
- Name: {name}\n\
- Description: {description}\n\
- Version: {version}\n\
- Class name: {class}\n\n\
FUNCTIONAL REQUIREMENTS:\n\
- Capabilities: {capabilities:?}\n\
- Triggers: {trigger_count}\n\
- Integrations: {integration_count}\n\n\
RESOURCE CONSTRAINTS:\n\
- CPU: {cpu} cores, Memory: {memory}MB, Timeout: {timeout}s, Max retries: {max_retries}",
        name = spec.name,
        description = spec.description,
        version = spec.version,
        class = class,
        capabilities = spec.capabilities,
        trigger_count = spec.triggers.len(),
        integration_count = spec.integrations.len(),
        cpu = spec.resource_limits.cpu,
        memory = spec.resource_limits.memory,
        timeout = spec.resource_limits.timeout,
        max_retries = spec.resource_limits.max_retries,
    );

    if let Some(error) = previous_error {
        prompt.push_str(&format!(
            "\n\nPREVIOUS ATTEMPT FAILED WITH ERROR:\n{error}\n\nFix the above and ensure every method has a body."
        ));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_providers::mock::MockCompletion;
    use std::collections::HashMap;

    fn spec_with_capability(cap: &str) -> AgentSpec {
        let mut integrations = HashMap::new();
        if cap == "email_monitoring" {
            integrations.insert(
                "gmail".to_string(),
                crate::spec::IntegrationConfig::new("gmail", crate::spec::AuthType::Oauth2)
                    .unwrap()
                    .with_scopes(vec!["gmail.readonly".to_string()]),
            );
        }
        crate::spec::AgentSpec::new(
            "Inbox Watcher",
            "Watches the inbox for new messages continuously.",
            vec![cap.to_string()],
            vec![crate::spec::Trigger::Time(
                crate::spec::TimeTrigger::interval(15).unwrap(),
            )],
            integrations,
            "session_1",
            crate::spec::ResourceLimits::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn template_fast_path_used_for_monitor_capability() {
        let spec = spec_with_capability("email_monitoring");
        let synthesizer = CodeSynthesizer::new(MockCompletion::empty());
        let code = synthesizer.synthesize(&spec).await.unwrap();
        assert!(code.contains("SandboxAgent"));
        assert!(code.contains("async def execute"));
    }

    #[tokio::test]
    async fn generative_fallback_used_when_no_template_matches() {
        let spec = crate::spec::AgentSpec::new(
            "Weird Helper",
            "Does something bespoke with no clear template match here.",
            vec!["workflow_automation".to_string()],
            vec![crate::spec::Trigger::Manual(
                crate::spec::ManualTrigger::new("run on demand please").unwrap(),
            )],
            HashMap::new(),
            "session_1",
            crate::spec::ResourceLimits::default(),
        )
        .unwrap();

        let generated = "import asyncio\nclass WeirdHelperAgent(SandboxAgent):\n    def __init__(self):\n        pass\n    async def initialize(self):\n        pass\n    async def execute(self):\n        pass\n    async def cleanup(self):\n        pass\n".to_string();
        let completion = MockCompletion::new(vec![generated]);
        let synthesizer = CodeSynthesizer::new(completion);
        let code = synthesizer.synthesize(&spec).await.unwrap();
        assert!(code.contains("WeirdHelperAgent"));
    }

    #[tokio::test]
    async fn exhausts_retries_and_surfaces_last_error() {
        let spec = crate::spec::AgentSpec::new(
            "Weird Helper",
            "Does something bespoke with no clear template match here.",
            vec!["workflow_automation".to_string()],
            vec![crate::spec::Trigger::Manual(
                crate::spec::ManualTrigger::new("run on demand please").unwrap(),
            )],
            HashMap::new(),
            "session_1",
            crate::spec::ResourceLimits::default(),
        )
        .unwrap();

        let completion = MockCompletion::new(vec![
            "not valid at all (".to_string(),
            "not valid at all (".to_string(),
            "not valid at all (".to_string(),
        ]);
        let synthesizer = CodeSynthesizer::new(completion);
        let result = synthesizer.synthesize(&spec).await;
        assert!(result.is_err());
    }
}
