//! ABOUTME: AgentSpec data model and its nested types
//! ABOUTME: Ported field-for-field from the original AgentSpec/ResourceLimits/IntegrationConfig/Trigger models

use crate::capabilities::{is_known_capability, is_known_service, required_integrations_for, required_scopes_for};
use chrono::{DateTime, Utc};
use conductor_core::{ConductorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// CPU/memory/time/retry caps for one agent's execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceLimits {
    pub cpu: f64,
    pub memory: u32,
    pub timeout: u32,
    pub max_retries: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu: 1.0,
            memory: 512,
            timeout: 300,
            max_retries: 3,
        }
    }
}

impl ResourceLimits {
    pub fn validate(&self) -> Result<()> {
        if !(0.1..=4.0).contains(&self.cpu) {
            return Err(ConductorError::validation("resource_limits.cpu", "must be in [0.1, 4.0]"));
        }
        if !(128..=2048).contains(&self.memory) {
            return Err(ConductorError::validation(
                "resource_limits.memory",
                "must be in [128, 2048]",
            ));
        }
        if !(30..=3600).contains(&self.timeout) {
            return Err(ConductorError::validation(
                "resource_limits.timeout",
                "must be in [30, 3600]",
            ));
        }
        if self.max_retries > 10 {
            return Err(ConductorError::validation(
                "resource_limits.max_retries",
                "must be in [0, 10]",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Oauth2,
    ApiKey,
    Webhook,
    Internal,
    Scraping,
}

/// Configuration for one external service integration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationConfig {
    pub service_name: String,
    pub auth_type: AuthType,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub rate_limit: Option<u32>,
    #[serde(default)]
    pub validated: bool,
}

impl IntegrationConfig {
    pub fn new(service_name: impl Into<String>, auth_type: AuthType) -> Result<Self> {
        let service_name = service_name.into().to_lowercase();
        if !is_known_service(&service_name) {
            return Err(ConductorError::validation(
                "integration.service_name",
                format!("'{service_name}' not in allowed services"),
            ));
        }
        Ok(Self {
            service_name,
            auth_type,
            scopes: vec![],
            rate_limit: None,
            validated: false,
        })
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !is_known_service(&self.service_name) {
            return Err(ConductorError::validation(
                "integration.service_name",
                format!("'{}' not in allowed services", self.service_name),
            ));
        }
        if let Some(rl) = self.rate_limit {
            if !(1..=10_000).contains(&rl) {
                return Err(ConductorError::validation(
                    "integration.rate_limit",
                    "must be in [1, 10000]",
                ));
            }
        }
        Ok(())
    }
}

/// One of {Time, Event, Manual}.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "trigger_type", rename_all = "snake_case")]
pub enum Trigger {
    Time(TimeTrigger),
    Event(EventTrigger),
    Manual(ManualTrigger),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeTrigger {
    pub cron_expression: Option<String>,
    pub interval_minutes: Option<u32>,
}

impl TimeTrigger {
    pub fn cron(expr: impl Into<String>) -> Result<Self> {
        let expr = expr.into();
        if expr.split_whitespace().count() != 5 {
            return Err(ConductorError::validation(
                "time_trigger.cron_expression",
                "must have 5 whitespace-separated fields",
            ));
        }
        Ok(Self {
            cron_expression: Some(expr),
            interval_minutes: None,
        })
    }

    pub fn interval(minutes: u32) -> Result<Self> {
        if !(1..=43_200).contains(&minutes) {
            return Err(ConductorError::validation(
                "time_trigger.interval_minutes",
                "must be in [1, 43200]",
            ));
        }
        Ok(Self {
            cron_expression: None,
            interval_minutes: Some(minutes),
        })
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.cron_expression, self.interval_minutes) {
            (None, None) => Err(ConductorError::validation(
                "time_trigger",
                "either cron_expression or interval_minutes must be provided",
            )),
            (Some(_), Some(_)) => Err(ConductorError::validation(
                "time_trigger",
                "cannot specify both cron_expression and interval_minutes",
            )),
            (Some(expr), None) => {
                if expr.split_whitespace().count() != 5 {
                    return Err(ConductorError::validation(
                        "time_trigger.cron_expression",
                        "must have 5 whitespace-separated fields",
                    ));
                }
                Ok(())
            }
            (None, Some(m)) => {
                if !(1..=43_200).contains(&m) {
                    return Err(ConductorError::validation(
                        "time_trigger.interval_minutes",
                        "must be in [1, 43200]",
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EventTrigger {
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub event_types: Vec<String>,
    pub source_service: Option<String>,
}

impl EventTrigger {
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConductorError::validation(
                    "event_trigger.webhook_url",
                    "must start with http:// or https://",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManualTrigger {
    pub description: String,
}

impl ManualTrigger {
    pub fn new(description: impl Into<String>) -> Result<Self> {
        let description = description.into();
        if !(5..=200).contains(&description.len()) {
            return Err(ConductorError::validation(
                "manual_trigger.description",
                "must be 5-200 characters",
            ));
        }
        Ok(Self { description })
    }
}

impl Trigger {
    pub fn validate(&self) -> Result<()> {
        match self {
            Trigger::Time(t) => t.validate(),
            Trigger::Event(e) => e.validate(),
            Trigger::Manual(m) => {
                if !(5..=200).contains(&m.description.len()) {
                    return Err(ConductorError::validation(
                        "manual_trigger.description",
                        "must be 5-200 characters",
                    ));
                }
                Ok(())
            }
        }
    }

    fn overhead(&self) -> (f64, f64) {
        match self {
            Trigger::Time(_) => (0.05, 8.0),
            Trigger::Event(_) => (0.1, 16.0),
            Trigger::Manual(_) => (0.02, 4.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

/// Schema for one input/output field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSchema {
    pub field_name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    pub description: String,
    #[serde(default)]
    pub validation_rules: serde_json::Map<String, serde_json::Value>,
    pub default_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

#[derive(Debug, Clone, Copy)]
pub enum VersionKind {
    Major,
    Minor,
    Patch,
}

/// Projected resource usage returned by `estimate_resources`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResourceEstimate {
    pub estimated_cpu: f64,
    pub estimated_memory: f64,
    pub efficiency_score: f64,
}

/// The central typed description of an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub integrations: HashMap<String, IntegrationConfig>,
    #[serde(default)]
    pub inputs: HashMap<String, FieldSchema>,
    #[serde(default)]
    pub outputs: HashMap<String, FieldSchema>,
    pub resource_limits: ResourceLimits,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub status: AgentStatus,
}

impl AgentSpec {
    /// Construct and validate a fresh spec. Fails closed on any §3 invariant
    /// violation.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        capabilities: Vec<String>,
        triggers: Vec<Trigger>,
        integrations: HashMap<String, IntegrationConfig>,
        created_by: impl Into<String>,
        resource_limits: ResourceLimits,
    ) -> Result<Self> {
        let now = Utc::now();
        let spec = Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            version: "1.0.0".to_string(),
            capabilities,
            triggers,
            integrations,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            resource_limits,
            created_at: now,
            updated_at: now,
            created_by: created_by.into(),
            status: AgentStatus::Draft,
        };
        spec.validate_all()?;
        Ok(spec)
    }

    /// Deserialize and fully validate a spec from a JSON blob.
    pub fn parse(blob: &[u8]) -> Result<Self> {
        let spec: Self =
            serde_json::from_slice(blob).map_err(|e| ConductorError::Parse(e.to_string()))?;
        spec.validate_all()?;
        Ok(spec)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ConductorError::Storage(e.to_string()))
    }

    /// Run every §3 invariant. Fields already checked by typed constructors
    /// (enum variants, etc.) are re-checked here so that deserialized specs
    /// from untrusted sources are covered too.
    pub fn validate_all(&self) -> Result<()> {
        if !(2..=50).contains(&self.name.trim().len()) {
            return Err(ConductorError::validation("name", "must be 2-50 characters"));
        }
        if !self.name.chars().all(|c| c.is_alphanumeric() || c.is_whitespace()) {
            return Err(ConductorError::validation(
                "name",
                "must contain only alphanumeric characters and spaces",
            ));
        }
        if !(10..=500).contains(&self.description.len()) {
            return Err(ConductorError::validation(
                "description",
                "must be 10-500 characters",
            ));
        }
        semver_parts(&self.version)?;

        if self.capabilities.is_empty() {
            return Err(ConductorError::validation("capabilities", "at least one required"));
        }
        for cap in &self.capabilities {
            if !is_known_capability(cap) {
                return Err(ConductorError::validation("capabilities", format!("'{cap}' is not a known capability")));
            }
        }

        if self.triggers.is_empty() {
            return Err(ConductorError::validation("triggers", "at least one required"));
        }
        for trigger in &self.triggers {
            trigger.validate()?;
        }

        for (key, integration) in &self.integrations {
            if key != &integration.service_name {
                return Err(ConductorError::validation(
                    "integrations",
                    format!("key '{key}' doesn't match service_name '{}'", integration.service_name),
                ));
            }
            integration.validate()?;
        }

        self.resource_limits.validate()?;
        self.validate_capabilities_map()?;
        self.validate_integrations()?;
        Ok(())
    }

    /// Capability -> required-integration dependency check.
    pub fn validate_capabilities_map(&self) -> Result<()> {
        for capability in &self.capabilities {
            if let Some(required) = required_integrations_for(capability) {
                if !required.iter().any(|svc| self.integrations.contains_key(*svc)) {
                    return Err(ConductorError::validation(
                        "capabilities",
                        format!(
                            "capability '{capability}' requires one of these integrations: {required:?}"
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Required-scope presence check for services whose scopes depend on
    /// the spec's capability set.
    pub fn validate_integrations(&self) -> Result<()> {
        for (service_name, config) in &self.integrations {
            if let Some(required) = required_scopes_for(service_name, &self.capabilities) {
                if config.scopes.is_empty() && !required.is_empty() {
                    return Err(ConductorError::validation(
                        "integrations",
                        format!("integration '{service_name}' requires scopes: {required:?}"),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn increment_version(&mut self, kind: VersionKind) -> Result<()> {
        let (mut major, mut minor, mut patch) = semver_parts(&self.version)?;
        match kind {
            VersionKind::Major => {
                major += 1;
                minor = 0;
                patch = 0;
            }
            VersionKind::Minor => {
                minor += 1;
                patch = 0;
            }
            VersionKind::Patch => patch += 1,
        }
        self.version = format!("{major}.{minor}.{patch}");
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Projected `{cpu, memory, efficiency_score}` from the fixed weight
    /// table, clamped by `resource_limits`.
    pub fn estimate_resources(&self) -> ResourceEstimate {
        let mut cpu = 0.5_f64;
        let mut memory = 256.0_f64;

        for capability in &self.capabilities {
            let (cpu_add, mem_add) = capability_weight(capability);
            cpu += cpu_add;
            memory += mem_add;
        }

        cpu += self.integrations.len() as f64 * 0.1;
        memory += self.integrations.len() as f64 * 16.0;

        for trigger in &self.triggers {
            let (cpu_add, mem_add) = trigger.overhead();
            cpu += cpu_add;
            memory += mem_add;
        }

        let efficiency_score = if self.capabilities.is_empty() {
            1.0
        } else {
            (cpu + memory / 512.0) / self.capabilities.len() as f64
        };

        ResourceEstimate {
            estimated_cpu: cpu.min(self.resource_limits.cpu),
            estimated_memory: memory.min(self.resource_limits.memory as f64),
            efficiency_score,
        }
    }

    /// Union of scopes across all integrations, deduplicated.
    pub fn required_scopes(&self) -> Vec<String> {
        let mut scopes: HashSet<String> = HashSet::new();
        for integration in self.integrations.values() {
            scopes.extend(integration.scopes.iter().cloned());
        }
        let mut scopes: Vec<String> = scopes.into_iter().collect();
        scopes.sort();
        scopes
    }
}

fn capability_weight(capability: &str) -> (f64, f64) {
    match capability {
        "data_processing" => (0.5, 128.0),
        "web_scraping" => (0.3, 64.0),
        "file_backup" => (0.2, 128.0),
        "email_monitoring" => (0.1, 32.0),
        "social_media_posting" => (0.1, 32.0),
        "report_generation" => (0.4, 96.0),
        "data_analysis" => (0.6, 256.0),
        _ => (0.0, 0.0),
    }
}

fn semver_parts(version: &str) -> Result<(u32, u32, u32)> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() != 3 {
        return Err(ConductorError::validation("version", "must follow MAJOR.MINOR.PATCH"));
    }
    let parse = |s: &str| s.parse::<u32>().map_err(|_| ConductorError::validation("version", "must follow MAJOR.MINOR.PATCH"));
    Ok((parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec() -> AgentSpec {
        let mut integrations = HashMap::new();
        integrations.insert(
            "gmail".to_string(),
            IntegrationConfig::new("gmail", AuthType::Oauth2)
                .unwrap()
                .with_scopes(vec!["gmail.readonly".to_string()]),
        );
        AgentSpec::new(
            "Email Monitor Agent",
            "Monitors the inbox for urgent messages and sends alerts.",
            vec!["email_monitoring".to_string(), "alert_sending".to_string()],
            vec![Trigger::Time(TimeTrigger::interval(15).unwrap())],
            integrations,
            "session_abc",
            ResourceLimits::default(),
        )
        .unwrap()
    }

    #[test]
    fn valid_spec_constructs() {
        let spec = base_spec();
        assert_eq!(spec.version, "1.0.0");
        assert_eq!(spec.status, AgentStatus::Draft);
    }

    #[test]
    fn rejects_empty_capabilities() {
        let err = AgentSpec::new(
            "Name",
            "A description long enough to pass.",
            vec![],
            vec![Trigger::Manual(ManualTrigger::new("run on demand").unwrap())],
            HashMap::new(),
            "s1",
            ResourceLimits::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_capability_missing_integration() {
        let err = AgentSpec::new(
            "Email Monitor",
            "Monitors the inbox for urgent messages.",
            vec!["email_monitoring".to_string()],
            vec![Trigger::Time(TimeTrigger::interval(30).unwrap())],
            HashMap::new(),
            "s1",
            ResourceLimits::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn time_trigger_rejects_both_cron_and_interval() {
        let t = TimeTrigger {
            cron_expression: Some("0 2 * * *".to_string()),
            interval_minutes: Some(5),
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn time_trigger_rejects_neither() {
        let t = TimeTrigger {
            cron_expression: None,
            interval_minutes: None,
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn cron_with_four_fields_rejected() {
        assert!(TimeTrigger::cron("* * * *").is_err());
    }

    #[test]
    fn interval_boundaries() {
        assert!(TimeTrigger::interval(0).is_err());
        assert!(TimeTrigger::interval(1).is_ok());
        assert!(TimeTrigger::interval(43_200).is_ok());
        assert!(TimeTrigger::interval(43_201).is_err());
    }

    #[test]
    fn memory_boundaries() {
        let mut rl = ResourceLimits::default();
        rl.memory = 127;
        assert!(rl.validate().is_err());
        rl.memory = 128;
        assert!(rl.validate().is_ok());
        rl.memory = 2048;
        assert!(rl.validate().is_ok());
        rl.memory = 2049;
        assert!(rl.validate().is_err());
    }

    #[test]
    fn version_increment_patch_twice() {
        let mut spec = base_spec();
        spec.increment_version(VersionKind::Patch).unwrap();
        spec.increment_version(VersionKind::Patch).unwrap();
        assert_eq!(spec.version, "1.0.2");
    }

    #[test]
    fn integration_key_must_match_service_name() {
        let mut spec = base_spec();
        spec.integrations.insert(
            "outlook".to_string(),
            IntegrationConfig::new("gmail", AuthType::Oauth2).unwrap(),
        );
        assert!(spec.validate_all().is_err());
    }

    #[test]
    fn round_trip_through_serialize_parse() {
        let spec = base_spec();
        let bytes = spec.serialize().unwrap();
        let parsed = AgentSpec::parse(&bytes).unwrap();
        assert_eq!(spec, parsed);
    }
}
