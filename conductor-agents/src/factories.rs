//! ABOUTME: Convenience constructors for common agent shapes
//! ABOUTME: Ported from `create_monitor_agent`/`create_sync_agent`/`create_report_agent`

use crate::spec::{AgentSpec, AuthType, FieldSchema, FieldType, IntegrationConfig, ResourceLimits, TimeTrigger, Trigger};
use conductor_core::Result;
use std::collections::HashMap;

fn titlecase(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Build a monitoring agent for `target` (email/files/website), polled
/// every `frequency` minutes.
pub fn create_monitor_agent(
    target: &str,
    frequency: u32,
    created_by: &str,
    name: Option<&str>,
    notification_channels: &[&str],
) -> Result<AgentSpec> {
    let target_lower = target.to_lowercase();
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} Monitor Agent", titlecase(target)));
    let description = format!("Monitors {target} every {frequency} minutes and sends alerts when conditions are met.");

    let mut capabilities = Vec::new();
    let mut integrations: HashMap<String, IntegrationConfig> = HashMap::new();

    match target_lower.as_str() {
        "email" | "gmail" | "inbox" => {
            capabilities.extend(["email_monitoring".to_string(), "alert_sending".to_string()]);
            integrations.insert(
                "gmail".to_string(),
                IntegrationConfig::new("gmail", AuthType::Oauth2)?.with_scopes(vec!["gmail.readonly".to_string()]),
            );
        }
        "files" | "folder" | "directory" => {
            capabilities.extend(["file_monitoring".to_string(), "alert_sending".to_string()]);
            integrations.insert(
                "file_system".to_string(),
                IntegrationConfig::new("file_system", AuthType::ApiKey)?.with_scopes(vec!["read".to_string()]),
            );
        }
        "website" | "web" | "url" => {
            capabilities.extend(["web_scraping".to_string(), "alert_sending".to_string()]);
            integrations.insert(
                "http_api".to_string(),
                IntegrationConfig::new("http_api", AuthType::ApiKey)?.with_scopes(vec!["read".to_string()]),
            );
        }
        _ => {}
    }

    for channel in notification_channels {
        match channel.to_lowercase().as_str() {
            "slack" => {
                integrations.insert(
                    "slack".to_string(),
                    IntegrationConfig::new("slack", AuthType::Oauth2)?.with_scopes(vec!["chat:write".to_string()]),
                );
            }
            "email" => capabilities.push("email_sending".to_string()),
            _ => {}
        }
    }

    AgentSpec::new(
        name,
        description,
        capabilities,
        vec![Trigger::Time(TimeTrigger::interval(frequency)?)],
        integrations,
        created_by,
        ResourceLimits {
            cpu: 0.5,
            memory: 256,
            ..ResourceLimits::default()
        },
    )
}

/// Build a sync agent moving data from `source` to `destination` on a cron
/// schedule (default: daily at 02:00).
pub fn create_sync_agent(
    source: &str,
    destination: &str,
    created_by: &str,
    schedule: Option<&str>,
    name: Option<&str>,
) -> Result<AgentSpec> {
    let schedule = schedule.unwrap_or("0 2 * * *");
    let name = name.map(str::to_string).unwrap_or_else(|| {
        let source_clean = source.replace('_', " ");
        let dest_clean = destination.replace('_', " ");
        format!(
            "{} to {} Sync Agent",
            source_clean.split(' ').map(titlecase).collect::<Vec<_>>().join(" "),
            dest_clean.split(' ').map(titlecase).collect::<Vec<_>>().join(" "),
        )
    });
    let description = format!("Automatically synchronizes data from {source} to {destination} on schedule.");

    let capabilities = vec!["file_sync".to_string(), "data_processing".to_string()];
    let mut integrations: HashMap<String, IntegrationConfig> = HashMap::new();

    match source.to_lowercase().as_str() {
        "google_drive" | "gdrive" => {
            integrations.insert(
                "google_drive".to_string(),
                IntegrationConfig::new("google_drive", AuthType::Oauth2)?
                    .with_scopes(vec!["drive.readonly".to_string()]),
            );
        }
        "dropbox" => {
            integrations.insert(
                "dropbox".to_string(),
                IntegrationConfig::new("dropbox", AuthType::Oauth2)?
                    .with_scopes(vec!["files.content.read".to_string()]),
            );
        }
        _ => {}
    }

    match destination.to_lowercase().as_str() {
        "aws_s3" | "s3" => {
            integrations.insert(
                "aws_s3".to_string(),
                IntegrationConfig::new("aws_s3", AuthType::ApiKey)?
                    .with_scopes(vec!["s3:PutObject".to_string(), "s3:PutObjectAcl".to_string()]),
            );
        }
        "azure_blob" => {
            integrations.insert(
                "azure_blob".to_string(),
                IntegrationConfig::new("azure_blob", AuthType::ApiKey)?.with_scopes(vec!["blob.write".to_string()]),
            );
        }
        _ => {}
    }

    AgentSpec::new(
        name,
        description,
        capabilities,
        vec![Trigger::Time(TimeTrigger::cron(schedule)?)],
        integrations,
        created_by,
        ResourceLimits {
            cpu: 1.0,
            memory: 512,
            ..ResourceLimits::default()
        },
    )
}

/// Build a report-generation agent reading from `data_source` on a cron
/// schedule and delivering a `report_format` report by email.
pub fn create_report_agent(
    data_source: &str,
    schedule: &str,
    created_by: &str,
    report_format: Option<&str>,
    name: Option<&str>,
) -> Result<AgentSpec> {
    let report_format = report_format.unwrap_or("pdf");
    let name = name.map(str::to_string).unwrap_or_else(|| {
        let clean = data_source.replace('_', " ");
        format!("{} Report Agent", clean.split(' ').map(titlecase).collect::<Vec<_>>().join(" "))
    });
    let description = format!(
        "Generates {} reports from {data_source} data on schedule.",
        report_format.to_uppercase()
    );

    let capabilities = vec![
        "data_analysis".to_string(),
        "report_generation".to_string(),
        "email_sending".to_string(),
    ];
    let mut integrations: HashMap<String, IntegrationConfig> = HashMap::new();

    match data_source.to_lowercase().as_str() {
        "database" | "db" => {
            integrations.insert(
                "database".to_string(),
                IntegrationConfig::new("database", AuthType::ApiKey)?.with_scopes(vec!["read".to_string()]),
            );
        }
        "google_sheets" | "sheets" => {
            integrations.insert(
                "google_drive".to_string(),
                IntegrationConfig::new("google_drive", AuthType::Oauth2)?
                    .with_scopes(vec!["spreadsheets.readonly".to_string()]),
            );
        }
        "airtable" => {
            integrations.insert(
                "airtable".to_string(),
                IntegrationConfig::new("airtable", AuthType::ApiKey)?.with_scopes(vec!["base.read".to_string()]),
            );
        }
        _ => {}
    }

    integrations.insert(
        "gmail".to_string(),
        IntegrationConfig::new("gmail", AuthType::Oauth2)?.with_scopes(vec!["gmail.send".to_string()]),
    );

    let mut spec = AgentSpec::new(
        name,
        description,
        capabilities,
        vec![Trigger::Time(TimeTrigger::cron(schedule)?)],
        integrations,
        created_by,
        ResourceLimits {
            cpu: 1.5,
            memory: 768,
            ..ResourceLimits::default()
        },
    )?;

    spec.outputs.insert(
        "report_file".to_string(),
        FieldSchema {
            field_name: "report_file".to_string(),
            field_type: FieldType::String,
            required: true,
            description: format!("Generated {} report file path", report_format.to_uppercase()),
            validation_rules: Default::default(),
            default_value: None,
        },
    );
    spec.outputs.insert(
        "summary".to_string(),
        FieldSchema {
            field_name: "summary".to_string(),
            field_type: FieldType::String,
            required: true,
            description: "Report summary and key metrics".to_string(),
            validation_rules: Default::default(),
            default_value: None,
        },
    );

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_agent_for_email_target() {
        let spec = create_monitor_agent("email", 15, "session_1", None, &["slack"]).unwrap();
        assert!(spec.capabilities.contains(&"email_monitoring".to_string()));
        assert!(spec.integrations.contains_key("gmail"));
        assert!(spec.integrations.contains_key("slack"));
        assert_eq!(spec.name, "Email Monitor Agent");
    }

    #[test]
    fn sync_agent_defaults_to_daily_cron() {
        let spec = create_sync_agent("google_drive", "aws_s3", "session_1", None, None).unwrap();
        match &spec.triggers[0] {
            Trigger::Time(t) => assert_eq!(t.cron_expression.as_deref(), Some("0 2 * * *")),
            _ => panic!("expected time trigger"),
        }
    }

    #[test]
    fn report_agent_always_includes_gmail_delivery() {
        let spec = create_report_agent("database", "0 8 * * MON", "session_1", Some("pdf"), None).unwrap();
        assert!(spec.integrations.contains_key("gmail"));
        assert!(spec.outputs.contains_key("report_file"));
        assert!(spec.outputs.contains_key("summary"));
    }
}
