//! ABOUTME: Closed vocabularies for capabilities and integration service names
//! ABOUTME: Plus the capability -> required-integration and required-scopes tables

/// The fixed ~30-tag capability vocabulary. Any capability outside this set
/// fails validation.
pub const CAPABILITIES: &[&str] = &[
    "email_monitoring",
    "email_sending",
    "calendar_management",
    "file_backup",
    "file_sync",
    "file_monitoring",
    "social_media_posting",
    "social_media_monitoring",
    "web_scraping",
    "api_integration",
    "data_processing",
    "report_generation",
    "alert_sending",
    "workflow_automation",
    "database_operations",
    "cloud_storage",
    "notification_management",
    "task_scheduling",
    "content_creation",
    "data_analysis",
    "lead_qualification",
    "personalization",
    "template_management",
    "a_b_testing",
    "timezone_handling",
    "scheduling_coordination",
    "analytics_computation",
    "crm_integration",
    "trend_analysis",
];

/// The closed whitelist of integration service names.
pub const SERVICES: &[&str] = &[
    "gmail",
    "outlook",
    "slack",
    "discord",
    "twitter",
    "linkedin",
    "github",
    "gitlab",
    "jira",
    "trello",
    "notion",
    "airtable",
    "dropbox",
    "google_drive",
    "aws_s3",
    "azure_blob",
    "webhook",
    "http_api",
    "database",
    "file_system",
    "sales_navigator",
    "anthropic",
    "google_calendar",
    "calendly",
    "zoom",
    "salesforce",
    "hubspot",
    "pipedrive",
    "crunchbase",
    "job_boards",
    "outreach_io",
    "custom_analytics",
];

pub fn is_known_capability(tag: &str) -> bool {
    CAPABILITIES.contains(&tag)
}

pub fn is_known_service(name: &str) -> bool {
    SERVICES.contains(&name)
}

/// Capability -> one-of required integrations. A capability present in this
/// table requires at least one of its listed services to be configured.
pub fn required_integrations_for(capability: &str) -> Option<&'static [&'static str]> {
    match capability {
        "email_monitoring" => Some(&["gmail", "outlook"]),
        "email_sending" => Some(&["gmail", "outlook"]),
        "social_media_posting" => Some(&["twitter", "linkedin"]),
        "social_media_monitoring" => Some(&["twitter", "linkedin"]),
        "file_backup" => Some(&["dropbox", "google_drive", "aws_s3"]),
        "file_sync" => Some(&["dropbox", "google_drive"]),
        "cloud_storage" => Some(&["aws_s3", "azure_blob", "google_drive"]),
        _ => None,
    }
}

/// Required scopes for a given service, conditioned on the capability set
/// that accompanies it. Returns `None` when the service has no scope
/// requirement.
pub fn required_scopes_for(service: &str, capabilities: &[String]) -> Option<Vec<&'static str>> {
    match service {
        "gmail" => {
            if capabilities.iter().any(|c| c == "email_monitoring") {
                Some(vec!["gmail.readonly"])
            } else {
                Some(vec!["gmail.send"])
            }
        }
        "slack" => {
            if capabilities
                .iter()
                .any(|c| c == "alert_sending" || c == "notification_management")
            {
                Some(vec!["chat:write"])
            } else {
                None
            }
        }
        "twitter" => {
            if capabilities.iter().any(|c| c == "social_media_posting") {
                Some(vec!["tweet.read", "tweet.write"])
            } else {
                Some(vec!["tweet.read"])
            }
        }
        _ => None,
    }
}
