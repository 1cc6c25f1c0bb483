//! ABOUTME: Business-intent classification against free-text requests
//! ABOUTME: Ported from orchestration/jarvis.py's `BusinessIntent` model and `analyze_business_intent`

use conductor_core::Result;
use conductor_providers::{Completion, CompletionOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusinessIntentCategory {
    GrowRevenue,
    ReduceCosts,
    ImproveEfficiency,
    LaunchProduct,
    CustomAutomation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
}

/// The classifier's structured read on a request: what business goal it
/// serves, which departments and metrics it touches, and how big a lift it
/// is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessIntent {
    pub category: BusinessIntentCategory,
    pub confidence: f64,
    #[serde(default)]
    pub suggested_departments: Vec<String>,
    #[serde(default)]
    pub key_metrics_to_track: Vec<String>,
    pub reasoning: String,
    pub complexity_level: ComplexityLevel,
    pub estimated_timeline: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

impl BusinessIntent {
    /// The original's fallback when the classifier's output can't be
    /// parsed: treat the request as a one-off automation with low
    /// confidence rather than failing the whole flow.
    fn fallback(reasoning: impl Into<String>) -> Self {
        Self {
            category: BusinessIntentCategory::CustomAutomation,
            confidence: 0.3,
            suggested_departments: Vec::new(),
            key_metrics_to_track: Vec::new(),
            reasoning: reasoning.into(),
            complexity_level: ComplexityLevel::Moderate,
            estimated_timeline: "unknown".to_string(),
            prerequisites: Vec::new(),
            success_criteria: Vec::new(),
        }
    }
}

fn strip_json_fences(content: &str) -> &str {
    let content = content.trim();
    let content = content.strip_prefix("```json").unwrap_or(content);
    let content = content.strip_prefix("```").unwrap_or(content);
    content.strip_suffix("```").unwrap_or(content).trim()
}

fn extract_json_object(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => content,
    }
}

const SYSTEM_PROMPT: &str = "You are a business analyst classifying automation requests for an executive \
assistant. Return a JSON object with: category (one of GROW_REVENUE, REDUCE_COSTS, IMPROVE_EFFICIENCY, \
LAUNCH_PRODUCT, CUSTOM_AUTOMATION), confidence (0.0-1.0), suggested_departments (array of department names), \
key_metrics_to_track (array), reasoning (string), complexity_level (one of simple, moderate, complex), \
estimated_timeline (string), prerequisites (array), success_criteria (array).";

/// Classify a request into a [`BusinessIntent`]. Mirrors the original's
/// `analyze_business_intent`: on a malformed or unparseable response, fall
/// back to `CUSTOM_AUTOMATION` at low confidence rather than propagating
/// the parse error, since classification failure shouldn't block the
/// underlying automation request from running.
pub async fn classify_business_intent(
    completion: &dyn Completion,
    request: &str,
) -> Result<BusinessIntent> {
    let user_prompt = format!("Business automation request: {request}");
    let response = completion
        .generate(SYSTEM_PROMPT, &user_prompt, CompletionOptions::default())
        .await;

    let response = match response {
        Ok(r) => r,
        Err(e) => {
            return Ok(BusinessIntent::fallback(format!(
                "business intent classification unavailable: {e}"
            )))
        }
    };

    let json_text = extract_json_object(strip_json_fences(&response.text));
    match serde_json::from_str::<BusinessIntent>(json_text) {
        Ok(intent) => Ok(intent),
        Err(e) => {
            tracing::warn!(error = %e, "business intent response did not parse, falling back");
            Ok(BusinessIntent::fallback(format!(
                "could not classify request confidently: {e}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_providers::MockCompletion;

    #[tokio::test]
    async fn classifies_well_formed_response() {
        let completion = MockCompletion::new(vec![serde_json::json!({
            "category": "GROW_REVENUE",
            "confidence": 0.9,
            "suggested_departments": ["sales", "marketing"],
            "key_metrics_to_track": ["mrr", "conversion_rate"],
            "reasoning": "request targets new customer acquisition",
            "complexity_level": "moderate",
            "estimated_timeline": "2 weeks",
            "prerequisites": [],
            "success_criteria": ["mrr increases 10%"],
        })
        .to_string()]);

        let intent = classify_business_intent(&completion, "help me grow sales")
            .await
            .unwrap();
        assert_eq!(intent.category, BusinessIntentCategory::GrowRevenue);
        assert_eq!(intent.suggested_departments, vec!["sales", "marketing"]);
        assert_eq!(intent.complexity_level, ComplexityLevel::Moderate);
    }

    #[tokio::test]
    async fn falls_back_on_unparseable_response() {
        let completion = MockCompletion::new(vec!["not json at all".to_string()]);
        let intent = classify_business_intent(&completion, "do something")
            .await
            .unwrap();
        assert_eq!(intent.category, BusinessIntentCategory::CustomAutomation);
        assert!((intent.confidence - 0.3).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn strips_json_code_fences() {
        let fenced = format!(
            "```json\n{}\n```",
            serde_json::json!({
                "category": "REDUCE_COSTS",
                "confidence": 0.7,
                "suggested_departments": ["operations"],
                "key_metrics_to_track": ["burn_rate"],
                "reasoning": "trims recurring spend",
                "complexity_level": "simple",
                "estimated_timeline": "1 week",
                "prerequisites": [],
                "success_criteria": [],
            })
        );
        let completion = MockCompletion::new(vec![fenced]);
        let intent = classify_business_intent(&completion, "cut our AWS bill")
            .await
            .unwrap();
        assert_eq!(intent.category, BusinessIntentCategory::ReduceCosts);
    }
}
