//! ABOUTME: Per-session business context: company profile, metrics, goals, constraints
//! ABOUTME: Ported from orchestration/business_context.py's `BusinessContext`

use conductor_core::{ConductorError, Result};
use conductor_state_traits::StateStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const CONTEXT_TTL_S: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanyStage {
    Idea,
    Prototype,
    Launch,
    Growth,
    Scale,
    Mature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Industry {
    Saas,
    Ecommerce,
    Fintech,
    Healthcare,
    Education,
    Media,
    RealEstate,
    Consulting,
    Manufacturing,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub stage: CompanyStage,
    pub industry: Industry,
    pub team_size: u32,
    pub founded_year: Option<u32>,
    pub company_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyMetrics {
    pub mrr: Option<f64>,
    pub arr: Option<f64>,
    pub burn_rate: Option<f64>,
    pub runway: Option<i64>,
    pub cac: Option<f64>,
    pub ltv: Option<f64>,
    pub churn_rate: Option<f64>,
    pub growth_rate: Option<f64>,
    pub cash_balance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessGoal {
    pub title: String,
    pub description: String,
    pub target_value: Option<f64>,
    pub current_value: Option<f64>,
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub progress: f64,
}

fn default_priority() -> String {
    "medium".to_string()
}

fn default_category() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceConstraints {
    pub budget: Option<f64>,
    pub headcount_limit: Option<u32>,
    #[serde(default)]
    pub tech_stack_constraints: Vec<String>,
    #[serde(default)]
    pub compliance_requirements: Vec<String>,
    pub time_constraints: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Completed,
    OnTrack,
    AtRisk,
    Overdue,
    SlowProgress,
    NotStarted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalProgress {
    pub title: String,
    pub status: GoalStatus,
    pub progress: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionPriority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub area: String,
    pub message: String,
    pub priority: SuggestionPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSummary {
    pub session_id: String,
    pub has_profile: bool,
    pub has_metrics: bool,
    pub goal_count: usize,
    pub has_constraints: bool,
    pub company: Option<CompanyProfile>,
    pub metrics: Option<KeyMetrics>,
    pub goal_priority_counts: GoalPriorityCounts,
    pub average_goal_progress: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalPriorityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

fn key(session_id: &str, suffix: &str) -> String {
    format!("business:{session_id}:{suffix}")
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ConductorError::Storage(e.to_string()))
}

async fn load_json<T: for<'de> Deserialize<'de>>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// A session's accumulated picture of the business it's automating for:
/// company profile, key metrics, tracked goals, and resource constraints.
/// Loaded and saved against the `StateStore` under `business:{session}:*`
/// keys with a rolling 24h TTL, same as the session's own checkpoint data.
pub struct BusinessContext {
    store: Arc<dyn StateStore>,
    pub session_id: String,
    pub profile: Option<CompanyProfile>,
    pub metrics: KeyMetrics,
    pub goals: Vec<BusinessGoal>,
    pub constraints: Option<ResourceConstraints>,
}

impl BusinessContext {
    pub fn new(store: Arc<dyn StateStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            profile: None,
            metrics: KeyMetrics::default(),
            goals: Vec::new(),
            constraints: None,
        }
    }

    /// Load all four pieces of state for this session, leaving defaults in
    /// place for anything not yet persisted.
    pub async fn load(store: Arc<dyn StateStore>, session_id: impl Into<String>) -> Result<Self> {
        let session_id = session_id.into();
        let profile = load_json(store.as_ref(), &key(&session_id, "profile")).await?;
        let metrics = load_json(store.as_ref(), &key(&session_id, "metrics"))
            .await?
            .unwrap_or_default();
        let goals = load_json(store.as_ref(), &key(&session_id, "goals"))
            .await?
            .unwrap_or_default();
        let constraints = load_json(store.as_ref(), &key(&session_id, "constraints")).await?;
        Ok(Self {
            store,
            session_id,
            profile,
            metrics,
            goals,
            constraints,
        })
    }

    pub async fn save(&self) -> Result<()> {
        if let Some(profile) = &self.profile {
            self.store
                .setex(&key(&self.session_id, "profile"), CONTEXT_TTL_S, serialize(profile)?)
                .await?;
        }
        self.store
            .setex(&key(&self.session_id, "metrics"), CONTEXT_TTL_S, serialize(&self.metrics)?)
            .await?;
        self.store
            .setex(&key(&self.session_id, "goals"), CONTEXT_TTL_S, serialize(&self.goals)?)
            .await?;
        if let Some(constraints) = &self.constraints {
            self.store
                .setex(
                    &key(&self.session_id, "constraints"),
                    CONTEXT_TTL_S,
                    serialize(constraints)?,
                )
                .await?;
        }
        self.store
            .setex(
                &key(&self.session_id, "metadata"),
                CONTEXT_TTL_S,
                serialize(&chrono::Utc::now())?,
            )
            .await?;
        Ok(())
    }

    pub fn set_profile(&mut self, profile: CompanyProfile) {
        self.profile = Some(profile);
    }

    pub fn set_constraints(&mut self, constraints: ResourceConstraints) {
        self.constraints = Some(constraints);
    }

    pub fn add_goal(&mut self, goal: BusinessGoal) {
        self.goals.push(goal);
    }

    /// Clamp `progress` into `[0, 1]` before recording it, same as the
    /// original's `update_goal_progress`.
    pub fn update_goal_progress(&mut self, title: &str, progress: f64) -> bool {
        let Some(goal) = self.goals.iter_mut().find(|g| g.title == title) else {
            return false;
        };
        goal.progress = progress.clamp(0.0, 1.0);
        true
    }

    /// Update one named metric and, if it's one of the four base metrics,
    /// recompute the derived ones. Unknown metric names are a no-op,
    /// mirroring the original's `hasattr` guard.
    pub fn update_metric(&mut self, metric_name: &str, value: f64) {
        let recompute = matches!(metric_name, "mrr" | "arr" | "burn_rate" | "cash_balance");
        match metric_name {
            "mrr" => self.metrics.mrr = Some(value),
            "arr" => self.metrics.arr = Some(value),
            "burn_rate" => self.metrics.burn_rate = Some(value),
            "cac" => self.metrics.cac = Some(value),
            "ltv" => self.metrics.ltv = Some(value),
            "churn_rate" => self.metrics.churn_rate = Some(value),
            "growth_rate" => self.metrics.growth_rate = Some(value),
            "cash_balance" => self.metrics.cash_balance = Some(value),
            "runway" => self.metrics.runway = Some(value as i64),
            _ => return,
        }
        if recompute {
            self.calculate_derived_metrics();
        }
    }

    fn calculate_derived_metrics(&mut self) {
        if let (Some(cash), Some(burn)) = (self.metrics.cash_balance, self.metrics.burn_rate) {
            if burn > 0.0 {
                self.metrics.runway = Some((cash / burn) as i64);
            }
        }
        if let Some(mrr) = self.metrics.mrr {
            self.metrics.arr = Some(mrr * 12.0);
        }
    }

    /// Classify every goal's status. The original runs an `elif` chain off
    /// `due_date` (overdue / at_risk / completed) and then *unconditionally*
    /// overrides with not_started/slow_progress purely off `progress`,
    /// so a goal with 0% progress and no due date ends up `not_started`
    /// even though the due-date branch never ran.
    pub fn check_goal_progress(&self) -> Vec<GoalProgress> {
        self.goals
            .iter()
            .map(|goal| {
                let mut status = GoalStatus::OnTrack;
                if let Some(due_date) = goal.due_date {
                    let days_until_due = (due_date - chrono::Utc::now()).num_days();
                    if days_until_due < 0 {
                        status = GoalStatus::Overdue;
                    } else if days_until_due < 7 && goal.progress < 0.8 {
                        status = GoalStatus::AtRisk;
                    } else if goal.progress >= 1.0 {
                        status = GoalStatus::Completed;
                    }
                }
                if goal.progress < 0.1 {
                    status = GoalStatus::NotStarted;
                } else if goal.progress < 0.3 {
                    status = GoalStatus::SlowProgress;
                }
                GoalProgress {
                    title: goal.title.clone(),
                    status,
                    progress: goal.progress,
                }
            })
            .collect()
    }

    /// Rule-based health suggestions: runway, growth, unit economics,
    /// churn, team scaling, and baseline metrics tracking. Ordered by
    /// priority, same as the original's table.
    pub fn optimization_suggestions(&self) -> Vec<Suggestion> {
        let Some(profile) = &self.profile else {
            return vec![Suggestion {
                area: "data_collection".to_string(),
                message: "Complete your business profile to get tailored optimization suggestions".to_string(),
                priority: SuggestionPriority::High,
            }];
        };

        let mut suggestions = Vec::new();

        if let Some(runway) = self.metrics.runway {
            if runway < 6 {
                suggestions.push(Suggestion {
                    area: "runway".to_string(),
                    message: format!("Only {runway} months of runway left. Prioritize extending it."),
                    priority: SuggestionPriority::Critical,
                });
            } else if runway < 12 {
                suggestions.push(Suggestion {
                    area: "runway".to_string(),
                    message: format!("{runway} months of runway. Start planning your next raise or path to profitability."),
                    priority: SuggestionPriority::High,
                });
            }
        }

        if let Some(growth) = self.metrics.growth_rate {
            if growth < 0.05 {
                suggestions.push(Suggestion {
                    area: "growth".to_string(),
                    message: "Month-over-month growth is below 5%. Revisit acquisition and retention levers."
                        .to_string(),
                    priority: SuggestionPriority::High,
                });
            }
        }

        if let (Some(cac), Some(ltv)) = (self.metrics.cac, self.metrics.ltv) {
            if cac > 0.0 && ltv / cac < 3.0 {
                suggestions.push(Suggestion {
                    area: "unit_economics".to_string(),
                    message: "LTV:CAC ratio is below 3:1. Unit economics need attention before scaling spend."
                        .to_string(),
                    priority: SuggestionPriority::High,
                });
            }
        }

        if let Some(churn) = self.metrics.churn_rate {
            if churn > 0.05 {
                suggestions.push(Suggestion {
                    area: "retention".to_string(),
                    message: "Monthly churn is above 5%. Investigate retention before pushing new acquisition."
                        .to_string(),
                    priority: SuggestionPriority::High,
                });
            }
        }

        if profile.stage == CompanyStage::Growth && profile.team_size < 10 {
            suggestions.push(Suggestion {
                area: "scaling".to_string(),
                message: "Team is small for a growth-stage company. Headcount may need to grow to keep pace."
                    .to_string(),
                priority: SuggestionPriority::Medium,
            });
        }

        if profile.industry == Industry::Saas && self.metrics.mrr.is_none() {
            suggestions.push(Suggestion {
                area: "metrics".to_string(),
                message: "SaaS companies should track MRR. Start recording it to unlock revenue-based suggestions."
                    .to_string(),
                priority: SuggestionPriority::Medium,
            });
        }

        suggestions
    }

    pub fn context_summary(&self) -> ContextSummary {
        let mut counts = GoalPriorityCounts::default();
        for goal in &self.goals {
            match goal.priority.as_str() {
                "high" => counts.high += 1,
                "low" => counts.low += 1,
                _ => counts.medium += 1,
            }
        }
        let average_goal_progress = if self.goals.is_empty() {
            0.0
        } else {
            self.goals.iter().map(|g| g.progress).sum::<f64>() / self.goals.len() as f64
        };
        ContextSummary {
            session_id: self.session_id.clone(),
            has_profile: self.profile.is_some(),
            has_metrics: self.metrics.mrr.is_some()
                || self.metrics.arr.is_some()
                || self.metrics.burn_rate.is_some()
                || self.metrics.cash_balance.is_some(),
            goal_count: self.goals.len(),
            has_constraints: self.constraints.is_some(),
            company: self.profile.clone(),
            metrics: Some(self.metrics.clone()),
            goal_priority_counts: counts,
            average_goal_progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_storage::InMemoryStateStore;

    fn store() -> Arc<dyn StateStore> {
        Arc::new(InMemoryStateStore::new())
    }

    #[test]
    fn update_metric_recomputes_derived_values() {
        let mut ctx = BusinessContext::new(store(), "s1");
        ctx.update_metric("cash_balance", 120_000.0);
        ctx.update_metric("burn_rate", 20_000.0);
        assert_eq!(ctx.metrics.runway, Some(6));

        ctx.update_metric("mrr", 10_000.0);
        assert_eq!(ctx.metrics.arr, Some(120_000.0));
    }

    #[test]
    fn update_metric_ignores_unknown_names() {
        let mut ctx = BusinessContext::new(store(), "s1");
        ctx.update_metric("not_a_real_metric", 1.0);
        assert!(ctx.metrics.mrr.is_none());
    }

    #[test]
    fn goal_with_no_due_date_and_no_progress_is_not_started() {
        let mut ctx = BusinessContext::new(store(), "s1");
        ctx.add_goal(BusinessGoal {
            title: "Launch v2".to_string(),
            description: "ship it".to_string(),
            target_value: None,
            current_value: None,
            due_date: None,
            priority: "high".to_string(),
            category: "product".to_string(),
            progress: 0.0,
        });
        let progress = ctx.check_goal_progress();
        assert_eq!(progress[0].status, GoalStatus::NotStarted);
    }

    #[test]
    fn overdue_goal_with_real_progress_stays_overdue() {
        let mut ctx = BusinessContext::new(store(), "s1");
        ctx.add_goal(BusinessGoal {
            title: "Hit Q1 revenue target".to_string(),
            description: "".to_string(),
            target_value: Some(100_000.0),
            current_value: Some(40_000.0),
            due_date: Some(chrono::Utc::now() - chrono::Duration::days(3)),
            priority: "high".to_string(),
            category: "revenue".to_string(),
            progress: 0.4,
        });
        let progress = ctx.check_goal_progress();
        assert_eq!(progress[0].status, GoalStatus::Overdue);
    }

    #[test]
    fn missing_profile_short_circuits_to_a_single_suggestion() {
        let ctx = BusinessContext::new(store(), "s1");
        let suggestions = ctx.optimization_suggestions();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].area, "data_collection");
    }

    #[test]
    fn low_runway_and_small_growth_team_produce_expected_suggestions() {
        let mut ctx = BusinessContext::new(store(), "s1");
        ctx.set_profile(CompanyProfile {
            stage: CompanyStage::Growth,
            industry: Industry::Saas,
            team_size: 6,
            founded_year: Some(2023),
            company_name: Some("Acme".to_string()),
            description: None,
        });
        ctx.metrics.runway = Some(4);
        let suggestions = ctx.optimization_suggestions();
        let areas: Vec<&str> = suggestions.iter().map(|s| s.area.as_str()).collect();
        assert!(areas.contains(&"runway"));
        assert!(areas.contains(&"scaling"));
        assert!(areas.contains(&"metrics"));
        assert_eq!(suggestions[0].priority, SuggestionPriority::Critical);
    }

    #[tokio::test]
    async fn save_then_load_round_trips_profile_and_metrics() {
        let backing = store();
        let mut ctx = BusinessContext::new(backing.clone(), "s1");
        ctx.set_profile(CompanyProfile {
            stage: CompanyStage::Launch,
            industry: Industry::Fintech,
            team_size: 4,
            founded_year: None,
            company_name: None,
            description: None,
        });
        ctx.update_metric("mrr", 5_000.0);
        ctx.save().await.unwrap();

        let reloaded = BusinessContext::load(backing, "s1").await.unwrap();
        assert!(reloaded.profile.is_some());
        assert_eq!(reloaded.metrics.mrr, Some(5_000.0));
        assert_eq!(reloaded.metrics.arr, Some(60_000.0));
    }
}
