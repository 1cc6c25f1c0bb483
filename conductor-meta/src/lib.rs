//! ABOUTME: Business-intent classification and per-session business context
//! ABOUTME: Ported from orchestration/jarvis.py and orchestration/business_context.py

pub mod context;
pub mod intent;
pub mod meta_orchestrator;

pub use context::{
    BusinessContext, BusinessGoal, CompanyProfile, CompanyStage, ContextSummary, GoalPriorityCounts, GoalProgress,
    GoalStatus, Industry, KeyMetrics, ResourceConstraints, Suggestion, SuggestionPriority,
};
pub use intent::{classify_business_intent, BusinessIntent, BusinessIntentCategory, ComplexityLevel};
pub use meta_orchestrator::{BusinessGuidance, BusinessResponse, JarvisMetadata, MetaOrchestrator};
