// Bank Product Recommendation Service - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod taxonomy;       // Product, transaction, comparison and query vocabularies
pub mod query;          // Query validation
pub mod aggregates;     // Per-user aggregate lookups
pub mod cache;          // Memoized aggregates
pub mod rules;          // Dynamic rules and their evaluator
pub mod rulesets;       // Compiled-in recommendation rule sets
pub mod store;          // Rule and rule-stats storage
pub mod service;        // Rule administration and recommendation orchestration
pub mod db;             // SQLite storage
pub mod config;

#[cfg(feature = "server")]
pub mod api;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use error::{ErrorKind, QueryError, ServiceError, ServiceResult, TokenError};
pub use taxonomy::{ComparisonType, ProductType, QueryType, TransactionType};
pub use query::{validate, validate_queries, DynamicRuleQuery, Query};
pub use aggregates::{AggregateProvider, ACTIVE_USER_THRESHOLD};
pub use cache::{AggregateCache, CachedAggregates};
pub use rules::{DynamicRule, Recommendation, RuleEvaluator, Verdict};
pub use rulesets::{default_rule_sets, RecommendationRuleSet, StaticRuleSet};
pub use store::{InMemoryRuleStats, InMemoryRuleStore, RuleStat, RuleStatsStore, RuleStore};
pub use service::{RecommendationService, RuleService, ServiceContext};
pub use db::{setup_database, Database};
pub use config::{init_tracing, ServiceConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
