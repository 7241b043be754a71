// 🧭 Services - Rule administration and recommendation orchestration

use crate::aggregates::AggregateProvider;
use crate::cache::CachedAggregates;
use crate::error::{ServiceError, ServiceResult};
use crate::query::validate_queries;
use crate::rules::{DynamicRule, Recommendation, RuleEvaluator};
use crate::rulesets::{default_rule_sets, RecommendationRuleSet};
use crate::store::{RuleStat, RuleStatsStore, RuleStore};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// RULE SERVICE
// ============================================================================

pub struct RuleService {
    rules: Arc<dyn RuleStore>,
    stats: Arc<dyn RuleStatsStore>,
}

impl RuleService {
    pub fn new(rules: Arc<dyn RuleStore>, stats: Arc<dyn RuleStatsStore>) -> Self {
        RuleService { rules, stats }
    }

    /// Validate and persist a new rule; an invalid query rejects the whole rule
    pub fn add_rule(&self, rule: DynamicRule) -> ServiceResult<DynamicRule> {
        if let Err(e) = validate_queries(&rule.queries) {
            tracing::warn!(product = %rule.product_name, error = %e, "rule rejected");
            return Err(e.into());
        }

        let saved = self.rules.save(rule)?;
        let id = saved
            .id
            .ok_or_else(|| ServiceError::Unavailable("rule store returned no id".to_string()))?;

        if let Err(e) = self.stats.init_count(id) {
            tracing::error!(rule_id = id, error = %e, "stats init failed, rolling back rule");
            self.rules.delete_by_id(id)?;
            return Err(e.into());
        }

        tracing::info!(rule_id = id, product = %saved.product_name, "rule added");
        Ok(saved)
    }

    pub fn delete_rule(&self, id: i64) -> ServiceResult<()> {
        if !self.rules.exists(id)? {
            tracing::warn!(rule_id = id, "delete of unknown rule");
            return Err(ServiceError::RuleNotFound(id));
        }
        self.stats.delete_count(id)?;
        self.rules.delete_by_id(id)?;
        tracing::info!(rule_id = id, "rule deleted");
        Ok(())
    }

    pub fn list_rules(&self) -> ServiceResult<Vec<DynamicRule>> {
        Ok(self.rules.find_all()?)
    }

    /// One entry per existing rule; rules never matched report 0
    pub fn rule_stats(&self) -> ServiceResult<Vec<RuleStat>> {
        let counts: HashMap<i64, u64> = self
            .stats
            .all_counts()?
            .into_iter()
            .map(|s| (s.rule_id, s.count))
            .collect();

        Ok(self
            .rules
            .find_all()?
            .into_iter()
            .filter_map(|rule| rule.id)
            .map(|rule_id| RuleStat {
                rule_id,
                count: counts.get(&rule_id).copied().unwrap_or(0),
            })
            .collect())
    }
}

// ============================================================================
// RECOMMENDATION SERVICE
// ============================================================================

pub struct RecommendationService {
    rules: Arc<dyn RuleStore>,
    stats: Arc<dyn RuleStatsStore>,
    aggregates: Arc<dyn AggregateProvider>,
    evaluator: RuleEvaluator,
    rule_sets: Vec<Box<dyn RecommendationRuleSet>>,
}

impl RecommendationService {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        stats: Arc<dyn RuleStatsStore>,
        aggregates: Arc<dyn AggregateProvider>,
        rule_sets: Vec<Box<dyn RecommendationRuleSet>>,
    ) -> Self {
        RecommendationService {
            rules,
            stats,
            evaluator: RuleEvaluator::new(aggregates.clone()),
            aggregates,
            rule_sets,
        }
    }

    /// Dynamic rule matches first (in store order), then static rule sets
    pub fn recommend_for_user(&self, user_id: Uuid) -> ServiceResult<Vec<Recommendation>> {
        let mut recommendations = Vec::new();

        for rule in self.rules.find_all()? {
            if !self.evaluator.evaluate(&rule, user_id)? {
                continue;
            }
            recommendations.push(rule.recommendation());
            if let Some(id) = rule.id {
                // counter failures never fail the recommendation
                if let Err(e) = self.stats.increment_match_count(id) {
                    tracing::warn!(rule_id = id, error = %e, "match counter not updated");
                }
            }
        }

        for set in &self.rule_sets {
            if let Some(recommendation) = set.recommend(user_id)? {
                recommendations.push(recommendation);
            }
        }

        tracing::debug!(%user_id, count = recommendations.len(), "recommendations computed");
        Ok(recommendations)
    }

    pub fn recommend_for_user_name(&self, user_name: &str) -> ServiceResult<Vec<Recommendation>> {
        let user_id = self
            .aggregates
            .resolve_user_id(user_name)?
            .ok_or_else(|| {
                tracing::warn!(user_name, "user not found");
                ServiceError::UserNotFound(user_name.to_string())
            })?;
        self.recommend_for_user(user_id)
    }
}

// ============================================================================
// SERVICE CONTEXT (wiring)
// ============================================================================

/// Everything a front end needs, built around one shared aggregate cache
pub struct ServiceContext<P> {
    pub cache: Arc<CachedAggregates<P>>,
    pub rules: RuleService,
    pub recommendations: RecommendationService,
}

impl<P: AggregateProvider + 'static> ServiceContext<P> {
    /// Wire the services with the default static catalog
    pub fn new(provider: P, rules: Arc<dyn RuleStore>, stats: Arc<dyn RuleStatsStore>) -> Self {
        let cache = Arc::new(CachedAggregates::new(provider));
        let rule_sets = default_rule_sets(cache.clone());
        Self::with_rule_sets(cache, rules, stats, rule_sets)
    }

    pub fn with_rule_sets(
        cache: Arc<CachedAggregates<P>>,
        rules: Arc<dyn RuleStore>,
        stats: Arc<dyn RuleStatsStore>,
        rule_sets: Vec<Box<dyn RecommendationRuleSet>>,
    ) -> Self {
        let aggregates: Arc<dyn AggregateProvider> = cache.clone();
        ServiceContext {
            rules: RuleService::new(rules.clone(), stats.clone()),
            recommendations: RecommendationService::new(rules, stats, aggregates, rule_sets),
            cache,
        }
    }

    /// Administrative reset of every memoized aggregate
    pub fn clear_caches(&self) {
        self.cache.clear_caches();
    }
}

// ============================================================================
// TESTS
// ============================================================================
