// 📦 Static Rule Sets - Compiled-in product recommendations
// Each rule set is a conjunction of small predicates over the cached aggregates

use crate::aggregates::AggregateProvider;
use crate::rules::Recommendation;
use crate::taxonomy::ProductType;
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// CAPABILITIES
// ============================================================================

/// A single boolean condition on a user's aggregates
pub trait Rule: Send + Sync {
    fn evaluate(&self, user_id: Uuid) -> Result<bool>;
}

/// A compiled-in recommendation: `Some` when the user qualifies
pub trait RecommendationRuleSet: Send + Sync {
    fn recommend(&self, user_id: Uuid) -> Result<Option<Recommendation>>;
}

// ============================================================================
// PREDICATES
// ============================================================================

/// User has transactions on the product type
pub struct UsesProduct {
    aggregates: Arc<dyn AggregateProvider>,
    product: ProductType,
}

impl Rule for UsesProduct {
    fn evaluate(&self, user_id: Uuid) -> Result<bool> {
        self.aggregates.uses_product_of_type(user_id, self.product)
    }
}

/// User has no transactions on the product type
pub struct UsesNoProduct {
    aggregates: Arc<dyn AggregateProvider>,
    product: ProductType,
}

impl Rule for UsesNoProduct {
    fn evaluate(&self, user_id: Uuid) -> Result<bool> {
        Ok(!self.aggregates.uses_product_of_type(user_id, self.product)?)
    }
}

/// Total deposits on any of `products` reach `threshold` (inclusive or strict)
pub struct DepositsTotalAbove {
    aggregates: Arc<dyn AggregateProvider>,
    products: Vec<ProductType>,
    threshold: i64,
    inclusive: bool,
}

impl Rule for DepositsTotalAbove {
    fn evaluate(&self, user_id: Uuid) -> Result<bool> {
        for product in &self.products {
            let total = self.aggregates.sum_deposits(*product, user_id)?;
            let passes = if self.inclusive {
                total >= self.threshold
            } else {
                total > self.threshold
            };
            if passes {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Total withdraws on the product type exceed `threshold`
pub struct WithdrawsTotalAbove {
    aggregates: Arc<dyn AggregateProvider>,
    product: ProductType,
    threshold: i64,
}

impl Rule for WithdrawsTotalAbove {
    fn evaluate(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.aggregates.sum_withdraws(self.product, user_id)? > self.threshold)
    }
}

/// Deposits on the product type exceed withdraws on it
pub struct DepositsExceedWithdraws {
    aggregates: Arc<dyn AggregateProvider>,
    product: ProductType,
}

impl Rule for DepositsExceedWithdraws {
    fn evaluate(&self, user_id: Uuid) -> Result<bool> {
        let deposits = self.aggregates.sum_deposits(self.product, user_id)?;
        let withdraws = self.aggregates.sum_withdraws(self.product, user_id)?;
        Ok(deposits > withdraws)
    }
}

// ============================================================================
// RULE SET
// ============================================================================

/// Recommends its product when every rule holds (checked in order, short-circuit)
pub struct StaticRuleSet {
    recommendation: Recommendation,
    rules: Vec<Box<dyn Rule>>,
}

impl StaticRuleSet {
    pub fn new(recommendation: Recommendation, rules: Vec<Box<dyn Rule>>) -> Self {
        StaticRuleSet { recommendation, rules }
    }

    pub fn name(&self) -> &str {
        &self.recommendation.name
    }
}

impl RecommendationRuleSet for StaticRuleSet {
    fn recommend(&self, user_id: Uuid) -> Result<Option<Recommendation>> {
        for rule in &self.rules {
            if !rule.evaluate(user_id)? {
                return Ok(None);
            }
        }
        Ok(Some(self.recommendation.clone()))
    }
}

// ============================================================================
// CATALOG
// ============================================================================

pub const INVEST_500_ID: &str = "147f6a0f-3b91-413b-ab99-87f081d60d5a";
pub const TOP_SAVING_ID: &str = "59efc529-2fff-41af-baff-90ccd7402925";
pub const SIMPLE_CREDIT_ID: &str = "ab138afb-f3ba-4a93-b74f-0fcee86d447f";

/// Debit user without investments and with more than 1 000 saved
pub fn invest_500(aggregates: Arc<dyn AggregateProvider>) -> StaticRuleSet {
    StaticRuleSet::new(
        Recommendation::new(
            INVEST_500_ID,
            "Invest 500",
            "Open an individual investment account with a tax deduction on \
             contributions of up to 400 000 per year. Start with as little as 500.",
        ),
        vec![
            Box::new(UsesProduct {
                aggregates: aggregates.clone(),
                product: ProductType::Debit,
            }),
            Box::new(UsesNoProduct {
                aggregates: aggregates.clone(),
                product: ProductType::Invest,
            }),
            Box::new(DepositsTotalAbove {
                aggregates,
                products: vec![ProductType::Saving],
                threshold: 1_000,
                inclusive: false,
            }),
        ],
    )
}

/// Debit user with a large balance who deposits more than they spend
pub fn top_saving(aggregates: Arc<dyn AggregateProvider>) -> StaticRuleSet {
    StaticRuleSet::new(
        Recommendation::new(
            TOP_SAVING_ID,
            "Top Saving",
            "A savings goal inside your debit account: set a target, \
             top up automatically and track your progress.",
        ),
        vec![
            Box::new(UsesProduct {
                aggregates: aggregates.clone(),
                product: ProductType::Debit,
            }),
            Box::new(DepositsTotalAbove {
                aggregates: aggregates.clone(),
                products: vec![ProductType::Debit, ProductType::Saving],
                threshold: 50_000,
                inclusive: true,
            }),
            Box::new(DepositsExceedWithdraws {
                aggregates,
                product: ProductType::Debit,
            }),
        ],
    )
}

/// Heavy debit spender without a credit product
pub fn simple_credit(aggregates: Arc<dyn AggregateProvider>) -> StaticRuleSet {
    StaticRuleSet::new(
        Recommendation::new(
            SIMPLE_CREDIT_ID,
            "Simple Credit",
            "A fast credit decision online, flexible terms and no hidden fees.",
        ),
        vec![
            Box::new(UsesNoProduct {
                aggregates: aggregates.clone(),
                product: ProductType::Credit,
            }),
            Box::new(DepositsExceedWithdraws {
                aggregates: aggregates.clone(),
                product: ProductType::Debit,
            }),
            Box::new(WithdrawsTotalAbove {
                aggregates,
                product: ProductType::Debit,
                threshold: 100_000,
            }),
        ],
    )
}

/// The compiled-in catalog, in evaluation order
pub fn default_rule_sets(
    aggregates: Arc<dyn AggregateProvider>,
) -> Vec<Box<dyn RecommendationRuleSet>> {
    vec![
        Box::new(invest_500(aggregates.clone())),
        Box::new(top_saving(aggregates.clone())),
        Box::new(simple_credit(aggregates)),
    ]
}

// ============================================================================
// TESTS
// ============================================================================
