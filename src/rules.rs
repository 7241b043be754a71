// 🏷️ Dynamic Rules - Rules as Data
// User-authored recommendation predicates and the evaluator that applies them

use crate::aggregates::AggregateProvider;
use crate::query::{DynamicRuleQuery, Query};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRule {
    /// Assigned by the rule store on save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Product recommended when the rule matches
    pub product_id: String,
    pub product_name: String,
    pub product_text: String,

    /// Conditions, all of which must hold
    #[serde(rename = "rule", alias = "queries", default)]
    pub queries: Vec<DynamicRuleQuery>,
}

impl DynamicRule {
    pub fn new(product_id: &str, product_name: &str, product_text: &str) -> Self {
        DynamicRule {
            id: None,
            product_id: product_id.to_string(),
            product_name: product_name.to_string(),
            product_text: product_text.to_string(),
            queries: Vec::new(),
        }
    }

    /// Builder-style query append
    pub fn with_query(mut self, query: DynamicRuleQuery) -> Self {
        self.queries.push(query);
        self
    }

    pub fn recommendation(&self) -> Recommendation {
        Recommendation {
            id: self.product_id.clone(),
            name: self.product_name.clone(),
            text: self.product_text.clone(),
        }
    }
}

// ============================================================================
// RECOMMENDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub name: String,
    pub text: String,
}

impl Recommendation {
    pub fn new(id: &str, name: &str, text: &str) -> Self {
        Recommendation {
            id: id.to_string(),
            name: name.to_string(),
            text: text.to_string(),
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{}", self.name, self.text)
    }
}

// ============================================================================
// VERDICT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Matched,
    NotMatched,
    /// The rule could not be parsed; it never matches
    Malformed(String),
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Matched)
    }
}

// ============================================================================
// RULE EVALUATOR
// ============================================================================

#[derive(Clone)]
pub struct RuleEvaluator {
    aggregates: Arc<dyn AggregateProvider>,
}

impl RuleEvaluator {
    pub fn new(aggregates: Arc<dyn AggregateProvider>) -> Self {
        RuleEvaluator { aggregates }
    }

    /// Evaluate a rule for a user, keeping malformed rules distinguishable.
    ///
    /// All queries are parsed before any lookup. They are then evaluated in
    /// order and the first one that does not hold short-circuits the rule.
    /// A rule without queries never matches. Only provider failures are
    /// returned as `Err`.
    pub fn verdict(&self, rule: &DynamicRule, user_id: Uuid) -> Result<Verdict> {
        if rule.queries.is_empty() {
            tracing::debug!(rule_id = ?rule.id, "rule has no queries");
            return Ok(Verdict::NotMatched);
        }

        let parsed = match rule
            .queries
            .iter()
            .map(DynamicRuleQuery::parse)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(rule_id = ?rule.id, error = %e, "malformed rule skipped");
                return Ok(Verdict::Malformed(e.to_string()));
            }
        };

        for query in &parsed {
            if !self.holds(query, user_id)? {
                return Ok(Verdict::NotMatched);
            }
        }
        Ok(Verdict::Matched)
    }

    /// Evaluate a rule for a user; malformed rules count as "no match"
    pub fn evaluate(&self, rule: &DynamicRule, user_id: Uuid) -> Result<bool> {
        Ok(self.verdict(rule, user_id)?.is_match())
    }

    fn holds(&self, query: &Query, user_id: Uuid) -> Result<bool> {
        let agg = &self.aggregates;
        match *query {
            Query::UserOf { product } => agg.uses_product_of_type(user_id, product),
            Query::ActiveUserOf { product } => agg.is_active_user_of_product(product, user_id),
            Query::TransactionSumCompare {
                product,
                transaction,
                comparison,
                constant,
            } => {
                let sum = agg.sum_transactions(product, transaction, user_id)?;
                Ok(comparison.compare(sum, constant))
            }
            Query::TransactionSumCompareDepositWithdraw { product, comparison } => {
                let deposits = agg.sum_deposits(product, user_id)?;
                let withdraws = agg.sum_withdraws(product, user_id)?;
                Ok(comparison.compare(deposits, withdraws))
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{ComparisonType, ProductType, TransactionType};
    use crate::test_support::FakeAggregates;

    fn rule_with(queries: Vec<DynamicRuleQuery>) -> DynamicRule {
        let mut rule = DynamicRule::new("p-1", "Product", "Text");
        rule.queries = queries;
        rule
    }

    fn evaluator(fake: FakeAggregates) -> (RuleEvaluator, Arc<FakeAggregates>) {
        let fake = Arc::new(fake);
        (RuleEvaluator::new(fake.clone()), fake)
    }

    #[test]
    fn test_rule_without_queries_never_matches() {
        let (eval, fake) = evaluator(FakeAggregates::new());
        let rule = rule_with(vec![]);
        assert_eq!(eval.verdict(&rule, Uuid::new_v4()).unwrap(), Verdict::NotMatched);
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn test_user_of_follows_provider() {
        let user = Uuid::new_v4();
        let rule = rule_with(vec![DynamicRuleQuery::new("USER_OF", ["DEBIT"])]);

        let (eval, _) = evaluator(FakeAggregates::new().with_usage(user, ProductType::Debit));
        assert!(eval.evaluate(&rule, user).unwrap());

        let (eval, _) = evaluator(FakeAggregates::new());
        assert!(!eval.evaluate(&rule, user).unwrap());
    }

    #[test]
    fn test_active_user_of_uses_threshold() {
        let user = Uuid::new_v4();
        let rule = rule_with(vec![DynamicRuleQuery::new("ACTIVE_USER_OF", ["SAVING"])]);

        let (eval, _) = evaluator(
            FakeAggregates::new().with_transaction_count(user, ProductType::Saving, 5),
        );
        assert!(eval.evaluate(&rule, user).unwrap());

        let (eval, _) = evaluator(
            FakeAggregates::new().with_transaction_count(user, ProductType::Saving, 4),
        );
        assert!(!eval.evaluate(&rule, user).unwrap());
    }

    #[test]
    fn test_transaction_sum_compare_scenarios() {
        let user = Uuid::new_v4();
        let rule = rule_with(vec![DynamicRuleQuery::new(
            "TRANSACTION_SUM_COMPARE",
            ["DEBIT", "DEPOSIT", "GREATER_THAN", "1000"],
        )]);

        for (sum, expected) in [(1500, true), (500, false)] {
            let (eval, _) = evaluator(FakeAggregates::new().with_sum(
                user,
                ProductType::Debit,
                TransactionType::Deposit,
                sum,
            ));
            assert_eq!(eval.evaluate(&rule, user).unwrap(), expected, "sum {}", sum);
        }
    }

    #[test]
    fn test_transaction_sum_compare_every_operator() {
        let user = Uuid::new_v4();
        let (eval, fake) = evaluator(FakeAggregates::new());

        for sum in [999, 1000, 1001] {
            fake.set_sum(user, ProductType::Credit, TransactionType::Withdraw, sum);
            for comparison in ComparisonType::ALL {
                let rule = rule_with(vec![DynamicRuleQuery::new(
                    "TRANSACTION_SUM_COMPARE",
                    ["CREDIT", "WITHDRAW", comparison.as_str(), "1000"],
                )]);
                assert_eq!(
                    eval.evaluate(&rule, user).unwrap(),
                    comparison.compare(sum, 1000),
                    "{} {} 1000",
                    sum,
                    comparison
                );
            }
        }
    }

    #[test]
    fn test_deposit_withdraw_compare() {
        let user = Uuid::new_v4();
        let rule = rule_with(vec![DynamicRuleQuery::new(
            "TRANSACTION_SUM_COMPARE_DEPOSIT_WITHDRAW",
            ["DEBIT", "GREATER_THAN"],
        )]);
        let (eval, fake) = evaluator(
            FakeAggregates::new()
                .with_sum(user, ProductType::Debit, TransactionType::Deposit, 2000)
                .with_sum(user, ProductType::Debit, TransactionType::Withdraw, 1500),
        );
        assert!(eval.evaluate(&rule, user).unwrap());

        fake.set_sum(user, ProductType::Debit, TransactionType::Withdraw, 2000);
        assert!(!eval.evaluate(&rule, user).unwrap());
    }

    #[test]
    fn test_malformed_rule_degrades_to_no_match() {
        let user = Uuid::new_v4();
        let (eval, fake) = evaluator(FakeAggregates::new().with_usage(user, ProductType::Debit));

        for bad in [
            DynamicRuleQuery::new("FOO_OF", ["DEBIT"]),
            DynamicRuleQuery::new("USER_OF", ["UNKNOWN_TYPE"]),
            DynamicRuleQuery::new("TRANSACTION_SUM_COMPARE", ["DEBIT", "DEPOSIT", ">", "x"]),
            DynamicRuleQuery::new("USER_OF", Vec::<String>::new()),
        ] {
            let rule = rule_with(vec![bad]);
            assert!(matches!(eval.verdict(&rule, user).unwrap(), Verdict::Malformed(_)));
            assert!(!eval.evaluate(&rule, user).unwrap());
        }
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn test_malformed_later_query_poisons_whole_rule() {
        let user = Uuid::new_v4();
        let (eval, fake) = evaluator(FakeAggregates::new().with_usage(user, ProductType::Debit));
        let rule = rule_with(vec![
            DynamicRuleQuery::new("USER_OF", ["DEBIT"]),
            DynamicRuleQuery::new("USER_OF", ["GOLD"]),
        ]);
        assert!(matches!(eval.verdict(&rule, user).unwrap(), Verdict::Malformed(_)));
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn test_multiple_queries_are_conjunctive() {
        let user = Uuid::new_v4();
        let (eval, fake) = evaluator(FakeAggregates::new().with_usage(user, ProductType::Debit));
        let rule = rule_with(vec![
            DynamicRuleQuery::new("USER_OF", ["DEBIT"]),
            DynamicRuleQuery::new("USER_OF", ["INVEST"]),
        ]);

        assert!(!eval.evaluate(&rule, user).unwrap());
        fake.set_usage(user, ProductType::Invest);
        assert!(eval.evaluate(&rule, user).unwrap());
    }

    #[test]
    fn test_first_failing_query_short_circuits() {
        let user = Uuid::new_v4();
        let (eval, fake) = evaluator(FakeAggregates::new());
        let rule = rule_with(vec![
            DynamicRuleQuery::new("USER_OF", ["CREDIT"]),
            DynamicRuleQuery::new("USER_OF", ["DEBIT"]),
            DynamicRuleQuery::new("ACTIVE_USER_OF", ["DEBIT"]),
        ]);
        assert!(!eval.evaluate(&rule, user).unwrap());
        assert_eq!(fake.calls(), 1);
    }

    #[test]
    fn test_provider_failure_propagates() {
        let user = Uuid::new_v4();
        let (eval, fake) = evaluator(FakeAggregates::new());
        fake.fail();
        let rule = rule_with(vec![DynamicRuleQuery::new("USER_OF", ["DEBIT"])]);
        assert!(eval.evaluate(&rule, user).is_err());
    }

    #[test]
    fn test_rule_json_shape() {
        let json = r#"{
            "product_id": "147f6a0f-3b91-413b-ab99-87f081d60d5a",
            "product_name": "Invest 500",
            "product_text": "Open an investment account",
            "rule": [ { "query": "USER_OF", "arguments": ["DEBIT"] } ]
        }"#;
        let rule: DynamicRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.id, None);
        assert_eq!(rule.queries, vec![DynamicRuleQuery::new("USER_OF", ["DEBIT"])]);

        let back = serde_json::to_value(&rule).unwrap();
        assert!(back.get("rule").is_some());
        assert!(back.get("id").is_none());
    }
}
