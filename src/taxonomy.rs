// 🗂️ Query Taxonomy - Closed enumerations for rule authoring
// Every token a dynamic rule can contain parses into one of these types

use crate::error::TokenError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PRODUCT TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductType {
    Debit,
    Credit,
    Saving,
    Invest,
}

impl ProductType {
    pub const ALL: [ProductType; 4] = [
        ProductType::Debit,
        ProductType::Credit,
        ProductType::Saving,
        ProductType::Invest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Debit => "DEBIT",
            ProductType::Credit => "CREDIT",
            ProductType::Saving => "SAVING",
            ProductType::Invest => "INVEST",
        }
    }
}

impl FromStr for ProductType {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductType::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| TokenError::UnknownProductType(s.to_string()))
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Withdraw,
    Deposit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Withdraw => "WITHDRAW",
            TransactionType::Deposit => "DEPOSIT",
        }
    }
}

impl FromStr for TransactionType {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WITHDRAW" => Ok(TransactionType::Withdraw),
            "DEPOSIT" => Ok(TransactionType::Deposit),
            other => Err(TokenError::UnknownTransactionType(other.to_string())),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// COMPARISON TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonType {
    GreaterThan,
    LessThan,
    Equals,
    GreaterOrEquals,
    LessOrEquals,
}

impl ComparisonType {
    pub const ALL: [ComparisonType; 5] = [
        ComparisonType::GreaterThan,
        ComparisonType::LessThan,
        ComparisonType::Equals,
        ComparisonType::GreaterOrEquals,
        ComparisonType::LessOrEquals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonType::GreaterThan => "GREATER_THAN",
            ComparisonType::LessThan => "LESS_THAN",
            ComparisonType::Equals => "EQUALS",
            ComparisonType::GreaterOrEquals => "GREATER_OR_EQUALS",
            ComparisonType::LessOrEquals => "LESS_OR_EQUALS",
        }
    }

    /// Operator spelling used by rule authors who write `>` instead of the name
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonType::GreaterThan => ">",
            ComparisonType::LessThan => "<",
            ComparisonType::Equals => "=",
            ComparisonType::GreaterOrEquals => ">=",
            ComparisonType::LessOrEquals => "<=",
        }
    }

    /// Apply the comparison as `left <op> right`
    pub fn compare(&self, left: i64, right: i64) -> bool {
        match self {
            ComparisonType::GreaterThan => left > right,
            ComparisonType::LessThan => left < right,
            ComparisonType::Equals => left == right,
            ComparisonType::GreaterOrEquals => left >= right,
            ComparisonType::LessOrEquals => left <= right,
        }
    }
}

impl FromStr for ComparisonType {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComparisonType::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.symbol() == s)
            .ok_or_else(|| TokenError::UnknownComparisonType(s.to_string()))
    }
}

impl fmt::Display for ComparisonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// QUERY TYPE
// ============================================================================

/// Semantic type of one positional query argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    Product,
    Transaction,
    Comparison,
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    UserOf,
    ActiveUserOf,
    TransactionSumCompare,
    TransactionSumCompareDepositWithdraw,
}

impl QueryType {
    pub const ALL: [QueryType; 4] = [
        QueryType::UserOf,
        QueryType::ActiveUserOf,
        QueryType::TransactionSumCompare,
        QueryType::TransactionSumCompareDepositWithdraw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::UserOf => "USER_OF",
            QueryType::ActiveUserOf => "ACTIVE_USER_OF",
            QueryType::TransactionSumCompare => "TRANSACTION_SUM_COMPARE",
            QueryType::TransactionSumCompareDepositWithdraw => {
                "TRANSACTION_SUM_COMPARE_DEPOSIT_WITHDRAW"
            }
        }
    }

    /// Declared argument slots, in positional order
    pub fn slots(&self) -> &'static [ArgumentKind] {
        use ArgumentKind::*;
        match self {
            QueryType::UserOf | QueryType::ActiveUserOf => &[Product],
            QueryType::TransactionSumCompare => &[Product, Transaction, Comparison, Integer],
            QueryType::TransactionSumCompareDepositWithdraw => &[Product, Comparison],
        }
    }

    pub fn arity(&self) -> usize {
        self.slots().len()
    }

    pub fn is_valid_query(token: &str) -> bool {
        token.parse::<QueryType>().is_ok()
    }
}

impl FromStr for QueryType {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueryType::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| TokenError::UnknownQueryType(s.to_string()))
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================
