// 🔎 Rule Queries - Raw form, typed form, and the validator between them

use crate::error::{QueryError, TokenError};
use crate::taxonomy::{ComparisonType, ProductType, QueryType, TransactionType};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// RAW QUERY (as authored and stored)
// ============================================================================

/// One query of a dynamic rule, exactly as the author wrote it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRuleQuery {
    /// Operator token, e.g. `USER_OF`
    pub query: String,

    /// Positional arguments, validated against the operator's slots
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl DynamicRuleQuery {
    pub fn new<I, S>(query: &str, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DynamicRuleQuery {
            query: query.to_string(),
            arguments: arguments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse into the typed form (see [`validate`])
    pub fn parse(&self) -> Result<Query, QueryError> {
        validate(&self.query, &self.arguments)
    }
}

// ============================================================================
// TYPED QUERY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    UserOf {
        product: ProductType,
    },
    ActiveUserOf {
        product: ProductType,
    },
    TransactionSumCompare {
        product: ProductType,
        transaction: TransactionType,
        comparison: ComparisonType,
        constant: i64,
    },
    TransactionSumCompareDepositWithdraw {
        product: ProductType,
        comparison: ComparisonType,
    },
}

impl Query {
    pub fn query_type(&self) -> QueryType {
        match self {
            Query::UserOf { .. } => QueryType::UserOf,
            Query::ActiveUserOf { .. } => QueryType::ActiveUserOf,
            Query::TransactionSumCompare { .. } => QueryType::TransactionSumCompare,
            Query::TransactionSumCompareDepositWithdraw { .. } => {
                QueryType::TransactionSumCompareDepositWithdraw
            }
        }
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

fn parse_slot<T>(query_type: QueryType, arguments: &[String], slot: usize) -> Result<T, QueryError>
where
    T: FromStr<Err = TokenError>,
{
    arguments[slot].parse().map_err(|cause| reject(query_type, slot, cause))
}

/// Constants are 32-bit signed; they widen to `i64` for comparison with sums
fn parse_constant(
    query_type: QueryType,
    arguments: &[String],
    slot: usize,
) -> Result<i64, QueryError> {
    let raw = &arguments[slot];
    raw.parse::<i32>().map(i64::from).map_err(|source| {
        let cause = TokenError::InvalidNumber {
            value: raw.to_string(),
            source,
        };
        reject(query_type, slot, cause)
    })
}

fn reject(query_type: QueryType, slot: usize, cause: TokenError) -> QueryError {
    tracing::debug!(%query_type, slot, %cause, "argument rejected");
    QueryError::bad_argument(query_type, slot, cause)
}

/// Validate an operator token and its arguments.
///
/// Order: the operator must be known, then the argument count must match its
/// arity, then every argument must parse into its slot type.
pub fn validate(token: &str, arguments: &[String]) -> Result<Query, QueryError> {
    let query_type: QueryType = token.parse().map_err(|_| {
        tracing::debug!(token, "unknown query type");
        QueryError::UnknownQueryType(token.to_string())
    })?;

    if arguments.len() != query_type.arity() {
        tracing::debug!(%query_type, count = arguments.len(), "wrong argument count");
        return Err(QueryError::wrong_arity(query_type, arguments.len()));
    }

    // slots are parsed left to right, so the first bad one is reported
    let query = match query_type {
        QueryType::UserOf => Query::UserOf {
            product: parse_slot(query_type, arguments, 0)?,
        },
        QueryType::ActiveUserOf => Query::ActiveUserOf {
            product: parse_slot(query_type, arguments, 0)?,
        },
        QueryType::TransactionSumCompare => Query::TransactionSumCompare {
            product: parse_slot(query_type, arguments, 0)?,
            transaction: parse_slot(query_type, arguments, 1)?,
            comparison: parse_slot(query_type, arguments, 2)?,
            constant: parse_constant(query_type, arguments, 3)?,
        },
        QueryType::TransactionSumCompareDepositWithdraw => {
            Query::TransactionSumCompareDepositWithdraw {
                product: parse_slot(query_type, arguments, 0)?,
                comparison: parse_slot(query_type, arguments, 1)?,
            }
        }
    };

    Ok(query)
}

/// Validate every query of a candidate rule, failing on the first bad one
pub fn validate_queries(queries: &[DynamicRuleQuery]) -> Result<Vec<Query>, QueryError> {
    let parsed = queries
        .iter()
        .map(DynamicRuleQuery::parse)
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(count = parsed.len(), "all queries passed validation");
    Ok(parsed)
}

// ============================================================================
// TESTS
// ============================================================================
