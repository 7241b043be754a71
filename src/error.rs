// ⚠️ Error Types - Classified failures
// Authoring errors are user-facing; evaluation errors never leave the evaluator

use crate::taxonomy::QueryType;
use std::num::ParseIntError;
use thiserror::Error;

// ============================================================================
// TOKEN ERRORS
// ============================================================================

/// A single query argument could not be parsed into its slot type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("unknown product type: {0}")]
    UnknownProductType(String),

    #[error("unknown transaction type: {0}")]
    UnknownTransactionType(String),

    #[error("unknown comparison type: {0}")]
    UnknownComparisonType(String),

    #[error("unknown query type: {0}")]
    UnknownQueryType(String),

    #[error("not a number: {value}")]
    InvalidNumber {
        value: String,
        #[source]
        source: ParseIntError,
    },
}

// ============================================================================
// QUERY ERRORS
// ============================================================================

/// Validation failure for one dynamic rule query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown query type: {0}")]
    UnknownQueryType(String),

    #[error("illegal arguments for {query_type}: {reason}")]
    IllegalArguments {
        query_type: QueryType,
        reason: String,
        #[source]
        source: Option<TokenError>,
    },
}

impl QueryError {
    pub(crate) fn wrong_arity(query_type: QueryType, got: usize) -> Self {
        QueryError::IllegalArguments {
            query_type,
            reason: format!("expected {} argument(s), got {}", query_type.arity(), got),
            source: None,
        }
    }

    pub(crate) fn bad_argument(query_type: QueryType, slot: usize, cause: TokenError) -> Self {
        QueryError::IllegalArguments {
            query_type,
            reason: format!("argument {}: {}", slot, cause),
            source: Some(cause),
        }
    }
}

// ============================================================================
// SERVICE ERRORS
// ============================================================================

/// Coarse classification used by transports to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Unavailable,
    Unexpected,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("rule not found (ID: {0})")]
    RuleNotFound(i64),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("invalid rule query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected error: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::RuleNotFound(_) | ServiceError::UserNotFound(_) => ErrorKind::NotFound,
            ServiceError::InvalidQuery(_) => ErrorKind::BadRequest,
            ServiceError::Unavailable(_) => ErrorKind::Unavailable,
            ServiceError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
