// 📊 Aggregate Data Provider - Per-user transaction summaries
// Implemented by the SQLite store (db.rs) and wrapped by the cache (cache.rs)

use crate::taxonomy::{ProductType, TransactionType};
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

/// Number of transactions on a product that makes a user "active" on it
pub const ACTIVE_USER_THRESHOLD: i64 = 5;

/// Read-only aggregates over a user's transactions.
///
/// All methods may block on I/O.
pub trait AggregateProvider: Send + Sync {
    /// Has the user ever transacted on a product of this type?
    fn uses_product_of_type(&self, user_id: Uuid, product_type: ProductType) -> Result<bool>;

    /// Has the user made at least [`ACTIVE_USER_THRESHOLD`] transactions on this type?
    fn is_active_user_of_product(&self, product_type: ProductType, user_id: Uuid) -> Result<bool>;

    /// Sum of amounts of one transaction type on one product type
    fn sum_transactions(
        &self,
        product_type: ProductType,
        transaction_type: TransactionType,
        user_id: Uuid,
    ) -> Result<i64>;

    fn sum_deposits(&self, product_type: ProductType, user_id: Uuid) -> Result<i64> {
        self.sum_transactions(product_type, TransactionType::Deposit, user_id)
    }

    fn sum_withdraws(&self, product_type: ProductType, user_id: Uuid) -> Result<i64> {
        self.sum_transactions(product_type, TransactionType::Withdraw, user_id)
    }

    /// Look up a user id by login name; `None` when no such user exists
    fn resolve_user_id(&self, user_name: &str) -> Result<Option<Uuid>>;
}

impl<T: AggregateProvider + ?Sized> AggregateProvider for Arc<T> {
    fn uses_product_of_type(&self, user_id: Uuid, product_type: ProductType) -> Result<bool> {
        (**self).uses_product_of_type(user_id, product_type)
    }

    fn is_active_user_of_product(&self, product_type: ProductType, user_id: Uuid) -> Result<bool> {
        (**self).is_active_user_of_product(product_type, user_id)
    }

    fn sum_transactions(
        &self,
        product_type: ProductType,
        transaction_type: TransactionType,
        user_id: Uuid,
    ) -> Result<i64> {
        (**self).sum_transactions(product_type, transaction_type, user_id)
    }

    fn sum_deposits(&self, product_type: ProductType, user_id: Uuid) -> Result<i64> {
        (**self).sum_deposits(product_type, user_id)
    }

    fn sum_withdraws(&self, product_type: ProductType, user_id: Uuid) -> Result<i64> {
        (**self).sum_withdraws(product_type, user_id)
    }

    fn resolve_user_id(&self, user_name: &str) -> Result<Option<Uuid>> {
        (**self).resolve_user_id(user_name)
    }
}
