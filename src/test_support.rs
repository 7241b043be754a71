// Shared fixtures for unit tests

use crate::aggregates::{AggregateProvider, ACTIVE_USER_THRESHOLD};
use crate::taxonomy::{ProductType, TransactionType};
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct FakeData {
    usage: HashSet<(Uuid, ProductType)>,
    counts: HashMap<(Uuid, ProductType), i64>,
    sums: HashMap<(Uuid, ProductType, TransactionType), i64>,
    users: HashMap<String, Uuid>,
}

/// In-memory provider that counts every aggregate lookup
#[derive(Default)]
pub struct FakeAggregates {
    data: Mutex<FakeData>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_usage(self, user: Uuid, product: ProductType) -> Self {
        self.set_usage(user, product);
        self
    }

    pub fn with_transaction_count(self, user: Uuid, product: ProductType, count: i64) -> Self {
        self.data.lock().unwrap().counts.insert((user, product), count);
        self
    }

    pub fn with_sum(
        self,
        user: Uuid,
        product: ProductType,
        transaction: TransactionType,
        amount: i64,
    ) -> Self {
        self.set_sum(user, product, transaction, amount);
        self
    }

    pub fn with_user(self, name: &str, user: Uuid) -> Self {
        self.data.lock().unwrap().users.insert(name.to_string(), user);
        self
    }

    pub fn set_usage(&self, user: Uuid, product: ProductType) {
        self.data.lock().unwrap().usage.insert((user, product));
    }

    pub fn set_sum(
        &self,
        user: Uuid,
        product: ProductType,
        transaction: TransactionType,
        amount: i64,
    ) {
        self.data
            .lock()
            .unwrap()
            .sums
            .insert((user, product, transaction), amount);
    }

    /// Make every aggregate lookup fail, as a broken database would
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("aggregate store unreachable");
        }
        Ok(())
    }
}

impl AggregateProvider for FakeAggregates {
    fn uses_product_of_type(&self, user_id: Uuid, product_type: ProductType) -> Result<bool> {
        self.record()?;
        Ok(self.data.lock().unwrap().usage.contains(&(user_id, product_type)))
    }

    fn is_active_user_of_product(&self, product_type: ProductType, user_id: Uuid) -> Result<bool> {
        self.record()?;
        let data = self.data.lock().unwrap();
        let count = data.counts.get(&(user_id, product_type)).copied().unwrap_or(0);
        Ok(count >= ACTIVE_USER_THRESHOLD)
    }

    fn sum_transactions(
        &self,
        product_type: ProductType,
        transaction_type: TransactionType,
        user_id: Uuid,
    ) -> Result<i64> {
        self.record()?;
        let data = self.data.lock().unwrap();
        Ok(data
            .sums
            .get(&(user_id, product_type, transaction_type))
            .copied()
            .unwrap_or(0))
    }

    fn resolve_user_id(&self, user_name: &str) -> Result<Option<Uuid>> {
        Ok(self.data.lock().unwrap().users.get(user_name).copied())
    }
}
