// 🧠 Aggregate Cache - Memoized provider lookups, cleared in bulk
//
// No TTL and no eviction: entries live until clear(). Sized by the
// (operation × user × product type) keys seen since the last clear.

use crate::aggregates::AggregateProvider;
use crate::taxonomy::{ProductType, TransactionType};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use uuid::Uuid;

// ============================================================================
// GENERIC CACHE
// ============================================================================

struct CacheState<V> {
    entries: HashMap<String, V>,
    /// Bumped by every clear(); loads started under an older generation are dropped
    generation: u64,
}

impl<V> CacheState<V> {
    fn discard(&mut self) -> usize {
        self.generation = self.generation.wrapping_add(1);
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}

pub struct AggregateCache<V> {
    name: &'static str,
    state: RwLock<CacheState<V>>,
}

impl<V: Clone> AggregateCache<V> {
    pub fn new(name: &'static str) -> Self {
        AggregateCache {
            name,
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                generation: 0,
            }),
        }
    }

    /// Cache key for one aggregate: `{operation}_{user}_{product}`
    pub fn key(operation: &str, user_id: Uuid, product_type: ProductType) -> String {
        format!("{}_{}_{}", operation, user_id, product_type)
    }

    /// Return the memoized value for `key`, running `loader` on a miss.
    ///
    /// The loader runs without any lock held. If another caller inserted the
    /// key meanwhile, its value wins. Errors are returned and not cached.
    pub fn get_or_load<F>(&self, key: &str, loader: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        let generation = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = state.entries.get(key) {
                return Ok(value.clone());
            }
            state.generation
        };

        tracing::trace!(cache = self.name, key, "cache miss");
        let value = loader()?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.generation != generation {
            // cleared while loading
            return Ok(value);
        }
        Ok(state
            .entries
            .entry(key.to_string())
            .or_insert(value)
            .clone())
    }

    /// Drop every entry; returns how many were discarded
    pub fn clear(&self) -> usize {
        self.write().discard()
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState<V>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// CACHING PROVIDER
// ============================================================================

/// Wraps an [`AggregateProvider`] and memoizes every per-product aggregate.
///
/// Deposit and withdraw totals share the `sum_{type}` entries of
/// `sum_transactions`. User-name resolution goes straight to the inner provider.
pub struct CachedAggregates<P> {
    inner: P,
    flags: AggregateCache<bool>,
    sums: AggregateCache<i64>,
}

impl<P: AggregateProvider> CachedAggregates<P> {
    pub fn new(inner: P) -> Self {
        CachedAggregates {
            inner,
            flags: AggregateCache::new("flags"),
            sums: AggregateCache::new("sums"),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Discard all memoized aggregates across both caches as one step.
    ///
    /// Both write locks are held together, always flags before sums, so no
    /// reader sees one cache cleared and the other still stale.
    pub fn clear_caches(&self) -> usize {
        let mut flags = self.flags.write();
        let mut sums = self.sums.write();
        let dropped = flags.discard() + sums.discard();
        drop((sums, flags));
        tracing::info!(dropped, "aggregate caches cleared");
        dropped
    }

    pub fn cached_entries(&self) -> usize {
        self.flags.len() + self.sums.len()
    }
}

impl<P: AggregateProvider> AggregateProvider for CachedAggregates<P> {
    fn uses_product_of_type(&self, user_id: Uuid, product_type: ProductType) -> Result<bool> {
        let key = AggregateCache::<bool>::key("product", user_id, product_type);
        self.flags
            .get_or_load(&key, || self.inner.uses_product_of_type(user_id, product_type))
    }

    fn is_active_user_of_product(&self, product_type: ProductType, user_id: Uuid) -> Result<bool> {
        let key = AggregateCache::<bool>::key("active", user_id, product_type);
        self.flags.get_or_load(&key, || {
            self.inner.is_active_user_of_product(product_type, user_id)
        })
    }

    fn sum_transactions(
        &self,
        product_type: ProductType,
        transaction_type: TransactionType,
        user_id: Uuid,
    ) -> Result<i64> {
        let operation = format!("sum_{}", transaction_type);
        let key = AggregateCache::<i64>::key(&operation, user_id, product_type);
        self.sums.get_or_load(&key, || {
            self.inner
                .sum_transactions(product_type, transaction_type, user_id)
        })
    }

    fn resolve_user_id(&self, user_name: &str) -> Result<Option<Uuid>> {
        self.inner.resolve_user_id(user_name)
    }
}

// ============================================================================
// TESTS
// ============================================================================
