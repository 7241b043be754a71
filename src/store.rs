// 🗄️ Rule Storage - Collaborator interfaces plus in-memory implementations
// The SQLite implementations live in db.rs

use crate::rules::DynamicRule;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};

// ============================================================================
// INTERFACES
// ============================================================================

pub trait RuleStore: Send + Sync {
    /// All rules, in id order
    fn find_all(&self) -> Result<Vec<DynamicRule>>;

    fn exists(&self, id: i64) -> Result<bool>;

    /// Persist a new rule (with all its queries) and return it with its id
    fn save(&self, rule: DynamicRule) -> Result<DynamicRule>;

    fn delete_by_id(&self, id: i64) -> Result<()>;
}

/// Match counter of one dynamic rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStat {
    pub rule_id: i64,
    pub count: u64,
}

pub trait RuleStatsStore: Send + Sync {
    fn init_count(&self, rule_id: i64) -> Result<()>;

    /// Must not lose updates under concurrent increments of the same id.
    /// Fails for a rule whose counter was deleted.
    fn increment_match_count(&self, rule_id: i64) -> Result<()>;

    fn delete_count(&self, rule_id: i64) -> Result<()>;

    fn all_counts(&self) -> Result<Vec<RuleStat>>;
}

// ============================================================================
// IN-MEMORY RULE STORE
// ============================================================================

pub struct InMemoryRuleStore {
    rules: RwLock<BTreeMap<i64, DynamicRule>>,
    next_id: AtomicI64,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        InMemoryRuleStore {
            rules: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore for InMemoryRuleStore {
    fn find_all(&self) -> Result<Vec<DynamicRule>> {
        let rules = self.rules.read().map_err(|_| anyhow!("rule store lock poisoned"))?;
        Ok(rules.values().cloned().collect())
    }

    fn exists(&self, id: i64) -> Result<bool> {
        let rules = self.rules.read().map_err(|_| anyhow!("rule store lock poisoned"))?;
        Ok(rules.contains_key(&id))
    }

    fn save(&self, mut rule: DynamicRule) -> Result<DynamicRule> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        rule.id = Some(id);
        let mut rules = self.rules.write().map_err(|_| anyhow!("rule store lock poisoned"))?;
        rules.insert(id, rule.clone());
        Ok(rule)
    }

    fn delete_by_id(&self, id: i64) -> Result<()> {
        let mut rules = self.rules.write().map_err(|_| anyhow!("rule store lock poisoned"))?;
        rules.remove(&id);
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY RULE STATS
// ============================================================================

#[derive(Default)]
pub struct InMemoryRuleStats {
    counts: Mutex<HashMap<i64, u64>>,
}

impl InMemoryRuleStats {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleStatsStore for InMemoryRuleStats {
    fn init_count(&self, rule_id: i64) -> Result<()> {
        let mut counts = self.counts.lock().map_err(|_| anyhow!("rule stats lock poisoned"))?;
        counts.insert(rule_id, 0);
        Ok(())
    }

    fn increment_match_count(&self, rule_id: i64) -> Result<()> {
        let mut counts = self.counts.lock().map_err(|_| anyhow!("rule stats lock poisoned"))?;
        // a deleted rule's counter is never recreated
        match counts.get_mut(&rule_id) {
            Some(count) => {
                *count += 1;
                Ok(())
            }
            None => Err(anyhow!("no match counter for rule {}", rule_id)),
        }
    }

    fn delete_count(&self, rule_id: i64) -> Result<()> {
        let mut counts = self.counts.lock().map_err(|_| anyhow!("rule stats lock poisoned"))?;
        counts.remove(&rule_id);
        Ok(())
    }

    fn all_counts(&self) -> Result<Vec<RuleStat>> {
        let counts = self.counts.lock().map_err(|_| anyhow!("rule stats lock poisoned"))?;
        let mut stats: Vec<RuleStat> = counts
            .iter()
            .map(|(&rule_id, &count)| RuleStat { rule_id, count })
            .collect();
        stats.sort_by_key(|s| s.rule_id);
        Ok(stats)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::DynamicRuleQuery;
    use std::sync::Arc;

    #[test]
    fn test_rule_store_assigns_ids_in_order() {
        let store = InMemoryRuleStore::new();
        let a = store.save(DynamicRule::new("a", "A", "first")).unwrap();
        let b = store
            .save(
                DynamicRule::new("b", "B", "second")
                    .with_query(DynamicRuleQuery::new("USER_OF", ["DEBIT"])),
            )
            .unwrap();

        assert_eq!(a.id, Some(1));
        assert_eq!(b.id, Some(2));
        let all = store.find_all().unwrap();
        assert_eq!(all.iter().map(|r| r.product_id.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(all[1].queries.len(), 1);

        store.delete_by_id(1).unwrap();
        assert!(!store.exists(1).unwrap());
        assert!(store.exists(2).unwrap());
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let stats = Arc::new(InMemoryRuleStats::new());
        stats.init_count(1).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.increment_match_count(1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.all_counts().unwrap(), vec![RuleStat { rule_id: 1, count: 800 }]);
        stats.delete_count(1).unwrap();
        assert!(stats.all_counts().unwrap().is_empty());
    }

    #[test]
    fn test_increment_after_delete_leaves_no_orphan() {
        let stats = InMemoryRuleStats::new();
        stats.init_count(1).unwrap();
        stats.delete_count(1).unwrap();

        assert!(stats.increment_match_count(1).is_err());
        assert!(stats.all_counts().unwrap().is_empty());
    }
}
