//! Plan cache keyed by the stripped-query hash.
//!
//! Entries are immutable; replacement is remove-then-insert. Lookup is
//! lock-free reads on the sharded map, and a compile that loses the
//! insert race adopts the winner's entry. Cached plans are shared with
//! in-flight executions, so eviction never invalidates a running query.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::query::plan::LogicalOperator;
use crate::query::symbol::SymbolTable;

pub struct CachedPlan {
    plan: LogicalOperator,
    cost: f64,
    symbol_table: SymbolTable,
    created_at: Instant,
}

impl CachedPlan {
    pub fn new(plan: LogicalOperator, cost: f64, symbol_table: SymbolTable) -> Self {
        Self {
            plan,
            cost,
            symbol_table,
            created_at: Instant::now(),
        }
    }

    pub fn plan(&self) -> &LogicalOperator {
        &self.plan
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbol_table
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

#[derive(Default)]
pub struct PlanCache {
    entries: DashMap<u64, Arc<CachedPlan>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached plan unless it has expired; an expired entry
    /// is removed and reported as a miss. Racing removals are no-ops.
    pub fn lookup(&self, hash: u64, ttl: Duration) -> Option<Arc<CachedPlan>> {
        let entry = self.entries.get(&hash)?.clone();
        if entry.is_expired(ttl) {
            drop(self.entries.remove(&hash));
            debug!(hash, "cached plan expired");
            return None;
        }
        Some(entry)
    }

    /// Insert-if-absent; a concurrent compile that loses the race gets
    /// the winner's entry back.
    pub fn insert(&self, hash: u64, plan: Arc<CachedPlan>) -> Arc<CachedPlan> {
        self.entries.entry(hash).or_insert(plan).clone()
    }

    pub fn invalidate_all(&self) {
        debug!(entries = self.entries.len(), "plan cache invalidated");
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> Arc<CachedPlan> {
        Arc::new(CachedPlan::new(
            LogicalOperator::Once,
            0.0,
            SymbolTable::new(),
        ))
    }

    #[test]
    fn lookup_returns_unexpired_entries() {
        let cache = PlanCache::new();
        cache.insert(7, entry());
        assert!(cache.lookup(7, Duration::from_secs(60)).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entries_are_removed_and_miss() {
        let cache = PlanCache::new();
        cache.insert(7, entry());
        assert!(cache.lookup(7, Duration::ZERO).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_if_absent_keeps_the_winner() {
        let cache = PlanCache::new();
        let first = cache.insert(7, entry());
        let second = cache.insert(7, entry());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidation_clears_everything() {
        let cache = PlanCache::new();
        cache.insert(1, entry());
        cache.insert(2, entry());
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
