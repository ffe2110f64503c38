//! Per-destination load strategy memory

use dashmap::DashMap;
use ferry_core::PageInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Append the page through the native bulk path
    Bulk,
    /// Stage, upsert and reconcile deletes
    Merge,
}

impl LoadStrategy {
    /// Partitioned pages overlap rows already loaded and must merge
    pub fn initial_for(page: &PageInfo) -> Self {
        if page.partitioned {
            LoadStrategy::Merge
        } else {
            LoadStrategy::Bulk
        }
    }
}

/// Strategy chosen for each destination table during one run.
///
/// Downgrades are one-way: once a table has fallen back to merge it stays
/// there until the run ends.
#[derive(Debug, Default)]
pub struct LoadStrategies {
    by_table: DashMap<String, LoadStrategy>,
}

impl LoadStrategies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategy for `key`, recording `initial` the first time it is seen
    pub fn resolve(&self, key: &str, initial: LoadStrategy) -> LoadStrategy {
        *self.by_table.entry(key.to_string()).or_insert(initial)
    }

    /// Move `key` from bulk to merge; true when the strategy changed
    pub fn downgrade(&self, key: &str) -> bool {
        let mut entry = self.by_table.entry(key.to_string()).or_insert(LoadStrategy::Bulk);
        if *entry == LoadStrategy::Bulk {
            *entry = LoadStrategy::Merge;
            tracing::info!(table = %key, "bulk load failed, switching to merge");
            true
        } else {
            false
        }
    }

    pub fn get(&self, key: &str) -> Option<LoadStrategy> {
        self.by_table.get(key).map(|entry| *entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_strategy_follows_partitioning() {
        let page = PageInfo::for_fetch(0, 10, 10);
        assert_eq!(LoadStrategy::initial_for(&page), LoadStrategy::Bulk);
        assert_eq!(
            LoadStrategy::initial_for(&page.with_partitioned(true)),
            LoadStrategy::Merge
        );
    }

    #[test]
    fn test_first_resolution_sticks() {
        let strategies = LoadStrategies::new();
        assert_eq!(strategies.resolve("dw:sales.orders", LoadStrategy::Bulk), LoadStrategy::Bulk);
        assert_eq!(strategies.resolve("dw:sales.orders", LoadStrategy::Merge), LoadStrategy::Bulk);
        assert_eq!(strategies.get("dw:sales.items"), None);
    }

    #[test]
    fn test_downgrade_is_one_way() {
        let strategies = LoadStrategies::new();
        strategies.resolve("dw:sales.orders", LoadStrategy::Bulk);

        assert!(strategies.downgrade("dw:sales.orders"));
        assert!(!strategies.downgrade("dw:sales.orders"));
        assert_eq!(
            strategies.resolve("dw:sales.orders", LoadStrategy::Bulk),
            LoadStrategy::Merge
        );
    }
}
