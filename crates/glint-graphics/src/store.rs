//! Cost-bounded LRU image store.
//!
//! The [`ImageStore`] maps [`ImageKey`]s to values with an explicit cost and
//! keeps the total cost within a byte budget (default 320 MiB). When an insert
//! pushes the total over budget, the least-recently-used entries are evicted
//! and handed back to the caller, which decides what else to release. The
//! store never calls out while evicting.

use std::collections::HashMap;

use crate::types::ImageKey;

/// Default budget: 320 MiB.
pub const DEFAULT_BUDGET_BYTES: u64 = 320 * 1024 * 1024;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    cost: u64,
    /// Monotonically increasing access counter for LRU eviction.
    last_access: u64,
}

/// LRU map bounded by the summed cost of its entries.
///
/// Zero-cost entries do not count against the budget and are never evicted.
#[derive(Debug)]
pub struct ImageStore<V> {
    entries: HashMap<ImageKey, Entry<V>>,
    total_cost: u64,
    budget: u64,
    access_counter: u64,
}

impl<V> Default for ImageStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ImageStore<V> {
    /// Store with the default budget.
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_BUDGET_BYTES)
    }

    pub fn with_budget(budget: u64) -> Self {
        Self {
            entries: HashMap::new(),
            total_cost: 0,
            budget,
            access_counter: 0,
        }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace `key`, then evict until the total fits the budget.
    ///
    /// Returns the evicted entries, least recently used first. A value whose
    /// own cost exceeds the budget is not stored and comes straight back.
    pub fn insert(&mut self, key: ImageKey, value: V, cost: u64) -> Vec<(ImageKey, V)> {
        self.remove(key);

        if cost > self.budget {
            log::debug!(
                "image {key} costs {cost} bytes, over the {} byte budget",
                self.budget
            );
            return vec![(key, value)];
        }

        let mut evicted = Vec::new();
        while self.total_cost.saturating_add(cost) > self.budget {
            match self.evict_lru() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }

        self.access_counter += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                cost,
                last_access: self.access_counter,
            },
        );
        self.total_cost = self.total_cost.saturating_add(cost);
        evicted
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&mut self, key: ImageKey) -> Option<&V> {
        self.access_counter += 1;
        let counter = self.access_counter;
        let entry = self.entries.get_mut(&key)?;
        entry.last_access = counter;
        Some(&entry.value)
    }

    /// Look up `key` without touching its recency.
    pub fn peek(&self, key: ImageKey) -> Option<&V> {
        self.entries.get(&key).map(|entry| &entry.value)
    }

    pub fn contains(&self, key: ImageKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn remove(&mut self, key: ImageKey) -> Option<V> {
        let entry = self.entries.remove(&key)?;
        self.total_cost = self.total_cost.saturating_sub(entry.cost);
        Some(entry.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_cost = 0;
    }

    /// Active keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = ImageKey> + '_ {
        self.entries.keys().copied()
    }

    /// Entries without touching recency.
    pub fn iter(&self) -> impl Iterator<Item = (ImageKey, &V)> + '_ {
        self.entries.iter().map(|(key, entry)| (*key, &entry.value))
    }

    /// First protocol id in `1..u32::MAX` with no entry, or `None` when the
    /// id space is exhausted.
    pub fn allocate_identifier(&self) -> Option<u32> {
        (1..u32::MAX).find(|id| !self.entries.contains_key(&ImageKey::from(*id)))
    }

    fn evict_lru(&mut self) -> Option<(ImageKey, V)> {
        let (&key, _) = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.cost > 0)
            .min_by_key(|(_, entry)| entry.last_access)?;
        let entry = self.entries.remove(&key)?;
        self.total_cost = self.total_cost.saturating_sub(entry.cost);
        log::debug!(
            "evicted image {key} ({} bytes), total now {} bytes",
            entry.cost,
            self.total_cost
        );
        Some((key, entry.value))
    }
}
