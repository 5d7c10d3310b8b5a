//! Snapshot Store - keeps the previous and current generation of token snapshots

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::TokenSnapshot;

/// Same token observed in two consecutive cycles
#[derive(Debug, Clone, PartialEq)]
pub struct ComparablePair {
    pub previous: TokenSnapshot,
    pub current: TokenSnapshot,
}

#[derive(Debug, Default)]
struct Generations {
    previous: HashMap<String, TokenSnapshot>,
    current: HashMap<String, TokenSnapshot>,
}

/// Two-generation snapshot store, all access under one mutex
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: Mutex<Generations>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `current` into `previous` (full replace) and clear `current`
    pub fn begin_cycle(&self) {
        let mut gens = self.inner.lock();
        gens.previous = std::mem::take(&mut gens.current);
        debug!(target: "SNAPSHOTS", "Generation swapped, {} tokens in previous", gens.previous.len());
    }

    /// Insert or overwrite `snapshot` in the current generation.
    /// Returns false when the snapshot is rejected as invalid.
    pub fn record(&self, snapshot: TokenSnapshot) -> bool {
        if !snapshot.is_valid() {
            warn!(
                target: "SNAPSHOTS",
                "Rejected invalid snapshot for '{}' (price={}, mcap={})",
                snapshot.contract_address,
                snapshot.price,
                snapshot.market_cap
            );
            return false;
        }

        self.inner
            .lock()
            .current
            .insert(snapshot.contract_address.clone(), snapshot);
        true
    }

    /// Pairs for every identity present in both generations, ordered by identity
    pub fn comparable_pairs(&self) -> Vec<ComparablePair> {
        let gens = self.inner.lock();
        let mut pairs: Vec<ComparablePair> = gens
            .current
            .iter()
            .filter_map(|(id, current)| {
                gens.previous.get(id).map(|previous| ComparablePair {
                    previous: previous.clone(),
                    current: current.clone(),
                })
            })
            .collect();
        pairs.sort_by(|a, b| a.current.contract_address.cmp(&b.current.contract_address));
        pairs
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.lock().current.len()
    }

    pub fn previous_count(&self) -> usize {
        self.inner.lock().previous.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::snapshot;

    #[test]
    fn single_generation_tokens_are_not_comparable() {
        let store = SnapshotStore::new();
        store.record(snapshot("A", 1.0));
        store.record(snapshot("B", 1.0));

        store.begin_cycle();
        store.record(snapshot("B", 1.1));
        store.record(snapshot("C", 1.0));

        let pairs = store.comparable_pairs();
        let ids: Vec<_> = pairs.iter().map(|p| p.current.contract_address.as_str()).collect();
        assert_eq!(ids, vec!["B"]);
        assert_eq!(pairs[0].previous.price, 1.0);
        assert_eq!(pairs[0].current.price, 1.1);
        assert_eq!(pairs[0].previous.contract_address, pairs[0].current.contract_address);
    }

    #[test]
    fn begin_cycle_replaces_previous_instead_of_merging() {
        let store = SnapshotStore::new();
        store.record(snapshot("A", 1.0));
        store.begin_cycle();
        store.record(snapshot("B", 1.0));
        store.begin_cycle();

        // A was only in the older generation and must be gone now
        assert_eq!(store.previous_count(), 1);
        assert_eq!(store.tracked_count(), 0);
        store.record(snapshot("A", 2.0));
        assert!(store.comparable_pairs().is_empty());
    }

    #[test]
    fn record_overwrites_within_a_generation() {
        let store = SnapshotStore::new();
        store.record(snapshot("A", 1.0));
        store.begin_cycle();
        store.record(snapshot("A", 2.0));
        store.record(snapshot("A", 3.0));
        assert_eq!(store.tracked_count(), 1);
        assert_eq!(store.comparable_pairs()[0].current.price, 3.0);
    }

    #[test]
    fn invalid_snapshots_are_rejected() {
        let store = SnapshotStore::new();
        assert!(!store.record(snapshot("A", -0.5)));
        assert!(!store.record(snapshot("", 1.0)));
        assert_eq!(store.tracked_count(), 0);
    }
}
