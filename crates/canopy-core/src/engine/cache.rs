use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::model::NodeId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Memoized `node -> benefactor` mapping.
///
/// Entries never expire and are never removed. A hierarchy mutation
/// overwrites the entries it affects; everything else stays valid.
#[derive(Debug, Default)]
pub struct BenefactorCache {
    entries: DashMap<NodeId, NodeId>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BenefactorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: NodeId) -> Option<NodeId> {
        let found = self.entries.get(&node).map(|entry| *entry.value());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Unconditional overwrite. Reserved for writers holding the node locks.
    pub fn set(&self, node: NodeId, benefactor: NodeId) {
        self.entries.insert(node, benefactor);
    }

    /// Memoizes a lock-free lookup. An entry already written by a mutation
    /// always wins over a concurrently computed read result.
    pub fn set_if_absent(&self, node: NodeId, benefactor: NodeId) {
        self.entries.entry(node).or_insert(benefactor);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
