//! Evictable, lock-free cache slot for derived node data, and the budget
//! that bounds how many nodes keep their slots filled.

use crate::node::VersionNode;
use arc_swap::ArcSwapOption;
use lineage_core::Revision;
use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Holds at most one computed value. Readers racing on an empty slot may
/// each compute and store a value; the last store wins and all stored
/// values are equal.
pub(crate) struct CacheSlot<T> {
    slot: ArcSwapOption<T>,
}

impl<T> CacheSlot<T> {
    pub(crate) fn new() -> Self {
        CacheSlot {
            slot: ArcSwapOption::empty(),
        }
    }

    pub(crate) fn get(&self) -> Option<Arc<T>> {
        self.slot.load_full()
    }

    pub(crate) fn is_filled(&self) -> bool {
        self.slot.load().is_some()
    }

    pub(crate) fn store(&self, value: Arc<T>) {
        self.slot.store(Some(value));
    }

    pub(crate) fn clear(&self) {
        self.slot.store(None);
    }
}

impl<T> fmt::Debug for CacheSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_filled() {
            write!(f, "CacheSlot(filled)")
        } else {
            write!(f, "CacheSlot(empty)")
        }
    }
}

/// Shared by every node of one graph lineage. Nodes are admitted after
/// they fill a cache; once more than `capacity` nodes are resident, the
/// least recently admitted ones lose their caches.
///
/// Only cache fills take the lock. Cache hits never touch the budget.
pub(crate) struct CacheBudget<V> {
    resident: Mutex<LruCache<Revision, Weak<VersionNode<V>>>>,
}

impl<V> CacheBudget<V> {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        CacheBudget {
            resident: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Admit a batch of freshly filled nodes.
    ///
    /// Nodes displaced while admitting the batch are evicted only if they
    /// are not resident once the whole batch is in.
    pub(crate) fn admit<'a>(&self, nodes: impl IntoIterator<Item = &'a VersionNode<V>>)
    where
        V: 'a,
    {
        let mut displaced = Vec::new();
        {
            let mut resident = self.resident.lock();
            for node in nodes {
                let revision = *node.revision();
                if let Some((popped, weak)) = resident.push(revision, node.downgrade()) {
                    if popped != revision {
                        displaced.push((popped, weak));
                    }
                }
            }
            displaced.retain(|(revision, _)| !resident.contains(revision));
        }

        for (revision, weak) in displaced {
            if let Some(node) = weak.upgrade() {
                trace!(revision = %revision, "evicting node caches");
                node.evict_caches();
            }
        }
    }

    /// Number of nodes currently counted against the budget.
    pub(crate) fn resident(&self) -> usize {
        self.resident.lock().len()
    }
}

impl<V> fmt::Debug for CacheBudget<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resident = self.resident.lock();
        f.debug_struct("CacheBudget")
            .field("resident", &resident.len())
            .field("capacity", &resident.cap())
            .finish()
    }
}
