//! The reference manager.
//!
//! Records keep-alive edges `holder -> target`: "target must not be released while holder is
//! alive". Edges live outside the native reference counts. They are used when a wrapper
//! exposes memory owned by another wrapper (a view into a parent), and to keep a signal
//! closure alive for as long as the object it is connected on.
//!
//! Edges are dropped when their holder wrapper is finalized; a target with several holders
//! survives until the last one is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::AnyWrapper;
use crate::object::WrapperId;

#[derive(Default)]
struct Edges {
    by_holder: HashMap<WrapperId, Vec<Arc<AnyWrapper>>>,
    holders: HashMap<usize, usize>,
}

impl Edges {
    fn unlink(&mut self, key: usize) {
        if let Some(count) = self.holders.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.holders.remove(&key);
            }
        }
    }
}

/// The keep-alive graph.
#[derive(Default)]
pub struct ReferenceManager {
    edges: Mutex<Edges>,
}

/// Identity of a keep-alive target.
#[inline]
pub(crate) fn target_key(target: &Arc<AnyWrapper>) -> usize {
    Arc::as_ptr(target) as *const () as usize
}

impl ReferenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Edges> {
        self.edges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records that `target` must survive at least as long as `holder`.
    ///
    /// Adding an edge that already exists does nothing and returns `false`.
    pub(crate) fn add(&self, holder: WrapperId, target: Arc<AnyWrapper>) -> bool {
        let key = target_key(&target);
        let mut edges = self.lock();
        let targets = edges.by_holder.entry(holder).or_default();
        if targets.iter().any(|t| target_key(t) == key) {
            return false;
        }
        targets.push(target);
        *edges.holders.entry(key).or_insert(0) += 1;
        log::trace!("keep-alive {:?} -> {:#x}", holder, key);
        true
    }

    /// Removes one edge. The target is dropped after the graph is unlocked.
    pub(crate) fn remove(&self, holder: WrapperId, key: usize) -> bool {
        let removed = {
            let mut edges = self.lock();
            let Some(targets) = edges.by_holder.get_mut(&holder) else {
                return false;
            };
            let Some(index) = targets.iter().position(|t| target_key(t) == key) else {
                return false;
            };
            let removed = targets.swap_remove(index);
            if targets.is_empty() {
                edges.by_holder.remove(&holder);
            }
            edges.unlink(key);
            removed
        };
        drop(removed);
        true
    }

    /// Drops every edge held by `holder`, returning how many there were.
    pub(crate) fn release_holder(&self, holder: WrapperId) -> usize {
        let released = {
            let mut edges = self.lock();
            let Some(targets) = edges.by_holder.remove(&holder) else {
                return 0;
            };
            for target in &targets {
                edges.unlink(target_key(target));
            }
            targets
        };
        let count = released.len();
        log::trace!("released {} keep-alive edge(s) of {:?}", count, holder);
        // Targets may be finalized here, which re-enters the graph.
        drop(released);
        count
    }

    /// The number of holders currently keeping the target identified by `key` alive.
    pub(crate) fn holder_count(&self, key: usize) -> usize {
        self.lock().holders.get(&key).copied().unwrap_or(0)
    }

    /// The total number of edges.
    pub fn edge_count(&self) -> usize {
        self.lock().by_holder.values().map(Vec::len).sum()
    }
}
