//! The wrapper identity cache.
//!
//! Maps a native address to the single live wrapper for it. Entries only hold a [`Weak`]
//! reference, so the cache never keeps a wrapper alive, and a wrapper whose last [`Arc`] is
//! gone can't be resolved again even before its entry is removed.

use std::any::{self, Any};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError, Weak};

use crate::object::{NativeObject, ObjectError, ObjectResult, WrapperId};

pub(crate) type AnyWrapper = dyn Any + Send + Sync;

#[derive(Debug)]
struct CacheEntry {
    id: WrapperId,
    type_name: &'static str,
    wrapper: Weak<AnyWrapper>,
}

/// The outcome of [`IdentityCache::lookup_or_insert_with`].
#[derive(Debug)]
pub(crate) enum Lookup<T> {
    Found(Arc<T>),
    Created(Arc<T>),
}

impl<T> Lookup<T> {
    pub(crate) fn into_inner(self) -> Arc<T> {
        match self {
            Lookup::Found(wrapper) | Lookup::Created(wrapper) => wrapper,
        }
    }
}

/// Address → wrapper registry enforcing one wrapper per native resource.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: Mutex<HashMap<usize, CacheEntry>>,
    // Removals requested while `entries` was locked elsewhere; drained under the lock.
    pending: Mutex<Vec<(usize, WrapperId)>>,
    pending_count: AtomicUsize,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, CacheEntry>> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.drain_pending(&mut entries);
        entries
    }

    fn drain_pending(&self, entries: &mut HashMap<usize, CacheEntry>) {
        if self.pending_count.load(Ordering::Acquire) == 0 {
            return;
        }

        let pending = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *pending)
        };
        self.pending_count
            .fetch_sub(pending.len(), Ordering::AcqRel);

        for (address, id) in pending {
            remove_matching(entries, address, id);
        }
    }

    /// Returns the live wrapper for `address`, or builds one with `create` and registers it.
    ///
    /// The lookup and the insertion form one critical section, so `create` is called at most
    /// once per address no matter how many threads race. `create` runs inside that section and
    /// must not call back into the cache.
    ///
    /// A wrapper built by `create` for some other address is dropped again and
    /// [`ObjectError::AddressMismatch`] returned.
    ///
    /// # Panics
    /// Panics if the cached wrapper's handle has been disposed while it was still registered.
    /// That can only happen if the cache's own invariants are broken.
    pub fn lookup_or_create<T, F>(&self, address: usize, create: F) -> ObjectResult<Arc<T>>
    where
        T: NativeObject,
        F: FnOnce() -> ObjectResult<Arc<T>>,
    {
        self.lookup_or_insert_with(address, create)
            .map(Lookup::into_inner)
    }

    pub(crate) fn lookup_or_insert_with<T, F>(
        &self,
        address: usize,
        create: F,
    ) -> ObjectResult<Lookup<T>>
    where
        T: NativeObject,
        F: FnOnce() -> ObjectResult<Arc<T>>,
    {
        let mut entries = self.lock();

        if let Some(entry) = entries.get(&address) {
            if let Some(existing) = entry.wrapper.upgrade() {
                let wrapper = existing.downcast::<T>().map_err(|_| ObjectError::WrongType {
                    address,
                    cached: entry.type_name,
                    requested: any::type_name::<T>(),
                })?;
                if !wrapper.core().is_valid() {
                    panic!("{}", ObjectError::StaleWrapper { address });
                }
                return Ok(Lookup::Found(wrapper));
            }
        }

        let wrapper = create()?;
        let actual = wrapper.core().handle().key();
        if actual != address {
            drop(entries);
            drop(wrapper);
            return Err(ObjectError::AddressMismatch { address, actual });
        }
        let weak: Weak<T> = Arc::downgrade(&wrapper);
        entries.insert(
            address,
            CacheEntry {
                id: wrapper.core().id(),
                type_name: any::type_name::<T>(),
                wrapper: weak,
            },
        );
        log::debug!(
            "registered `{}` wrapper for {:#x}",
            any::type_name::<T>(),
            address
        );
        Ok(Lookup::Created(wrapper))
    }

    /// Returns the live wrapper registered for `address`, if any.
    pub fn lookup<T: NativeObject>(&self, address: usize) -> Option<Arc<T>> {
        let entries = self.lock();
        entries
            .get(&address)?
            .wrapper
            .upgrade()?
            .downcast::<T>()
            .ok()
    }

    /// Removes the entry for `address` if it still belongs to wrapper `id`.
    pub(crate) fn forget(&self, address: usize, id: WrapperId) {
        let mut entries = self.lock();
        remove_matching(&mut entries, address, id);
    }

    /// Like [`forget`](Self::forget), but never blocks: when the cache is locked elsewhere
    /// (possibly further up this very thread) the removal is queued instead.
    pub(crate) fn forget_deferred(&self, address: usize, id: WrapperId) {
        match self.entries.try_lock() {
            Ok(mut entries) => {
                self.drain_pending(&mut entries);
                remove_matching(&mut entries, address, id);
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                let mut entries = poisoned.into_inner();
                remove_matching(&mut entries, address, id);
            }
            Err(TryLockError::WouldBlock) => {
                self.pending
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push((address, id));
                self.pending_count.fetch_add(1, Ordering::AcqRel);
                log::trace!("deferred cache removal of {:#x}", address);
            }
        }
    }

    /// Drops whatever entry `address` has, live or not.
    ///
    /// The wrapper it pointed to keeps working but is no longer the canonical one; the next
    /// lookup builds a fresh wrapper.
    pub fn invalidate(&self, address: usize) -> bool {
        self.lock().remove(&address).is_some()
    }

    /// Whether `address` currently resolves to a live wrapper.
    pub fn contains(&self, address: usize) -> bool {
        self.lock()
            .get(&address)
            .is_some_and(|entry| entry.wrapper.strong_count() > 0)
    }

    /// The number of registered live wrappers.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|entry| entry.wrapper.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every entry, returning how many there were.
    pub(crate) fn clear(&self) -> usize {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        count
    }
}

fn remove_matching(entries: &mut HashMap<usize, CacheEntry>, address: usize, id: WrapperId) {
    if entries.get(&address).is_some_and(|entry| entry.id == id) {
        entries.remove(&address);
        log::trace!("forgot wrapper for {:#x}", address);
    }
}
