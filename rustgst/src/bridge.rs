//! The bridge registry.
//!
//! A [`Bridge`] ties the identity cache, the keep-alive graph and the signal bridge to one
//! native function table. Create it once at startup and call [`Bridge::shutdown`] at
//! teardown; there is no process-wide instance.

use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::api::API;
use crate::cache::{IdentityCache, Lookup};
use crate::handle::{HandleError, ResourceKind};
use crate::keepalive::ReferenceManager;
use crate::object::{NativeObject, ObjectCore, ObjectError, ObjectResult};
use crate::ownership::Ownership;


bitflags! {
    /// Options for creating a bridge
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BridgeFlags: u32 {
        const NONE = 0;
        /// Connecting the same listener twice for one signal on one object fails with
        /// [`SignalError::DuplicateConnection`](crate::signal::SignalError::DuplicateConnection)
        /// instead of registering a second closure.
        const STRICT_CONNECTIONS = 1;
        /// A panicking listener is logged and the panic swallowed. Without this flag the
        /// process aborts, since a panic must never unwind into native code.
        const CATCH_LISTENER_PANICS = 1 << 1;
    }
}

pub(crate) struct BridgeInner {
    pub(crate) api: API,
    pub(crate) flags: BridgeFlags,
    pub(crate) cache: IdentityCache,
    pub(crate) refs: ReferenceManager,
    pub(crate) log_handler_installed: AtomicBool,
    shut_down: AtomicBool,
}

impl BridgeInner {
    #[inline]
    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

/// A handle to the bridge registry. Cloning is cheap.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("api_version", &self.inner.api.version())
            .field("flags", &self.inner.flags)
            .field("cached_wrappers", &self.inner.cache.len())
            .field("keep_alive_edges", &self.inner.refs.edge_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Bridge {
    /// Creates a bridge on top of `api`.
    pub fn new(api: API, flags: BridgeFlags) -> Self {
        log::debug!("creating bridge (ABI {:#x}, {:?})", api.version(), flags);
        Self {
            inner: Arc::new(BridgeInner {
                api,
                flags,
                cache: IdentityCache::new(),
                refs: ReferenceManager::new(),
                log_handler_installed: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a bridge on top of the linked native library.
    ///
    /// Returns `None` if the library doesn't provide a compatible function table.
    #[cfg(feature = "native-functions")]
    pub fn from_linked(flags: BridgeFlags) -> Option<Self> {
        API::get().map(|api| Self::new(api, flags))
    }

    #[inline]
    pub(crate) fn from_inner(inner: Arc<BridgeInner>) -> Self {
        Self { inner }
    }

    #[inline]
    pub(crate) fn inner(&self) -> &Arc<BridgeInner> {
        &self.inner
    }

    #[inline]
    pub fn api(&self) -> API {
        self.inner.api
    }

    #[inline]
    pub fn flags(&self) -> BridgeFlags {
        self.inner.flags
    }

    #[inline]
    pub fn cache(&self) -> &IdentityCache {
        &self.inner.cache
    }

    #[inline]
    pub fn references(&self) -> &ReferenceManager {
        &self.inner.refs
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }

    /// Returns the wrapper for `ptr`, building it with `factory` if there is none yet.
    ///
    /// `ownership` is only honoured when a new wrapper gets built: an existing wrapper keeps the
    /// ownership it was created with, and no reference is taken for it. A reference handed over
    /// with [`Ownership::transfer_full`] is released again in that case.
    ///
    /// `factory` runs inside the identity cache's critical section. It must not call back into
    /// the bridge.
    pub fn object_for<T, F>(
        &self,
        ptr: *mut c_void,
        kind: ResourceKind,
        ownership: Ownership,
        factory: F,
    ) -> ObjectResult<Arc<T>>
    where
        T: NativeObject,
        F: FnOnce(ObjectCore) -> T,
    {
        if ptr.is_null() {
            return Err(HandleError::NullPointer.into());
        }
        ownership.validate(kind)?;
        if self.is_shut_down() {
            return Err(ObjectError::ShutDown);
        }

        let inner = &self.inner;
        let lookup = inner.cache.lookup_or_insert_with(ptr as usize, || {
            let handle = ownership.acquire(inner.api, ptr, kind)?;
            Ok(Arc::new(factory(ObjectCore::new(Arc::clone(inner), handle))))
        });

        match lookup {
            Ok(Lookup::Created(wrapper)) => Ok(wrapper),
            Ok(Lookup::Found(wrapper)) => {
                ownership.discard(inner.api, ptr, kind);
                Ok(wrapper)
            }
            Err(err @ ObjectError::WrongType { .. }) => {
                ownership.discard(inner.api, ptr, kind);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Returns the live wrapper for `ptr`, if there is one.
    pub fn lookup<T: NativeObject>(&self, ptr: *mut c_void) -> Option<Arc<T>> {
        self.inner.cache.lookup(ptr as usize)
    }

    /// Builds a borrowed wrapper for memory owned by `parent`, and keeps `parent` alive for as
    /// long as the view is.
    pub fn object_for_view<T, P, F>(
        &self,
        ptr: *mut c_void,
        kind: ResourceKind,
        parent: &Arc<P>,
        factory: F,
    ) -> ObjectResult<Arc<T>>
    where
        T: NativeObject,
        P: NativeObject,
        F: FnOnce(ObjectCore) -> T,
    {
        if !parent.is_valid() {
            return Err(HandleError::InvalidHandle.into());
        }
        let view = self.object_for(ptr, kind, Ownership::borrowed(), factory)?;
        self.add_keep_alive(&*view, Arc::clone(parent));
        Ok(view)
    }

    /// Keeps `target` alive for at least as long as `holder`.
    ///
    /// Returns `false` if the edge already existed, points from a wrapper to itself, `holder`
    /// has already been disposed, or the bridge has been shut down.
    pub fn add_keep_alive<H, T>(&self, holder: &H, target: Arc<T>) -> bool
    where
        H: NativeObject,
        T: Any + Send + Sync,
    {
        if self.is_shut_down() {
            log::warn!("keep-alive edge requested after shutdown, ignoring");
            return false;
        }
        if Arc::as_ptr(&target) as *const () == holder as *const H as *const () {
            log::warn!("ignoring keep-alive edge from {:?} to itself", holder.id());
            return false;
        }
        holder.core().hold(target)
    }

    /// Removes the edge `holder -> target`. Returns whether it existed.
    pub fn remove_keep_alive<H, T>(&self, holder: &H, target: &Arc<T>) -> bool
    where
        H: NativeObject,
        T: Any + Send + Sync,
    {
        holder
            .core()
            .bridge_inner()
            .refs
            .remove(holder.id(), arc_key(target))
    }

    /// The number of wrappers currently keeping `target` alive.
    pub fn holder_count<T: Any + Send + Sync>(&self, target: &Arc<T>) -> usize {
        self.inner.refs.holder_count(arc_key(target))
    }

    /// The number of live wrappers registered in the identity cache.
    pub fn cached_wrappers(&self) -> usize {
        self.inner.cache.len()
    }

    /// Tears the registry down.
    ///
    /// All identity-cache entries are forgotten and the native log handler is removed. Wrappers
    /// the application still holds keep working and release their handles when dropped; new
    /// wrappers can't be created.
    ///
    /// Keep-alive edges are left alone: each one still goes away with its holder, so a view
    /// never outlives the parent it points into.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        crate::log::uninstall(&self.inner);
        let forgotten = self.inner.cache.clear();
        log::debug!(
            "bridge shut down: forgot {} wrapper(s), {} keep-alive edge(s) still held",
            forgotten,
            self.inner.refs.edge_count()
        );
    }
}

#[inline]
fn arc_key<T: Any + Send + Sync>(target: &Arc<T>) -> usize {
    // Same value `target_key` yields once the Arc is unsized.
    Arc::as_ptr(target) as *const () as usize
}
