//! Wrappers and their finalization.
//!
//! A wrapper is an `Arc<T>` where `T` implements [`NativeObject`] by embedding one
//! [`ObjectCore`]. The core owns the [`NativeHandle`], the closures connected on the object and
//! the sub-resource handles it adopted. Dropping the last `Arc` drops the core, which is the
//! finalization trigger: the native resource is released there, after the identity cache has
//! forgotten the wrapper.

use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bridge::{Bridge, BridgeInner};
use crate::cache::AnyWrapper;
use crate::handle::{HandleResult, HandleState, NativeHandle, ResourceKind};
use crate::signal::ClosureEntry;

mod errors;
pub use self::errors::{ObjectError, ObjectResult};

#[cfg(test)]
mod tests;

/// Process-unique identity of one wrapper.
///
/// Addresses get reused by the native allocator, wrapper ids never do.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct WrapperId(u64);

impl WrapperId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// State shared with connection tokens, which only hold it weakly.
pub(crate) struct CoreShared {
    id: WrapperId,
    handle: NativeHandle,
    closures: Mutex<HashMap<u64, ClosureEntry>>,
    children: Mutex<Vec<NativeHandle>>,
    released: AtomicBool,
}

impl CoreShared {
    #[inline]
    pub(crate) fn id(&self) -> WrapperId {
        self.id
    }

    #[inline]
    pub(crate) fn handle(&self) -> &NativeHandle {
        &self.handle
    }

    pub(crate) fn closures(&self) -> MutexGuard<'_, HashMap<u64, ClosureEntry>> {
        self.closures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn children(&self) -> MutexGuard<'_, Vec<NativeHandle>> {
        self.children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[inline]
    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// The part every wrapper embeds.
pub struct ObjectCore {
    shared: Arc<CoreShared>,
    bridge: Arc<BridgeInner>,
}

impl fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCore")
            .field("id", &self.shared.id)
            .field("handle", &self.shared.handle)
            .field("closures", &self.shared.closures().len())
            .field("children", &self.shared.children().len())
            .finish()
    }
}

impl Drop for ObjectCore {
    fn drop(&mut self) {
        // Finalization can happen while this thread holds the cache lock, e.g. when a lookup
        // downcast fails, so the cache removal must not block here.
        self.release(Release::Finalize);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Finalize,
    Dispose,
    Invalidate,
}

impl ObjectCore {
    pub(crate) fn new(bridge: Arc<BridgeInner>, handle: NativeHandle) -> Self {
        Self {
            shared: Arc::new(CoreShared {
                id: WrapperId::next(),
                handle,
                closures: Mutex::new(HashMap::new()),
                children: Mutex::new(Vec::new()),
                released: AtomicBool::new(false),
            }),
            bridge,
        }
    }

    #[inline]
    pub fn id(&self) -> WrapperId {
        self.shared.id
    }

    #[inline]
    pub(crate) fn handle(&self) -> &NativeHandle {
        &self.shared.handle
    }

    #[inline]
    pub fn address(&self) -> HandleResult<NonNull<c_void>> {
        self.shared.handle.address()
    }

    #[inline]
    pub fn as_ptr(&self) -> HandleResult<*mut c_void> {
        self.shared.handle.as_ptr()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.shared.handle.is_valid()
    }

    #[inline]
    pub fn state(&self) -> HandleState {
        self.shared.handle.state()
    }

    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.shared.handle.kind()
    }

    /// Whether dropping the wrapper releases the native resource.
    #[inline]
    pub fn owns_resource(&self) -> bool {
        self.shared.handle.owns_resource()
    }

    /// The bridge this wrapper was created through.
    pub fn bridge(&self) -> Bridge {
        Bridge::from_inner(Arc::clone(&self.bridge))
    }

    #[inline]
    pub(crate) fn shared(&self) -> &Arc<CoreShared> {
        &self.shared
    }

    #[inline]
    pub(crate) fn bridge_inner(&self) -> &Arc<BridgeInner> {
        &self.bridge
    }

    /// Records a keep-alive edge from this wrapper to `target`.
    ///
    /// The released check and the insertion happen under the closure table lock, which
    /// finalization takes before it drops the wrapper's edges; an edge is therefore either
    /// dropped by finalization or refused here.
    pub(crate) fn hold(&self, target: Arc<AnyWrapper>) -> bool {
        let closures = self.shared.closures();
        if self.shared.is_released() {
            drop(closures);
            log::warn!("keep-alive edge requested on released {:?}, ignoring", self.id());
            drop(target);
            return false;
        }
        let added = self.bridge.refs.add(self.shared.id, target);
        drop(closures);
        added
    }

    /// Makes `child` part of this wrapper: it is disposed right before the wrapper's own handle.
    ///
    /// A child adopted after the wrapper was disposed is disposed immediately.
    pub fn adopt_child(&self, child: NativeHandle) {
        let mut children = self.shared.children();
        if self.shared.is_released() {
            drop(children);
            log::trace!("{:?} already released, disposing adopted child", self.id());
            child.dispose();
            return;
        }
        children.push(child);
    }

    /// The number of sub-resource handles adopted so far.
    pub fn child_count(&self) -> usize {
        self.shared.children().len()
    }

    /// The number of closures currently connected on this object.
    pub fn connection_count(&self) -> usize {
        self.shared.closures().len()
    }

    /// Gives up ownership of the native resource; see [`NativeHandle::disown`].
    pub fn disown(&self) -> HandleResult<()> {
        self.shared.handle.disown()
    }

    /// Runs the finalization sequence now instead of on drop. Idempotent.
    ///
    /// This is the only way to release a wrapper's resource early; its handle isn't reachable
    /// from outside the crate, so it can't be disposed behind the identity cache's back:
    ///
    /// ```compile_fail
    /// fn dispose_handle(core: &rustgst::object::ObjectCore) {
    ///     core.handle().dispose();
    /// }
    /// ```
    pub fn dispose(&self) {
        self.release(Release::Dispose);
    }

    /// Tells the wrapper its native object is already gone.
    ///
    /// The wrapper is forgotten and its closures deactivated, but nothing is released or
    /// disconnected natively.
    pub fn invalidate(&self) {
        self.release(Release::Invalidate);
    }

    fn release(&self, how: Release) {
        let shared = &self.shared;
        if shared.released.swap(true, Ordering::AcqRel) {
            return;
        }

        let key = shared.handle.key();
        let bridge = &self.bridge;
        log::trace!("finalizing {:?} for {:#x} ({:?})", shared.id, key, how);

        // 1. No lookup may resolve to this wrapper from here on.
        match how {
            Release::Finalize => bridge.cache.forget_deferred(key, shared.id),
            Release::Dispose | Release::Invalidate => bridge.cache.forget(key, shared.id),
        }

        if how == Release::Invalidate {
            let _ = shared.handle.disown();
        }

        // 2. Closures. The table stays locked across the native calls so an explicit
        // disconnect never races with this one.
        {
            let mut closures = shared.closures();
            let instance = shared.handle.as_ptr().ok();
            for (handler_id, entry) in closures.drain() {
                entry.state.deactivate();
                if let (Some(instance), false) = (instance, how == Release::Invalidate) {
                    log::trace!("disconnecting `{}` handler {}", entry.signal, handler_id);
                    unsafe { bridge.api.signal_disconnect(instance, handler_id) };
                }
            }
        }

        // 3. Keep-alive edges held by this wrapper, closure states included.
        bridge.refs.release_holder(shared.id);

        // 4. Sub-resources go before the resource they belong to.
        let children = std::mem::take(&mut *shared.children());
        for child in &children {
            if how == Release::Invalidate {
                let _ = child.disown();
            }
            child.dispose();
        }
        drop(children);

        // 5.
        shared.handle.dispose();
    }
}

/// A wrapper around one native object.
///
/// Implement it by embedding an [`ObjectCore`], by hand or with `#[derive(NativeObject)]`
/// (feature `proc-macro`).
pub trait NativeObject: std::any::Any + Send + Sync {
    fn core(&self) -> &ObjectCore;

    #[inline]
    fn id(&self) -> WrapperId {
        self.core().id()
    }

    #[inline]
    fn address(&self) -> HandleResult<NonNull<c_void>> {
        self.core().address()
    }

    #[inline]
    fn as_ptr(&self) -> HandleResult<*mut c_void> {
        self.core().as_ptr()
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.core().is_valid()
    }

    fn disown(&self) -> HandleResult<()> {
        self.core().disown()
    }

    fn dispose(&self) {
        self.core().dispose()
    }

    fn invalidate(&self) {
        self.core().invalidate()
    }

    /// The native reference count, if the library reports one.
    fn native_ref_count(&self) -> Option<u32> {
        let ptr = self.as_ptr().ok()?;
        unsafe { self.core().handle().api().ref_count(ptr) }
    }

    /// The native type name, if the library reports one.
    fn native_type_name(&self) -> Option<String> {
        let ptr = self.as_ptr().ok()?;
        unsafe { self.core().handle().api().type_name(ptr) }.map(str::to_owned)
    }
}

/// A wrapper with no type-specific surface.
#[derive(Debug)]
pub struct Object {
    core: ObjectCore,
}

impl Object {
    #[inline]
    pub fn new(core: ObjectCore) -> Self {
        Self { core }
    }
}

impl NativeObject for Object {
    #[inline]
    fn core(&self) -> &ObjectCore {
        &self.core
    }
}
