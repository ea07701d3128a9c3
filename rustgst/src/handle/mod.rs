//! Native handles.
//!
//! A [`NativeHandle`] is the sole owner of one native address. It knows how the resource behind
//! the address is released, whether it is responsible for releasing it, and moves through
//! `Valid -> Disposing -> Disposed` exactly once.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::api::API;

mod errors;
pub use self::errors::{HandleError, HandleResult};


/// The lifetime discipline of a native resource.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ResourceKind {
    /// Shared ownership; released with "unref", freed natively when the count reaches zero.
    RefCounted,
    /// Freed exactly once by whoever holds it; never shared.
    SingleOwner,
}

/// The lifecycle of a [`NativeHandle`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
#[repr(u8)]
pub enum HandleState {
    Valid = 0,
    Disposing = 1,
    Disposed = 2,
}

impl From<u8> for HandleState {
    fn from(value: u8) -> Self {
        match value {
            0 => HandleState::Valid,
            1 => HandleState::Disposing,
            _ => HandleState::Disposed,
        }
    }
}

/// A disposable capsule around one native pointer.
pub struct NativeHandle {
    handle: NonNull<c_void>,
    kind: ResourceKind,
    owns: AtomicBool,
    state: AtomicU8,
    api: API,
}

unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

impl Drop for NativeHandle {
    #[inline]
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("address", &self.handle)
            .field("kind", &self.kind)
            .field("owns", &self.owns_resource())
            .field("state", &self.state())
            .finish()
    }
}

impl NativeHandle {
    /// Wraps `ptr` in a `NativeHandle`.
    ///
    /// No native call is made here; whether `owns` is truthful is decided by the ownership
    /// protocol (see [`Ownership`](crate::ownership::Ownership)).
    pub fn new(api: API, ptr: *mut c_void, kind: ResourceKind, owns: bool) -> HandleResult<Self> {
        let handle = NonNull::new(ptr).ok_or(HandleError::NullPointer)?;
        Ok(Self {
            handle,
            kind,
            owns: AtomicBool::new(owns),
            state: AtomicU8::new(HandleState::Valid as u8),
            api,
        })
    }

    /// Returns the native address.
    ///
    /// Fails once disposal has started.
    #[inline]
    pub fn address(&self) -> HandleResult<NonNull<c_void>> {
        if self.is_valid() {
            Ok(self.handle)
        } else {
            Err(HandleError::InvalidHandle)
        }
    }

    /// Returns the underlying pointer, for marshaling into further native calls.
    #[inline]
    pub fn as_ptr(&self) -> HandleResult<*mut c_void> {
        self.address().map(NonNull::as_ptr)
    }

    /// The address regardless of the lifecycle; only usable as a key.
    #[inline]
    pub(crate) fn key(&self) -> usize {
        self.handle.as_ptr() as usize
    }

    #[inline]
    pub(crate) fn api(&self) -> API {
        self.api
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.state() == HandleState::Valid
    }

    #[inline]
    pub fn state(&self) -> HandleState {
        self.state.load(Ordering::Acquire).into()
    }

    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Whether disposal will release the resource.
    #[inline]
    pub fn owns_resource(&self) -> bool {
        self.owns.load(Ordering::Acquire)
    }

    /// Irreversibly gives up responsibility for releasing the resource.
    ///
    /// Used when a native call takes the resource over. The handle stays readable and disposal
    /// turns into a no-op. Disowning twice is harmless.
    pub fn disown(&self) -> HandleResult<()> {
        if !self.is_valid() {
            return Err(HandleError::InvalidHandle);
        }
        if self.owns.swap(false, Ordering::AcqRel) {
            log::trace!("disowned {:?} {:p}", self.kind, self.handle);
        }
        Ok(())
    }

    /// Disposes the handle, releasing the resource if this handle owns it.
    ///
    /// Only the first call does anything; it returns `true`.
    pub fn dispose(&self) -> bool {
        if self
            .state
            .compare_exchange(
                HandleState::Valid as u8,
                HandleState::Disposing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        // A concurrent disown can't make us release: whoever clears the flag first wins.
        if self.owns.swap(false, Ordering::AcqRel) {
            log::trace!("releasing {:?} {:p}", self.kind, self.handle);
            unsafe {
                match self.kind {
                    ResourceKind::RefCounted => self.api.unref_object(self.handle.as_ptr()),
                    ResourceKind::SingleOwner => self.api.free_resource(self.handle.as_ptr()),
                }
            }
        }

        self.state
            .store(HandleState::Disposed as u8, Ordering::Release);
        true
    }
}
