//! Module for calling into the native bridge library
use rustgst_sys as ffi;
use std::{
    ffi::{c_char, c_void, CStr},
    ptr::NonNull,
};

#[cfg(feature = "native-functions")]
use std::{
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};

/// A wrapper for the native function table.
///
/// Every outbound call of the bridge goes through here: the explicit refs of the ownership
/// protocol, the releases of [`NativeHandle`](crate::handle::NativeHandle) and the closure
/// registrations of the signal bridge.
#[derive(Debug, Clone, Copy)]
pub struct API {
    // Note that this is *const, not *mut.
    handle: NonNull<ffi::GbApi>,
}

unsafe impl Send for API {}
unsafe impl Sync for API {}

/// A cached API pointer. Note that this is `*const ffi::GbApi`, not `*mut`.
#[cfg(feature = "native-functions")]
static RAW_API: AtomicPtr<ffi::GbApi> = AtomicPtr::new(ptr::null_mut());

impl API {
    /// Wraps a function table handed over by the host.
    ///
    /// Returns `None` if `table` is null, was built for another major ABI version or lacks one
    /// of the entries the bridge cannot work without.
    ///
    /// # Safety
    /// `table` must stay valid and unmodified for as long as any bridge object built on top of
    /// it is alive.
    pub unsafe fn from_raw(table: *const ffi::GbApi) -> Option<Self> {
        let handle = NonNull::new(table as *mut ffi::GbApi)?;
        let api = handle.as_ref();

        if (api.apiVersion >> 16) as u32 != ffi::GB_API_MAJOR {
            log::warn!(
                "native bridge table has ABI version {:#x}, expected major {}",
                api.apiVersion,
                ffi::GB_API_MAJOR
            );
            return None;
        }

        let complete = api.objectRef.is_some()
            && api.objectRefSink.is_some()
            && api.objectUnref.is_some()
            && api.freeResource.is_some()
            && api.signalConnect.is_some()
            && api.signalDisconnect.is_some();
        if !complete {
            log::warn!("native bridge table is missing required entry points");
            return None;
        }

        Some(Self { handle })
    }

    /// Retrieves the function table of the linked native library.
    ///
    /// Returns `None` on error
    #[cfg(feature = "native-functions")]
    #[inline]
    pub fn get() -> Option<Self> {
        // Check if we already have the API.
        let handle = RAW_API.load(Ordering::Relaxed);

        let handle = if handle.is_null() {
            // Attempt retrieving it otherwise.
            let handle = unsafe { ffi::gb_get_api(ffi::GB_API_VERSION) } as *mut ffi::GbApi;

            if !handle.is_null() {
                // If we successfully retrieved the API, cache it.
                RAW_API.store(handle, Ordering::Relaxed);
            }
            handle
        } else {
            handle
        };

        unsafe { Self::from_raw(handle) }
    }

    #[inline]
    pub fn version(&self) -> i32 {
        unsafe { self.handle.as_ref().apiVersion }
    }

    #[inline]
    pub(crate) unsafe fn ref_object(&self, object: *mut c_void) -> *mut c_void {
        self.handle.as_ref().objectRef.unwrap()(object)
    }

    #[inline]
    pub(crate) unsafe fn ref_sink_object(&self, object: *mut c_void) -> *mut c_void {
        self.handle.as_ref().objectRefSink.unwrap()(object)
    }

    #[inline]
    pub(crate) unsafe fn unref_object(&self, object: *mut c_void) {
        self.handle.as_ref().objectUnref.unwrap()(object)
    }

    /// Libraries without floating references leave the entry empty.
    #[inline]
    pub(crate) unsafe fn is_floating(&self, object: *mut c_void) -> bool {
        match self.handle.as_ref().objectIsFloating {
            Some(is_floating) => is_floating(object) != 0,
            None => false,
        }
    }

    #[inline]
    pub(crate) unsafe fn ref_count(&self, object: *mut c_void) -> Option<u32> {
        let ref_count = self.handle.as_ref().objectRefCount?;
        u32::try_from(ref_count(object)).ok()
    }

    pub(crate) unsafe fn type_name<'a>(&self, object: *mut c_void) -> Option<&'a str> {
        let type_name = self.handle.as_ref().objectTypeName?;
        let ptr = type_name(object);
        if ptr.is_null() {
            None
        } else {
            CStr::from_ptr(ptr).to_str().ok()
        }
    }

    #[inline]
    pub(crate) unsafe fn free_resource(&self, resource: *mut c_void) {
        self.handle.as_ref().freeResource.unwrap()(resource)
    }

    pub(crate) unsafe fn signal_connect(
        &self,
        instance: *mut c_void,
        signal: *const c_char,
        callback: ffi::GbSignalCallback,
        user_data: *mut c_void,
        destroy: ffi::GbDestroyNotify,
    ) -> u64 {
        self.handle.as_ref().signalConnect.unwrap()(instance, signal, callback, user_data, destroy)
            as u64
    }

    pub(crate) unsafe fn signal_disconnect(&self, instance: *mut c_void, handler_id: u64) {
        self.handle.as_ref().signalDisconnect.unwrap()(instance, handler_id as _)
    }

    /// Returns `false` if the library can't route its diagnostics to us.
    pub(crate) unsafe fn set_log_handler(
        &self,
        callback: ffi::GbLogCallback,
        user_data: *mut c_void,
        destroy: ffi::GbDestroyNotify,
    ) -> bool {
        match self.handle.as_ref().setLogHandler {
            Some(set_log_handler) => {
                set_log_handler(callback, user_data, destroy);
                true
            }
            None => false,
        }
    }
}
