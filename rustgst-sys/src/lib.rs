//! Low level declarations of the native object bridge ABI
//!
//! This crate provides the raw `#[repr(C)]` types shared with the native bridge library: the
//! function table every outbound call goes through, the value cells signal arguments arrive in
//! and the callback signatures the native side calls back with.
//! For a safe wrapper, see the `rustgst` crate.
//!
//! ## Feature Flags
//!
//! - **`native-functions`** - Links to the native bridge library and declares [`gb_get_api`].
//!   Without it the host application is expected to hand a [`GbApi`] table pointer over itself.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(clippy::missing_safety_doc)]

use std::os::raw::{c_char, c_int, c_uint, c_ulong, c_void};

/// Makes a bridge compatible version integer
///
/// # Example
/// If wanting to represent the version with major 2 and minor 1
/// ```
/// use rustgst_sys::version;
/// let v = version!(2,1);
/// assert!(v == 0x20001);
/// ```
#[macro_export]
macro_rules! version {
    ($major:expr, $minor:expr) => {
        (($major) << 16) | ($minor)
    };
}

pub const GB_API_MAJOR: u32 = 1;
pub const GB_API_MINOR: u32 = 0;
pub const GB_API_VERSION: i32 = version!(GB_API_MAJOR as i32, GB_API_MINOR as i32);

/// Tag stored in [`GbValue::type_`].
#[repr(C)]
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum GbValueType {
    vtNone = 0,
    vtBoolean = 1,
    vtInt = 2,
    vtUInt = 3,
    vtDouble = 4,
    vtString = 5,
    vtObject = 6,
    vtPointer = 7,
}

/// Severity passed to a [`GbLogCallback`].
#[repr(C)]
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum GbMessageLevel {
    mlDebug = 0,
    mlInformation = 1,
    mlWarning = 2,
    mlCritical = 3,
    mlFatal = 4,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union GbValueData {
    pub v_int: i64,
    pub v_uint: u64,
    pub v_double: f64,
    pub v_string: *const c_char,
    pub v_pointer: *mut c_void,
}

/// One marshaled signal argument. Booleans travel in `v_int`.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct GbValue {
    /// One of [`GbValueType`], kept as a plain integer so unknown tags from newer libraries
    /// can be rejected instead of being undefined behaviour.
    pub type_: c_int,
    pub data: GbValueData,
}

pub type GbSignalCallback = Option<
    unsafe extern "C" fn(
        instance: *mut c_void,
        args: *const GbValue,
        n_args: c_uint,
        user_data: *mut c_void,
    ),
>;

pub type GbDestroyNotify = Option<unsafe extern "C" fn(user_data: *mut c_void)>;

pub type GbLogCallback = Option<
    unsafe extern "C" fn(
        level: c_int,
        domain: *const c_char,
        message: *const c_char,
        user_data: *mut c_void,
    ),
>;

/// The function table of the native bridge library.
///
/// Reference-counted objects use the `object*` entries, single-owner resources are released
/// with `freeResource`. Signal user data passed to `signalConnect` stays owned by the native
/// side until it calls the destroy notify, which happens after disconnection once no emission
/// is still running with it. A `signalConnect` that returns 0 didn't take the user data.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct GbApi {
    pub apiVersion: c_int,
    pub objectRef: Option<unsafe extern "C" fn(object: *mut c_void) -> *mut c_void>,
    pub objectRefSink: Option<unsafe extern "C" fn(object: *mut c_void) -> *mut c_void>,
    pub objectUnref: Option<unsafe extern "C" fn(object: *mut c_void)>,
    pub objectIsFloating: Option<unsafe extern "C" fn(object: *mut c_void) -> c_int>,
    pub objectRefCount: Option<unsafe extern "C" fn(object: *mut c_void) -> c_int>,
    pub objectTypeName: Option<unsafe extern "C" fn(object: *mut c_void) -> *const c_char>,
    pub freeResource: Option<unsafe extern "C" fn(resource: *mut c_void)>,
    pub signalConnect: Option<
        unsafe extern "C" fn(
            instance: *mut c_void,
            signal: *const c_char,
            callback: GbSignalCallback,
            user_data: *mut c_void,
            destroy: GbDestroyNotify,
        ) -> c_ulong,
    >,
    pub signalDisconnect: Option<unsafe extern "C" fn(instance: *mut c_void, handler_id: c_ulong)>,
    pub setLogHandler: Option<
        unsafe extern "C" fn(callback: GbLogCallback, user_data: *mut c_void, destroy: GbDestroyNotify),
    >,
}

#[cfg(feature = "native-functions")]
extern "C" {
    /// Returns the function table of the linked library, or null if `version` isn't supported.
    pub fn gb_get_api(version: c_int) -> *const GbApi;
}

impl GbValue {
    /// An empty value cell.
    #[inline]
    pub const fn none() -> Self {
        GbValue {
            type_: GbValueType::vtNone as c_int,
            data: GbValueData { v_int: 0 },
        }
    }

    #[inline]
    pub const fn from_int(value: i64) -> Self {
        GbValue {
            type_: GbValueType::vtInt as c_int,
            data: GbValueData { v_int: value },
        }
    }

    #[inline]
    pub const fn from_object(object: *mut c_void) -> Self {
        GbValue {
            type_: GbValueType::vtObject as c_int,
            data: GbValueData { v_pointer: object },
        }
    }
}
