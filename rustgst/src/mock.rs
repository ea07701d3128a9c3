//! An in-process stand-in for the native bridge library, used by the unit tests.
//!
//! Objects are real heap allocations that are never returned to the allocator, so an address
//! is never reused and per-address counters stay meaningful across tests running in parallel.
//! Handler records are reference counted like GLib closures: the destroy notify runs once the
//! record is disconnected and no emission still uses it.

use rustgst_sys as ffi;
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_uint, c_ulong, c_void, CStr, CString};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::api::API;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    RefCounted,
    SingleOwner,
}

#[derive(Debug)]
struct MockObject {
    kind: Kind,
    type_name: CString,
    ref_count: i32,
    floating: bool,
    alive: bool,
    ref_calls: u32,
    unref_calls: u32,
    free_calls: u32,
    violations: u32,
    released_at: Option<u64>,
}

struct HandlerRecord {
    instance: usize,
    signal: String,
    callback: ffi::GbSignalCallback,
    user_data: usize,
    destroy: ffi::GbDestroyNotify,
}

impl Drop for HandlerRecord {
    fn drop(&mut self) {
        if let Some(destroy) = self.destroy {
            unsafe { destroy(self.user_data as *mut c_void) };
        }
    }
}

struct LogRecord {
    callback: ffi::GbLogCallback,
    user_data: usize,
    destroy: ffi::GbDestroyNotify,
}

impl Drop for LogRecord {
    fn drop(&mut self) {
        if let Some(destroy) = self.destroy {
            unsafe { destroy(self.user_data as *mut c_void) };
        }
    }
}

#[derive(Default)]
struct MockState {
    objects: HashMap<usize, MockObject>,
    handlers: HashMap<u64, Arc<HandlerRecord>>,
    next_handler_id: u64,
    next_release: u64,
    log: Option<Arc<LogRecord>>,
}

impl MockState {
    fn next_release(&mut self) -> u64 {
        self.next_release += 1;
        self.next_release
    }
}

fn state() -> MutexGuard<'static, MockState> {
    static STATE: OnceLock<Mutex<MockState>> = OnceLock::new();
    STATE
        .get_or_init(|| Mutex::new(MockState::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

static TABLE: ffi::GbApi = ffi::GbApi {
    apiVersion: ffi::GB_API_VERSION,
    objectRef: Some(mock_ref),
    objectRefSink: Some(mock_ref_sink),
    objectUnref: Some(mock_unref),
    objectIsFloating: Some(mock_is_floating),
    objectRefCount: Some(mock_ref_count),
    objectTypeName: Some(mock_type_name),
    freeResource: Some(mock_free),
    signalConnect: Some(mock_signal_connect),
    signalDisconnect: Some(mock_signal_disconnect),
    setLogHandler: Some(mock_set_log_handler),
};

pub(crate) fn table() -> *const ffi::GbApi {
    &TABLE
}

pub(crate) fn api() -> API {
    unsafe { API::from_raw(&TABLE) }.expect("mock table is complete")
}

fn allocate(kind: Kind, type_name: &str, floating: bool) -> *mut c_void {
    let address = Box::leak(Box::new([0u64; 2])) as *mut [u64; 2] as *mut c_void;
    state().objects.insert(
        address as usize,
        MockObject {
            kind,
            type_name: CString::new(type_name).unwrap(),
            ref_count: 1,
            floating,
            alive: true,
            ref_calls: 0,
            unref_calls: 0,
            free_calls: 0,
            violations: 0,
            released_at: None,
        },
    );
    address
}

/// A reference-counted object holding one (non-floating) reference for the caller.
pub(crate) fn new_object(type_name: &str) -> *mut c_void {
    allocate(Kind::RefCounted, type_name, false)
}

/// A reference-counted object whose only reference is floating.
pub(crate) fn new_floating_object(type_name: &str) -> *mut c_void {
    allocate(Kind::RefCounted, type_name, true)
}

/// A single-owner resource.
pub(crate) fn new_resource(type_name: &str) -> *mut c_void {
    allocate(Kind::SingleOwner, type_name, false)
}

fn with_object<R>(address: *mut c_void, f: impl FnOnce(&MockObject) -> R) -> R {
    let state = state();
    let object = state
        .objects
        .get(&(address as usize))
        .expect("unknown mock object");
    f(object)
}

pub(crate) fn ref_count(address: *mut c_void) -> i32 {
    with_object(address, |o| o.ref_count)
}

pub(crate) fn ref_calls(address: *mut c_void) -> u32 {
    with_object(address, |o| o.ref_calls)
}

pub(crate) fn unref_calls(address: *mut c_void) -> u32 {
    with_object(address, |o| o.unref_calls)
}

pub(crate) fn free_calls(address: *mut c_void) -> u32 {
    with_object(address, |o| o.free_calls)
}

/// Unref or free calls that hit an already released resource.
pub(crate) fn violations(address: *mut c_void) -> u32 {
    with_object(address, |o| o.violations)
}

/// Position of the final release of `address` among all releases in the process.
pub(crate) fn released_at(address: *mut c_void) -> Option<u64> {
    with_object(address, |o| o.released_at)
}

pub(crate) fn is_alive(address: *mut c_void) -> bool {
    with_object(address, |o| o.alive)
}

pub(crate) fn is_floating(address: *mut c_void) -> bool {
    with_object(address, |o| o.floating)
}

pub(crate) fn handler_count(address: *mut c_void) -> usize {
    state()
        .handlers
        .values()
        .filter(|h| h.instance == address as usize)
        .count()
}

/// Drops a reference held by "native code".
pub(crate) fn native_unref(address: *mut c_void) {
    unsafe { mock_unref(address) }
}

/// Emits `signal` on `instance` from the calling thread, returning the number of handlers run.
pub(crate) fn emit(instance: *mut c_void, signal: &str, args: &[ffi::GbValue]) -> usize {
    let handlers: Vec<Arc<HandlerRecord>> = {
        let state = state();
        let mut handlers: Vec<(u64, Arc<HandlerRecord>)> = state
            .handlers
            .iter()
            .filter(|(_, h)| h.instance == instance as usize && h.signal == signal)
            .map(|(id, h)| (*id, Arc::clone(h)))
            .collect();
        handlers.sort_by_key(|(id, _)| *id);
        handlers.into_iter().map(|(_, h)| h).collect()
    };

    for handler in &handlers {
        if let Some(callback) = handler.callback {
            unsafe {
                callback(
                    instance,
                    args.as_ptr(),
                    args.len() as c_uint,
                    handler.user_data as *mut c_void,
                )
            };
        }
    }
    handlers.len()
}

/// Sends a diagnostic message through the installed log handler, if any.
pub(crate) fn log(level: ffi::GbMessageLevel, domain: &str, message: &str) -> bool {
    let record = state().log.clone();
    let Some(record) = record else {
        return false;
    };
    let domain = CString::new(domain).unwrap();
    let message = CString::new(message).unwrap();
    if let Some(callback) = record.callback {
        unsafe {
            callback(
                level as c_int,
                domain.as_ptr(),
                message.as_ptr(),
                record.user_data as *mut c_void,
            )
        };
    }
    true
}

unsafe extern "C" fn mock_ref(object: *mut c_void) -> *mut c_void {
    let mut state = state();
    if let Some(o) = state.objects.get_mut(&(object as usize)) {
        if !o.alive || o.kind != Kind::RefCounted {
            o.violations += 1;
        } else {
            o.ref_count += 1;
            o.ref_calls += 1;
        }
    }
    object
}

unsafe extern "C" fn mock_ref_sink(object: *mut c_void) -> *mut c_void {
    let mut state = state();
    if let Some(o) = state.objects.get_mut(&(object as usize)) {
        if !o.alive || o.kind != Kind::RefCounted {
            o.violations += 1;
        } else if o.floating {
            o.floating = false;
            o.ref_calls += 1;
        } else {
            o.ref_count += 1;
            o.ref_calls += 1;
        }
    }
    object
}

unsafe extern "C" fn mock_unref(object: *mut c_void) {
    let finalized: Vec<Arc<HandlerRecord>> = {
        let mut state = state();
        let finalize = match state.objects.get_mut(&(object as usize)) {
            Some(o) if !o.alive || o.kind != Kind::RefCounted || o.ref_count <= 0 => {
                o.violations += 1;
                false
            }
            Some(o) => {
                o.unref_calls += 1;
                o.ref_count -= 1;
                if o.ref_count == 0 {
                    o.alive = false;
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if finalize {
            let seq = state.next_release();
            if let Some(o) = state.objects.get_mut(&(object as usize)) {
                o.released_at = Some(seq);
            }

            // Finalizing an instance drops all of its handlers.
            let ids: Vec<u64> = state
                .handlers
                .iter()
                .filter(|(_, h)| h.instance == object as usize)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| state.handlers.remove(&id))
                .collect()
        } else {
            Vec::new()
        }
    };
    // Destroy notifies may call back into the mock.
    drop(finalized);
}

unsafe extern "C" fn mock_is_floating(object: *mut c_void) -> c_int {
    state()
        .objects
        .get(&(object as usize))
        .map_or(0, |o| o.floating as c_int)
}

unsafe extern "C" fn mock_ref_count(object: *mut c_void) -> c_int {
    state()
        .objects
        .get(&(object as usize))
        .map_or(-1, |o| o.ref_count)
}

unsafe extern "C" fn mock_type_name(object: *mut c_void) -> *const c_char {
    // Records are never removed, so the name outlives the lock.
    state()
        .objects
        .get(&(object as usize))
        .map_or(std::ptr::null(), |o| o.type_name.as_ptr())
}

unsafe extern "C" fn mock_free(resource: *mut c_void) {
    let mut state = state();
    let seq = state.next_release();
    if let Some(o) = state.objects.get_mut(&(resource as usize)) {
        if !o.alive || o.kind != Kind::SingleOwner {
            o.violations += 1;
        } else {
            o.alive = false;
            o.free_calls += 1;
            o.released_at = Some(seq);
        }
    }
}

unsafe extern "C" fn mock_signal_connect(
    instance: *mut c_void,
    signal: *const c_char,
    callback: ffi::GbSignalCallback,
    user_data: *mut c_void,
    destroy: ffi::GbDestroyNotify,
) -> c_ulong {
    let signal = CStr::from_ptr(signal).to_string_lossy().into_owned();
    let mut state = state();
    let alive = state
        .objects
        .get(&(instance as usize))
        .is_some_and(|o| o.alive);
    if !alive {
        return 0;
    }

    state.next_handler_id += 1;
    let id = state.next_handler_id;
    state.handlers.insert(
        id,
        Arc::new(HandlerRecord {
            instance: instance as usize,
            signal,
            callback,
            user_data: user_data as usize,
            destroy,
        }),
    );
    id as c_ulong
}

unsafe extern "C" fn mock_signal_disconnect(instance: *mut c_void, handler_id: c_ulong) {
    let removed = {
        let mut state = state();
        match state.handlers.get(&(handler_id as u64)) {
            Some(h) if h.instance == instance as usize => state.handlers.remove(&(handler_id as u64)),
            _ => None,
        }
    };
    drop(removed);
}

unsafe extern "C" fn mock_set_log_handler(
    callback: ffi::GbLogCallback,
    user_data: *mut c_void,
    destroy: ffi::GbDestroyNotify,
) {
    let record = callback.map(|_| {
        Arc::new(LogRecord {
            callback,
            user_data: user_data as usize,
            destroy,
        })
    });
    let previous = std::mem::replace(&mut state().log, record);
    drop(previous);
}
