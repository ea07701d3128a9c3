use rustgst_sys as ffi;
use std::ffi::{c_uint, c_void};
use std::panic;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::{Listener, Signal, Value};
use crate::bridge::{Bridge, BridgeInner};

/// The type-erased side of a closure, as stored in an object's closure table.
pub(crate) trait ClosureState: Send + Sync {
    /// Stops the listener from being invoked by later emissions.
    fn deactivate(&self);
}

/// One row of an object's closure table, keyed by the native handler id.
pub(crate) struct ClosureEntry {
    pub(crate) signal: &'static str,
    /// Identity of the listener, for duplicate detection.
    pub(crate) listener: usize,
    pub(crate) state: Arc<dyn ClosureState>,
}

impl ClosureEntry {
    /// The keep-alive key of the closure state.
    #[inline]
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.state) as *const () as usize
    }
}

/// What the native side holds as user data, boxed once more as `Box<Arc<ClosureShared<S>>>`.
pub(crate) struct ClosureShared<S: Signal> {
    listener: Listener<S::Args>,
    active: AtomicBool,
    bridge: Weak<BridgeInner>,
    catch_panics: bool,
}

impl<S: Signal> ClosureState for ClosureShared<S> {
    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl<S: Signal> ClosureShared<S> {
    pub(crate) fn new(listener: Listener<S::Args>, bridge: &Arc<BridgeInner>) -> Self {
        Self {
            listener,
            active: AtomicBool::new(true),
            bridge: Arc::downgrade(bridge),
            catch_panics: bridge
                .flags
                .contains(crate::bridge::BridgeFlags::CATCH_LISTENER_PANICS),
        }
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    unsafe fn invoke(&self, instance: *mut c_void, args: *const ffi::GbValue, n_args: usize) {
        // A callback that got past this check before a disconnect returned may still run.
        if !self.is_active() {
            return;
        }
        let Some(bridge) = self.bridge.upgrade() else {
            return;
        };
        let bridge = Bridge::from_inner(bridge);

        let marshaled = Value::from_raw_slice(args, n_args)
            .and_then(|values| S::marshal(&bridge, instance, &values));
        match marshaled {
            Ok(args) => (self.listener)(args),
            Err(err) => log::warn!("dropping `{}` emission on {:p}: {}", S::NAME, instance, err),
        }
    }
}

pub(crate) unsafe extern "C" fn c_callback<S: Signal>(
    instance: *mut c_void,
    args: *const ffi::GbValue,
    n_args: c_uint,
    user_data: *mut c_void,
) {
    if user_data.is_null() {
        return;
    }
    let closure = &*(user_data as *const Arc<ClosureShared<S>>);
    let catch_panics = closure.catch_panics;

    let call = panic::AssertUnwindSafe(move || closure.invoke(instance, args, n_args as usize));

    if panic::catch_unwind(call).is_err() {
        if catch_panics {
            log::error!("listener for `{}` on {:p} panicked", S::NAME, instance);
        } else {
            process::abort();
        }
    }
}

pub(crate) unsafe extern "C" fn c_free<S: Signal>(user_data: *mut c_void) {
    drop(Box::from_raw(user_data as *mut Arc<ClosureShared<S>>))
}
