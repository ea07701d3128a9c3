//! Forwarding of native diagnostics.
use log::{debug, error, info, warn};
use rustgst_sys as ffi;
use std::{
    ffi::{c_char, c_int, c_void, CStr},
    panic, process,
    ptr,
    sync::atomic::Ordering,
};

use crate::bridge::{Bridge, BridgeInner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageLevel {
    Debug = 0,
    Information = 1,
    Warning = 2,
    Critical = 3,
    Fatal = 4,
}

impl From<i32> for MessageLevel {
    fn from(value: i32) -> Self {
        match value {
            0 => MessageLevel::Debug,
            1 => MessageLevel::Information,
            2 => MessageLevel::Warning,
            3 => MessageLevel::Critical,
            4 => MessageLevel::Fatal,
            _ => MessageLevel::Debug, // fallback
        }
    }
}

impl From<MessageLevel> for i32 {
    fn from(level: MessageLevel) -> Self {
        level as i32
    }
}

impl From<MessageLevel> for log::Level {
    fn from(level: MessageLevel) -> Self {
        match level {
            MessageLevel::Debug => log::Level::Debug,
            MessageLevel::Information => log::Level::Info,
            MessageLevel::Warning => log::Level::Warn,
            MessageLevel::Critical | MessageLevel::Fatal => log::Level::Error,
        }
    }
}

pub trait LogHandler: Send + Sync {
    fn handle(&self, level: MessageLevel, domain: &str, msg: &str);
}

// C callback function that bridges to Rust LogHandler
unsafe extern "C" fn log_handler_callback(
    level: c_int,
    domain: *const c_char,
    msg: *const c_char,
    user_data: *mut c_void,
) {
    if user_data.is_null() || msg.is_null() {
        return;
    }

    let closure = panic::AssertUnwindSafe(|| {
        let handler = &*(user_data as *const Box<dyn LogHandler>);
        let domain = if domain.is_null() {
            ""
        } else {
            CStr::from_ptr(domain).to_str().unwrap_or("")
        };
        let msg = CStr::from_ptr(msg).to_string_lossy();
        handler.handle(MessageLevel::from(level), domain, &msg);
    });

    if panic::catch_unwind(closure).is_err() {
        process::abort();
    }
}

unsafe extern "C" fn log_handler_free(user_data: *mut c_void) {
    drop(Box::from_raw(user_data as *mut Box<dyn LogHandler>))
}

/// LogHandler Implementation using [`log`](https://github.com/rust-lang/log)
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRS {}

impl LogHandler for LogRS {
    fn handle(&self, level: MessageLevel, domain: &str, msg: &str) {
        match level {
            MessageLevel::Debug => debug!(target: "rustgst::native", "[{}] {}", domain, msg),
            MessageLevel::Information => info!(target: "rustgst::native", "[{}] {}", domain, msg),
            MessageLevel::Warning => warn!(target: "rustgst::native", "[{}] {}", domain, msg),
            MessageLevel::Critical => error!(target: "rustgst::native", "[{}] {}", domain, msg),
            MessageLevel::Fatal => error!(target: "rustgst::native", "[{}] FATAL: {}", domain, msg),
        }
    }
}

impl Bridge {
    /// Routes the native library's diagnostics to `handler`, replacing any previous handler.
    ///
    /// The native side owns the handler from here on and drops it when it is replaced or the
    /// bridge shuts down. Returns `false` if the library has no way to route its diagnostics.
    pub fn install_log_handler<H: LogHandler + 'static>(&self, handler: H) -> bool {
        if self.is_shut_down() {
            return false;
        }
        let handler: Box<dyn LogHandler> = Box::new(handler);
        let user_data = Box::into_raw(Box::new(handler)) as *mut c_void;

        let installed = unsafe {
            self.api().set_log_handler(
                Some(log_handler_callback),
                user_data,
                Some(log_handler_free),
            )
        };
        if installed {
            self.inner()
                .log_handler_installed
                .store(true, Ordering::Release);
        } else {
            unsafe { log_handler_free(user_data) };
        }
        installed
    }
}

/// Removes the handler installed through `inner`, if any.
pub(crate) fn uninstall(inner: &BridgeInner) {
    if inner.log_handler_installed.swap(false, Ordering::AcqRel) {
        unsafe { inner.api.set_log_handler(None, ptr::null_mut(), None) };
    }
}
