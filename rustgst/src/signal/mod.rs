//! The signal bridge.
//!
//! A native signal is described on the Rust side by a type implementing [`Signal`]: its name,
//! the typed arguments listeners receive, and how those are marshaled from the native value
//! cells. Connecting registers a closure with the native library whose user data points back to
//! the listener; the closure lives until it is disconnected, explicitly or by the object's
//! finalization.

use std::ffi::{c_void, CString};
use std::sync::{Arc, Weak};

use crate::bridge::{Bridge, BridgeFlags};
use crate::cache::AnyWrapper;
use crate::handle::HandleError;
use crate::object::{CoreShared, NativeObject, WrapperId};

mod closure;
mod errors;
mod value;

pub(crate) use self::closure::{ClosureEntry, ClosureState};
use self::closure::{c_callback, c_free, ClosureShared};
pub use self::errors::{SignalError, SignalResult};
pub use self::value::{Arguments, FromValue, Value, ValueType};


/// A listener for signals carrying `A`.
pub type Listener<A> = Arc<dyn Fn(A) + Send + Sync>;

/// A native signal.
///
/// # Example
///
/// ```
/// use std::ffi::c_void;
/// use rustgst::bridge::Bridge;
/// use rustgst::signal::{Arguments, Signal, SignalResult, Value};
///
/// struct Eos;
///
/// impl Signal for Eos {
///     const NAME: &'static str = "eos";
///     type Args = ();
///
///     fn marshal(_: &Bridge, _: *mut c_void, _: &[Value]) -> SignalResult<()> {
///         Ok(())
///     }
/// }
///
/// struct Message;
///
/// impl Signal for Message {
///     const NAME: &'static str = "message";
///     type Args = (i64, String);
///
///     fn marshal(_: &Bridge, _: *mut c_void, args: &[Value]) -> SignalResult<(i64, String)> {
///         let args = Arguments::new(Self::NAME, args);
///         Ok((args.get(0)?, args.get(1)?))
///     }
/// }
/// ```
pub trait Signal: 'static {
    const NAME: &'static str;

    /// What listeners receive.
    type Args: Send + 'static;

    /// Turns the decoded native arguments into [`Args`](Self::Args).
    ///
    /// Object arguments should be resolved through `bridge`, so listeners see the canonical
    /// wrapper for each address.
    fn marshal(bridge: &Bridge, instance: *mut c_void, args: &[Value]) -> SignalResult<Self::Args>;
}

/// Identifies one connection; pass it to [`Bridge::disconnect`].
///
/// The token doesn't keep the object alive. Disconnecting through a token whose object is gone
/// does nothing.
#[derive(Debug, Clone)]
pub struct ConnectionToken {
    handler_id: u64,
    signal: &'static str,
    object: WrapperId,
    shared: Weak<CoreShared>,
}

impl ConnectionToken {
    /// The id the native library assigned to the connection.
    #[inline]
    pub fn handler_id(&self) -> u64 {
        self.handler_id
    }

    #[inline]
    pub fn signal(&self) -> &'static str {
        self.signal
    }

    /// The wrapper the signal is connected on.
    #[inline]
    pub fn object(&self) -> WrapperId {
        self.object
    }

    /// Whether the connection still exists.
    pub fn is_connected(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let closures = shared.closures();
        closures.contains_key(&self.handler_id)
    }
}

impl Bridge {
    /// Connects `listener` to signal `S` of `object`.
    ///
    /// The listener runs synchronously on whatever thread the native library emits from.
    pub fn connect<S, T, F>(&self, object: &T, listener: F) -> SignalResult<ConnectionToken>
    where
        S: Signal,
        T: NativeObject + ?Sized,
        F: Fn(S::Args) + Send + Sync + 'static,
    {
        self.connect_listener::<S, T>(object, Arc::new(listener))
    }

    /// Like [`connect`](Self::connect), for a listener that may be shared between connections.
    ///
    /// With [`BridgeFlags::STRICT_CONNECTIONS`], connecting the same listener to the same signal
    /// of the same object twice fails.
    pub fn connect_listener<S, T>(
        &self,
        object: &T,
        listener: Listener<S::Args>,
    ) -> SignalResult<ConnectionToken>
    where
        S: Signal,
        T: NativeObject + ?Sized,
    {
        if self.is_shut_down() {
            return Err(SignalError::ShutDown);
        }
        let name = CString::new(S::NAME).map_err(|_| SignalError::InvalidSignalName(S::NAME))?;

        let core = object.core();
        let shared = core.shared();
        let listener_key = Arc::as_ptr(&listener) as *const () as usize;

        let mut closures = shared.closures();
        if shared.is_released() {
            return Err(HandleError::InvalidHandle.into());
        }
        let instance = shared.handle().as_ptr()?;

        if self.flags().contains(BridgeFlags::STRICT_CONNECTIONS)
            && closures
                .values()
                .any(|entry| entry.signal == S::NAME && entry.listener == listener_key)
        {
            return Err(SignalError::DuplicateConnection { signal: S::NAME });
        }

        let state = Arc::new(ClosureShared::<S>::new(listener, self.inner()));
        let user_data = Box::into_raw(Box::new(Arc::clone(&state))) as *mut c_void;

        let handler_id = unsafe {
            shared.handle().api().signal_connect(
                instance,
                name.as_ptr(),
                Some(c_callback::<S>),
                user_data,
                Some(c_free::<S>),
            )
        };
        if handler_id == 0 {
            // A refused connection leaves the user data with us.
            unsafe { c_free::<S>(user_data) };
            return Err(SignalError::ConnectFailed { signal: S::NAME });
        }
        log::trace!("connected `{}` handler {} on {:p}", S::NAME, handler_id, instance);

        closures.insert(
            handler_id,
            ClosureEntry {
                signal: S::NAME,
                listener: listener_key,
                state: Arc::clone(&state) as Arc<dyn ClosureState>,
            },
        );
        // Added under the table lock, so finalization can't run in between and miss the edge.
        core.bridge_inner()
            .refs
            .add(shared.id(), state as Arc<AnyWrapper>);
        drop(closures);

        Ok(ConnectionToken {
            handler_id,
            signal: S::NAME,
            object: shared.id(),
            shared: Arc::downgrade(shared),
        })
    }

    /// Removes a connection. Returns `false`, without complaint, if it was already gone.
    ///
    /// An emission that is already running on another thread may still invoke the listener
    /// once; nothing is invoked after that.
    pub fn disconnect(&self, token: &ConnectionToken) -> bool {
        let Some(shared) = token.shared.upgrade() else {
            log::trace!("disconnect of `{}`: object is gone", token.signal);
            return false;
        };

        let mut closures = shared.closures();
        let Some(entry) = closures.remove(&token.handler_id) else {
            log::trace!("disconnect of `{}`: not connected", token.signal);
            return false;
        };
        entry.state.deactivate();
        if let Ok(instance) = shared.handle().as_ptr() {
            log::trace!("disconnecting `{}` handler {}", entry.signal, token.handler_id);
            unsafe {
                shared
                    .handle()
                    .api()
                    .signal_disconnect(instance, token.handler_id)
            };
        }
        drop(closures);

        self.inner().refs.remove(shared.id(), entry.key());
        true
    }
}
