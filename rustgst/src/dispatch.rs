//! Moving listener invocations off the emitting thread.
//!
//! Native code emits signals from its own threads. [`dispatch_to`] wraps a listener so every
//! invocation is posted to an [`Executor`] instead, and [`Bridge::connect_channel`] turns a
//! signal into an async stream.

use std::sync::Arc;

use futures::channel::mpsc;

use crate::bridge::Bridge;
use crate::object::NativeObject;
use crate::signal::{ConnectionToken, Signal, SignalResult};

/// Runs tasks somewhere else, e.g. on a UI thread or an async runtime.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

impl<F> Executor for F
where
    F: Fn(Box<dyn FnOnce() + Send>) + Send + Sync + 'static,
{
    #[inline]
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        self(task)
    }
}

/// Wraps `listener` so it runs on `executor` rather than on the emitting thread.
pub fn dispatch_to<A, E, F>(executor: E, listener: F) -> impl Fn(A) + Send + Sync + 'static
where
    A: Send + 'static,
    E: Executor,
    F: Fn(A) + Send + Sync + 'static,
{
    let listener = Arc::new(listener);
    move |args: A| {
        let listener = Arc::clone(&listener);
        executor.execute(Box::new(move || listener(args)));
    }
}

impl Bridge {
    /// Connects signal `S` of `object` to a channel and returns its receiving end.
    ///
    /// Emissions are queued without blocking the emitting thread. The stream ends once the
    /// connection is gone, be it through [`disconnect`](Self::disconnect) or because the object
    /// was finalized.
    pub fn connect_channel<S, T>(
        &self,
        object: &T,
    ) -> SignalResult<(ConnectionToken, mpsc::UnboundedReceiver<S::Args>)>
    where
        S: Signal,
        T: NativeObject + ?Sized,
    {
        let (sender, receiver) = mpsc::unbounded();
        let token = self.connect::<S, T, _>(object, move |args| {
            // The receiver went away; the connection stays until disconnected.
            let _ = sender.unbounded_send(args);
        })?;
        Ok((token, receiver))
    }
}
