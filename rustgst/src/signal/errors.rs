use std::result;

use thiserror::Error;

use crate::handle::HandleError;
use crate::object::ObjectError;

/// The error type for signal connections and argument marshaling.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum SignalError {
    #[error("The listener is already connected to `{signal}` on this object")]
    DuplicateConnection { signal: &'static str },
    #[error("Signal names can't contain nul bytes: {0:?}")]
    InvalidSignalName(&'static str),
    #[error("The native library refused to connect `{signal}`")]
    ConnectFailed { signal: &'static str },
    #[error("The bridge has been shut down")]
    ShutDown,
    #[error("`{signal}` was emitted with {given} argument(s), at least {expected} needed")]
    MissingArgument {
        signal: &'static str,
        expected: usize,
        given: usize,
    },
    #[error("Argument {index} isn't of type {expected}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
    },
    #[error("Unknown native value type {0}")]
    UnknownValueType(i32),
    #[error("Couldn't marshal signal arguments: {0}")]
    Marshal(String),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Handle(#[from] HandleError),
}

/// A specialized `Result` type for signals.
pub type SignalResult<T> = result::Result<T, SignalError>;
