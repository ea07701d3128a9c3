use std::result;

use thiserror::Error;

/// The error type for `NativeHandle` operations.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum HandleError {
    #[error("The native handle has been disposed")]
    InvalidHandle,
    #[error("The native pointer is null")]
    NullPointer,
}

/// A specialized `Result` type for `NativeHandle` operations.
pub type HandleResult<T> = result::Result<T, HandleError>;
