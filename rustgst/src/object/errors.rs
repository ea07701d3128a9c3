use std::result;

use thiserror::Error;

use crate::handle::{HandleError, ResourceKind};

/// The error type for wrapper construction and lookup.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ObjectError {
    #[error(
        "Contradictory ownership for a {kind:?} resource (needs_ref: {needs_ref}, owns_handle: {owns_handle})"
    )]
    InvalidOwnership {
        needs_ref: bool,
        owns_handle: bool,
        kind: ResourceKind,
    },
    #[error("The wrapper for {address:#x} is a `{cached}`, not a `{requested}`")]
    WrongType {
        address: usize,
        cached: &'static str,
        requested: &'static str,
    },
    #[error("The identity cache resolved {address:#x} to a disposed wrapper")]
    StaleWrapper { address: usize },
    #[error("A wrapper for {actual:#x} can't be registered under {address:#x}")]
    AddressMismatch { address: usize, actual: usize },
    #[error("The bridge has been shut down")]
    ShutDown,
    #[error(transparent)]
    Handle(#[from] HandleError),
}

/// A specialized `Result` type for wrapper construction and lookup.
pub type ObjectResult<T> = result::Result<T, ObjectError>;
