//! A safe lifetime bridge between a native, reference-counted object model and Rust
//!
//! The primary goal is safety: safe Rust code must not be able to trigger a use-after-free or
//! double release of a native resource, and no native resource may be leaked permanently.
//!
//! The pieces, leaves first:
//!
//! - [`handle::NativeHandle`] owns one native address and releases it at most once.
//! - [`ownership::Ownership`] decides at construction time whether a reference is taken.
//! - [`cache::IdentityCache`] guarantees one live wrapper per native address.
//! - [`keepalive::ReferenceManager`] keeps wrappers alive that other wrappers depend on.
//! - [`signal`] connects typed listeners to native signals.
//! - [`object::ObjectCore`] ties them together and is the finalization trigger.
//! - [`bridge::Bridge`] is the registry everything is created through.
//!
//! ## Feature Flags
//!
//! - **`native-functions`** - Links the native bridge library and enables [`api::API::get`].
//! - **`proc-macro`** - Re-exports `#[derive(NativeObject)]`.
pub extern crate rustgst_sys;
pub use rustgst_sys as ffi;

#[cfg(feature = "proc-macro")]
extern crate rustgst_derive;
#[cfg(feature = "proc-macro")]
pub use rustgst_derive::*;

pub mod api;
pub mod bridge;
pub mod cache;
pub mod dispatch;
pub mod handle;
pub mod keepalive;
pub mod log;
pub mod object;
pub mod ownership;
pub mod signal;

#[cfg(test)]
mod mock;

pub mod prelude {
    //! The rustgst prelude.
    //!
    //! Contains the types you most likely want to import anyway.
    pub use super::{
        api::API,
        bridge::{Bridge, BridgeFlags},
        handle::{NativeHandle, ResourceKind},
        object::{NativeObject, Object, ObjectCore},
        ownership::Ownership,
        signal::{ConnectionToken, Signal},
    };
}

pub use ffi::version as MakeVersion;
