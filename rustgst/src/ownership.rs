//! The ownership-transfer protocol.
//!
//! Every wrapper construction states whether the bridge has to take a native reference first
//! (`needs_ref`) and whether the resulting handle is responsible for releasing the resource
//! (`owns_handle`):
//!
//! | needs_ref | owns_handle | meaning                                                    |
//! |-----------|-------------|------------------------------------------------------------|
//! | true      | true        | borrowed pointer, turned into an owned one with a ref      |
//! | false     | true        | the native call already handed a reference over            |
//! | false     | false       | governed by a parent; never released through this handle   |
//! | true      | false       | rejected: the reference taken would never be released      |
//!
//! Single-owner resources have no native ref at all, so `needs_ref` is rejected for them too.

use std::ffi::c_void;

use crate::api::API;
use crate::handle::{HandleError, NativeHandle, ResourceKind};
use crate::object::{ObjectError, ObjectResult};

/// How a new wrapper relates to the native reference it is built from.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Ownership {
    needs_ref: bool,
    owns_handle: bool,
}

impl Ownership {
    #[inline]
    pub const fn new(needs_ref: bool, owns_handle: bool) -> Self {
        Self {
            needs_ref,
            owns_handle,
        }
    }

    /// A borrowed pointer ("transfer none") the wrapper takes its own reference on.
    #[inline]
    pub const fn take_ref() -> Self {
        Self::new(true, true)
    }

    /// A reference the native side handed over ("transfer full").
    #[inline]
    pub const fn transfer_full() -> Self {
        Self::new(false, true)
    }

    /// Memory governed by someone else, typically a parent object.
    #[inline]
    pub const fn borrowed() -> Self {
        Self::new(false, false)
    }

    #[inline]
    pub const fn needs_ref(&self) -> bool {
        self.needs_ref
    }

    #[inline]
    pub const fn owns_handle(&self) -> bool {
        self.owns_handle
    }

    /// Rejects the combinations that can't be honoured for `kind`.
    pub fn validate(&self, kind: ResourceKind) -> ObjectResult<()> {
        let contradictory = match kind {
            ResourceKind::RefCounted => self.needs_ref && !self.owns_handle,
            ResourceKind::SingleOwner => self.needs_ref,
        };
        if contradictory {
            Err(ObjectError::InvalidOwnership {
                needs_ref: self.needs_ref,
                owns_handle: self.owns_handle,
                kind,
            })
        } else {
            Ok(())
        }
    }

    /// Builds the handle for a freshly seen address, taking the native reference if asked to.
    ///
    /// Floating references are always sunk when the handle ends up owning the object, so a
    /// later sink by native code can't steal the reference this handle will release.
    pub(crate) fn acquire(
        &self,
        api: API,
        ptr: *mut c_void,
        kind: ResourceKind,
    ) -> ObjectResult<NativeHandle> {
        if ptr.is_null() {
            return Err(HandleError::NullPointer.into());
        }
        self.validate(kind)?;

        if kind == ResourceKind::RefCounted && self.owns_handle {
            unsafe {
                if api.is_floating(ptr) {
                    log::trace!("sinking floating reference of {:p}", ptr);
                    api.ref_sink_object(ptr);
                } else if self.needs_ref {
                    log::trace!("taking reference on {:p}", ptr);
                    api.ref_object(ptr);
                }
            }
        }

        Ok(NativeHandle::new(api, ptr, kind, self.owns_handle)?)
    }

    /// Called when `ptr` already has a wrapper: the existing ownership wins, so a reference
    /// that was handed over for the new construction is surplus and gets dropped again.
    pub(crate) fn discard(&self, api: API, ptr: *mut c_void, kind: ResourceKind) {
        if self.needs_ref || !self.owns_handle {
            return;
        }
        match kind {
            ResourceKind::RefCounted => {
                log::trace!("dropping surplus reference on {:p}", ptr);
                unsafe { api.unref_object(ptr) };
            }
            ResourceKind::SingleOwner => {
                log::warn!(
                    "ownership of single-owner resource {:p} handed over while it already has an owner",
                    ptr
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;

    #[test]
    fn test_valid_combinations() {
        for kind in [ResourceKind::RefCounted, ResourceKind::SingleOwner] {
            assert!(Ownership::transfer_full().validate(kind).is_ok());
            assert!(Ownership::borrowed().validate(kind).is_ok());
        }
        assert!(Ownership::take_ref()
            .validate(ResourceKind::RefCounted)
            .is_ok());
    }

    #[test]
    fn test_ref_without_ownership_is_rejected() {
        let err = Ownership::new(true, false)
            .validate(ResourceKind::RefCounted)
            .unwrap_err();
        assert_eq!(
            err,
            ObjectError::InvalidOwnership {
                needs_ref: true,
                owns_handle: false,
                kind: ResourceKind::RefCounted,
            }
        );
    }

    #[test]
    fn test_ref_on_single_owner_is_rejected() {
        let ptr = mock::new_resource("GstStructure");
        let err = Ownership::take_ref()
            .acquire(mock::api(), ptr, ResourceKind::SingleOwner)
            .unwrap_err();
        assert!(matches!(err, ObjectError::InvalidOwnership { .. }));
        assert_eq!(mock::ref_calls(ptr), 0);
    }

    #[test]
    fn test_needs_ref_issues_exactly_one_extra_ref() {
        let with_ref = mock::new_object("GstElement");
        let without_ref = mock::new_object("GstElement");

        let a = Ownership::take_ref()
            .acquire(mock::api(), with_ref, ResourceKind::RefCounted)
            .unwrap();
        let b = Ownership::transfer_full()
            .acquire(mock::api(), without_ref, ResourceKind::RefCounted)
            .unwrap();

        assert_eq!(mock::ref_calls(with_ref), mock::ref_calls(without_ref) + 1);
        assert_eq!(mock::ref_count(with_ref), 2);
        assert_eq!(mock::ref_count(without_ref), 1);

        drop(a);
        drop(b);
        assert_eq!(mock::ref_count(with_ref), 1);
        assert!(!mock::is_alive(without_ref));
    }

    #[test]
    fn test_floating_reference_is_sunk() {
        let ptr = mock::new_floating_object("GstElement");
        let handle = Ownership::take_ref()
            .acquire(mock::api(), ptr, ResourceKind::RefCounted)
            .unwrap();

        assert!(!mock::is_floating(ptr));
        assert_eq!(mock::ref_count(ptr), 1);

        drop(handle);
        assert!(!mock::is_alive(ptr));
        assert_eq!(mock::violations(ptr), 0);
    }

    #[test]
    fn test_null_pointer_takes_no_ref() {
        let err = Ownership::take_ref()
            .acquire(mock::api(), std::ptr::null_mut(), ResourceKind::RefCounted)
            .unwrap_err();
        assert_eq!(err, ObjectError::Handle(HandleError::NullPointer));
    }

    #[test]
    fn test_discard_drops_surplus_reference() {
        let ptr = mock::new_object("GstPad");
        unsafe { mock::api().ref_object(ptr) };
        assert_eq!(mock::ref_count(ptr), 2);

        Ownership::transfer_full().discard(mock::api(), ptr, ResourceKind::RefCounted);
        assert_eq!(mock::ref_count(ptr), 1);

        Ownership::take_ref().discard(mock::api(), ptr, ResourceKind::RefCounted);
        Ownership::borrowed().discard(mock::api(), ptr, ResourceKind::RefCounted);
        assert_eq!(mock::ref_count(ptr), 1);
    }
}
