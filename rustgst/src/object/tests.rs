#[cfg(test)]
mod tests {
    use std::ffi::c_void;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crate::bridge::{Bridge, BridgeFlags};
    use crate::handle::{HandleError, NativeHandle, ResourceKind};
    use crate::mock;
    use crate::object::{NativeObject, Object, ObjectCore};
    use crate::ownership::Ownership;

    fn setup_bridge() -> Bridge {
        Bridge::new(mock::api(), BridgeFlags::NONE)
    }

    fn owned(bridge: &Bridge, ptr: *mut c_void) -> Arc<Object> {
        bridge
            .object_for(ptr, ResourceKind::RefCounted, Ownership::transfer_full(), Object::new)
            .unwrap()
    }

    fn child_handle(ptr: *mut c_void) -> NativeHandle {
        NativeHandle::new(mock::api(), ptr, ResourceKind::SingleOwner, true).unwrap()
    }

    #[test]
    fn test_drop_releases_exactly_once() {
        let bridge = setup_bridge();
        let ptr = mock::new_object("GstElement");
        let wrapper = owned(&bridge, ptr);
        assert_eq!(wrapper.native_ref_count(), Some(1));

        drop(wrapper);

        let mut released = false;
        for _ in 0..100 {
            if !mock::is_alive(ptr) {
                released = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(released);
        assert_eq!(mock::unref_calls(ptr), 1);
        assert_eq!(mock::violations(ptr), 0);
        assert!(!bridge.cache().contains(ptr as usize));
    }

    #[test]
    fn test_explicit_dispose_is_idempotent() {
        let bridge = setup_bridge();
        let ptr = mock::new_object("GstPipeline");
        let wrapper = owned(&bridge, ptr);

        wrapper.dispose();
        assert!(!wrapper.is_valid());
        assert_eq!(wrapper.address().unwrap_err(), HandleError::InvalidHandle);
        assert!(!bridge.cache().contains(ptr as usize));

        wrapper.dispose();
        drop(wrapper);
        assert_eq!(mock::unref_calls(ptr), 1);
        assert_eq!(mock::violations(ptr), 0);
    }

    #[test]
    fn test_invalidate_never_releases() {
        let bridge = setup_bridge();
        let ptr = mock::new_object("GstElement");
        let wrapper = owned(&bridge, ptr);

        // The native object went away on its own.
        mock::native_unref(ptr);
        wrapper.invalidate();

        assert!(!wrapper.is_valid());
        assert!(bridge.lookup::<Object>(ptr).is_none());
        drop(wrapper);
        assert_eq!(mock::unref_calls(ptr), 1);
        assert_eq!(mock::violations(ptr), 0);
    }

    #[test]
    fn test_disowned_wrapper_releases_nothing() {
        let bridge = setup_bridge();
        let ptr = mock::new_object("GstBuffer");
        let wrapper = owned(&bridge, ptr);

        // e.g. the buffer was pushed and the native call took our reference.
        wrapper.disown().unwrap();
        wrapper.disown().unwrap();
        assert!(wrapper.is_valid());
        drop(wrapper);

        assert_eq!(mock::unref_calls(ptr), 0);
        assert!(mock::is_alive(ptr));
    }

    #[test]
    fn test_children_are_disposed_before_parent() {
        let bridge = setup_bridge();
        let parent = mock::new_object("GstBufferList");
        let first = mock::new_resource("GstMapInfo");
        let second = mock::new_resource("GstMapInfo");

        let wrapper = owned(&bridge, parent);
        wrapper.core().adopt_child(child_handle(first));
        wrapper.core().adopt_child(child_handle(second));
        assert_eq!(wrapper.core().child_count(), 2);

        drop(wrapper);

        let parent_at = mock::released_at(parent).unwrap();
        assert!(mock::released_at(first).unwrap() < parent_at);
        assert!(mock::released_at(second).unwrap() < parent_at);
        assert_eq!(mock::free_calls(first), 1);
        assert_eq!(mock::free_calls(second), 1);
    }

    #[test]
    fn test_child_adopted_after_dispose_is_disposed() {
        let bridge = setup_bridge();
        let parent = mock::new_object("GstBufferList");
        let child = mock::new_resource("GstMapInfo");

        let wrapper = owned(&bridge, parent);
        wrapper.dispose();
        wrapper.core().adopt_child(child_handle(child));

        assert_eq!(mock::free_calls(child), 1);
        assert_eq!(wrapper.core().child_count(), 0);
    }

    #[test]
    fn test_invalidate_disowns_children() {
        let bridge = setup_bridge();
        let parent = mock::new_object("GstBufferList");
        let child = mock::new_resource("GstMapInfo");

        let wrapper = owned(&bridge, parent);
        wrapper.core().adopt_child(child_handle(child));
        wrapper.invalidate();

        assert_eq!(mock::free_calls(child), 0);
        assert_eq!(mock::unref_calls(parent), 0);
    }

    #[test]
    fn test_native_introspection() {
        let bridge = setup_bridge();
        let ptr = mock::new_object("GstQueue");
        let wrapper = bridge
            .object_for(ptr, ResourceKind::RefCounted, Ownership::take_ref(), Object::new)
            .unwrap();

        assert_eq!(wrapper.native_type_name().as_deref(), Some("GstQueue"));
        assert_eq!(wrapper.native_ref_count(), Some(2));
        assert_eq!(wrapper.address().unwrap().as_ptr(), ptr);
        assert_eq!(wrapper.core().bridge().cached_wrappers(), 1);

        wrapper.dispose();
        assert_eq!(wrapper.native_type_name(), None);
        assert_eq!(wrapper.native_ref_count(), None);
    }

    #[test]
    fn test_wrapper_ids_are_unique() {
        let bridge = setup_bridge();
        let a = owned(&bridge, mock::new_object("GstElement"));
        let b = owned(&bridge, mock::new_object("GstElement"));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.core().id());
    }

    #[derive(rustgst_derive::NativeObject)]
    #[native(crate_path = "crate")]
    struct Pipeline {
        core: ObjectCore,
        name: &'static str,
    }

    #[derive(rustgst_derive::NativeObject)]
    #[native(crate_path = "crate")]
    struct Pad(u32, #[native(core)] ObjectCore);

    #[test]
    fn test_derived_wrappers() {
        let bridge = setup_bridge();
        let pipeline_ptr = mock::new_object("GstPipeline");
        let pad_ptr = mock::new_object("GstPad");

        let pipeline = bridge
            .object_for(
                pipeline_ptr,
                ResourceKind::RefCounted,
                Ownership::transfer_full(),
                |core| Pipeline {
                    core,
                    name: "pipeline0",
                },
            )
            .unwrap();
        let pad = bridge
            .object_for(pad_ptr, ResourceKind::RefCounted, Ownership::transfer_full(), |core| {
                Pad(0, core)
            })
            .unwrap();

        assert_eq!(pipeline.name, "pipeline0");
        assert_eq!(pipeline.as_ptr().unwrap(), pipeline_ptr);
        assert_eq!(pad.0, 0);
        assert_eq!(pad.as_ptr().unwrap(), pad_ptr);

        drop(pipeline);
        drop(pad);
        assert!(!mock::is_alive(pipeline_ptr));
        assert!(!mock::is_alive(pad_ptr));
    }
}
