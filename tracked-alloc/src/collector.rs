use core::any;

use log::{
    debug,
    warn,
};

use crate::{
    Registry,
    TrackedAllocation,
};

impl<T> Registry<T> {
    /// Releases every allocation that no handle refers to anymore.
    ///
    /// Returns `true` if at least one allocation was freed. Calling this when no record has a
    /// reference count of zero is a no-op that returns `false`.
    pub fn collect(&self) -> bool {
        self.sweep() > 0
    }

    /// Releases every allocation that no handle refers to anymore, returning how many were freed.
    pub(crate) fn sweep(&self) -> usize {
        let mut freed = 0;
        // Each pass restarts from the first record, because dropping a value can drop handles that
        // release, or even free, other records in this registry.
        while let Some(entry) = self.take_unreferenced() {
            unsafe { entry.deallocate() }
            freed += 1;
        }
        if freed > 0 {
            debug!(
                "collected {freed} {} allocation(s), {} remaining",
                any::type_name::<T>(),
                self.len()
            );
        }
        freed
    }

    /// Removes the first record with no references.
    ///
    /// The internal borrow ends before the caller releases the allocation.
    fn take_unreferenced(&self) -> Option<TrackedAllocation<T>> {
        let address = self
            .entries
            .borrow()
            .slots
            .iter()
            .find(|entry| entry.reference_count() == 0)?
            .address();
        self.remove(address.as_ptr())
    }

    /// Releases every allocation in the registry, whether or not handles still refer to it.
    ///
    /// Returns the number of allocations freed. Afterwards the registry is empty, unless a
    /// destructor run during the sweep created new handles.
    ///
    /// Shutdown starts a new [generation][`Registry::generation`]. Handles created before it no
    /// longer count as references, so they may be dropped, cloned, or reassigned without touching
    /// records created later, even ones at a reused address.
    ///
    /// SAFETY: No handle created before the shutdown may be dereferenced, indexed, or iterated
    /// afterwards, unless it has since been reassigned.
    pub unsafe fn shutdown(&self) -> usize {
        let generation = self.next_generation();
        if self.is_empty() {
            return 0;
        }
        let outstanding = {
            let mut entries = self.entries.borrow_mut();
            let mut outstanding = 0;
            for entry in entries.slots.iter_mut() {
                if entry.reference_count() > 0 {
                    outstanding += 1;
                    entry.clear_references();
                }
            }
            outstanding
        };
        if outstanding > 0 {
            warn!(
                "reclaiming {outstanding} {} allocation(s) still referenced at shutdown",
                any::type_name::<T>()
            );
        }
        let freed = self.sweep();
        debug!(
            "shut down {} registry, freed {freed} allocation(s), now at generation {generation}",
            any::type_name::<T>()
        );
        freed
    }
}

#[cfg(test)]
mod collector_test {
    use alloc::{
        boxed::Box,
        rc::Rc,
        vec::Vec,
    };
    use core::{
        cell::{
            Cell,
            RefCell,
        },
        ptr::NonNull,
    };

    use crate::{
        Handle,
        Registry,
        Shape,
    };

    // A shared counter for how many times a value is deallocated.
    struct DropCounter<'c>(&'c Cell<u32>);

    impl<'c> Drop for DropCounter<'c> {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn boxed<T>(value: T) -> NonNull<T> {
        NonNull::from(Box::leak(Box::new(value)))
    }

    #[test]
    fn collects_only_unreferenced_records() {
        let drop_counter = Cell::new(0);
        let registry = Registry::new();
        let a = boxed(DropCounter(&drop_counter));
        let b = boxed(DropCounter(&drop_counter));
        let c = boxed(DropCounter(&drop_counter));
        registry.track(a, Shape::Scalar);
        registry.track(b, Shape::Scalar);
        registry.track(c, Shape::Scalar);

        registry.release(a.as_ptr()).unwrap();
        registry.release(c.as_ptr()).unwrap();
        assert!(registry.collect());
        assert_eq!(drop_counter.get(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(b.as_ptr()));
    }

    #[test]
    fn collect_is_idempotent_without_garbage() {
        let registry = Registry::new();
        let a = boxed(1u8);
        registry.track(a, Shape::Scalar);
        assert!(!registry.collect());
        assert!(!registry.collect());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.reference_count(a.as_ptr()), Some(1));
    }

    #[test]
    fn collect_on_empty_registry_frees_nothing() {
        let registry = Registry::<u64>::new();
        assert!(!registry.collect());
        assert!(registry.is_empty());
    }

    #[test]
    fn releases_arrays_as_arrays() {
        let drop_counter = Cell::new(0);
        let registry = Registry::new();
        let array = Box::new([
            DropCounter(&drop_counter),
            DropCounter(&drop_counter),
            DropCounter(&drop_counter),
        ]);
        let address = NonNull::new(Box::into_raw(array).cast::<DropCounter>()).unwrap();
        registry.track(address, Shape::Array(3));
        registry.release(address.as_ptr()).unwrap();
        assert!(registry.collect());
        assert_eq!(drop_counter.get(), 3);
    }

    #[test]
    fn shutdown_frees_everything() {
        let drop_counter = Cell::new(0);
        let registry = Registry::new();
        for _ in 0..4 {
            let address = boxed(DropCounter(&drop_counter));
            registry.track(address, Shape::Scalar);
            registry.retain(address.as_ptr()).unwrap();
        }
        assert_eq!(unsafe { registry.shutdown() }, 4);
        assert!(registry.is_empty());
        assert_eq!(drop_counter.get(), 4);
        assert_eq!(unsafe { registry.shutdown() }, 0);
    }

    #[test]
    fn shutdown_starts_a_new_generation() {
        let registry = Registry::new();
        assert_eq!(registry.generation(), 0);
        assert!(!registry.collect());
        assert_eq!(registry.generation(), 0);

        let address = boxed(3u16);
        registry.track(address, Shape::Scalar);
        assert_eq!(unsafe { registry.shutdown() }, 1);
        assert_eq!(registry.generation(), 1);
        assert_eq!(unsafe { registry.shutdown() }, 0);
        assert_eq!(registry.generation(), 2);
    }

    #[test]
    fn destructors_may_release_into_the_same_registry() {
        // A value that owns a handle into its own registry.
        struct Link {
            #[allow(dead_code)]
            next: Option<Handle<Link>>,
            dropped: Rc<RefCell<Vec<u32>>>,
            id: u32,
        }

        impl Drop for Link {
            fn drop(&mut self) {
                self.dropped.borrow_mut().push(self.id);
            }
        }

        let dropped = Rc::new(RefCell::new(Vec::new()));
        let registry = Rc::new(Registry::new());
        let tail = Handle::new_in(
            Link {
                next: None,
                dropped: dropped.clone(),
                id: 2,
            },
            &registry,
        );
        let head = Handle::new_in(
            Link {
                next: Some(tail),
                dropped: dropped.clone(),
                id: 1,
            },
            &registry,
        );
        assert_eq!(registry.len(), 2);

        drop(head);
        assert_eq!(*dropped.borrow(), [1, 2]);
        assert!(registry.is_empty());
    }
}
