use std::{
    any,
    rc::Rc,
    thread::LocalKey,
};

use log::warn;

use crate::{
    Registry,
    ShutdownHook,
};

/// A type with its own registry, shared by every [`Handle`][`crate::Handle`] of the type on the
/// current thread.
///
/// The registry is created, and its [`ShutdownHook`] armed, the first time the type is used on a
/// thread. Every remaining allocation is reclaimed when the thread exits. Note that the standard
/// library does not guarantee that thread-local destructors run for the main thread on every
/// platform.
///
/// Implement this trait with [`impl_tracked!`][`crate::impl_tracked`], or derive it with
/// `tracked-alloc-derive`. Generic types cannot implement it this way, because each type needs its
/// own static storage; use explicit registries for them instead.
pub trait Tracked: Sized + 'static {
    /// Returns the type's registry for the current thread.
    fn registry() -> Rc<Registry<Self>>;
}

impl<T> ShutdownHook<T>
where
    T: 'static,
{
    /// Creates a hook over a fresh registry, for storage in a thread local.
    ///
    /// SAFETY: The hook must be stored in a thread local, and its registry only handed out through
    /// [`ShutdownHook::thread_local_registry`], so that it is dropped when the owning thread exits
    /// and not before.
    ///
    /// ```compile_fail
    /// let hook = tracked_alloc::ShutdownHook::<String>::arm_thread_local();
    /// ```
    #[doc(hidden)]
    pub unsafe fn arm_thread_local() -> Self {
        Self::arm(Rc::new(Registry::new()))
    }

    /// Returns the registry of a hook stored in a thread local.
    ///
    /// If the thread is already tearing down its thread locals, a detached registry is returned.
    #[doc(hidden)]
    pub fn thread_local_registry(key: &'static LocalKey<Self>) -> Rc<Registry<T>> {
        key.try_with(|hook| hook.registry().clone())
            .unwrap_or_else(|_| {
                warn!(
                    "{} registry requested during thread teardown, using a detached registry",
                    any::type_name::<T>()
                );
                Rc::new(Registry::new())
            })
    }
}

/// Implements [`Tracked`] for one or more concrete types.
///
/// ```
/// use tracked_alloc::{
///     impl_tracked,
///     Handle,
/// };
///
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// impl_tracked!(Point);
///
/// let a = Handle::new(Point { x: 1, y: 2 });
/// let b = a.clone();
/// assert_eq!(b.x + b.y, 3);
/// assert_eq!(Handle::<Point>::registry_size(), 1);
/// ```
#[macro_export]
macro_rules! impl_tracked {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::Tracked for $ty {
                fn registry() -> ::std::rc::Rc<$crate::Registry<Self>> {
                    ::std::thread_local! {
                        // SAFETY: The hook lives in this thread local until the thread exits.
                        static SHUTDOWN_HOOK: $crate::ShutdownHook<$ty> =
                            unsafe { $crate::ShutdownHook::arm_thread_local() };
                    }
                    $crate::ShutdownHook::thread_local_registry(&SHUTDOWN_HOOK)
                }
            }
        )*
    };
}

impl_tracked!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String,
);

#[cfg(test)]
mod tracked_test {
    use std::{
        cell::Cell,
        mem,
        rc::Rc,
        sync::atomic::{
            AtomicU32,
            Ordering,
        },
        thread,
    };

    use crate::{
        Handle,
        Tracked,
    };

    struct Counted(u32);

    impl_tracked!(Counted);

    thread_local! {
        static DROPS: Cell<u32> = const { Cell::new(0) };
    }

    struct Noisy;

    impl Drop for Noisy {
        fn drop(&mut self) {
            DROPS.with(|drops| drops.set(drops.get() + 1));
        }
    }

    // Zero-sized types cannot be tracked, so give it a body.
    #[allow(dead_code)]
    struct NoisyBox(Noisy, u8);

    impl_tracked!(NoisyBox);

    #[test]
    fn registry_is_shared_per_type() {
        assert!(Rc::ptr_eq(&Counted::registry(), &Counted::registry()));
        let a = Handle::new(Counted(1));
        let b = Handle::new(Counted(2));
        assert!(Rc::ptr_eq(a.registry(), b.registry()));
        assert_eq!(Handle::<Counted>::registry_size(), 2);
        assert_eq!(a.0 + b.0, 3);
        drop(a);
        assert_eq!(Handle::<Counted>::registry_size(), 1);
    }

    #[test]
    fn primitives_are_tracked() {
        let a = Handle::new(5i32);
        let b = a.clone();
        assert_eq!(*b, 5);
        assert_eq!(Handle::<i32>::registry_size(), 1);
        drop(a);
        drop(b);
        assert_eq!(Handle::<i32>::registry_size(), 0);

        let array = Handle::<u8, 3>::from_array([1, 2, 3]);
        assert_eq!(array.iter().sum::<u8>(), 6);
        let text = Handle::new(String::from("tracked"));
        assert_eq!(text.len(), 7);
    }

    #[test]
    fn default_handle_is_null() {
        let handle = Handle::<Counted>::default();
        assert!(handle.is_null());
        assert_eq!(Handle::<Counted>::registry_size(), 0);
        assert!(!Handle::<Counted>::collect());
    }

    #[test]
    fn type_level_shutdown_reclaims_everything() {
        let a = Handle::new(NoisyBox(Noisy, 1));
        let b = Handle::new(NoisyBox(Noisy, 2));
        let c = b.clone();
        assert_eq!(Handle::<NoisyBox>::registry_size(), 2);
        assert_eq!(unsafe { Handle::<NoisyBox>::shutdown() }, 2);
        assert_eq!(Handle::<NoisyBox>::registry_size(), 0);
        assert_eq!(DROPS.with(Cell::get), 2);
        drop(a);
        drop(b);
        drop(c);
        assert_eq!(DROPS.with(Cell::get), 2);
    }

    #[test]
    fn thread_exit_reclaims_outstanding_allocations() {
        static EXIT_DROPS: AtomicU32 = AtomicU32::new(0);

        struct Leaked(#[allow(dead_code)] u64);

        impl Drop for Leaked {
            fn drop(&mut self) {
                EXIT_DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        impl_tracked!(Leaked);

        thread::spawn(|| {
            let handle = Handle::new(Leaked(1));
            mem::forget(handle.clone());
            assert_eq!(handle.reference_count(), 2);
        })
        .join()
        .unwrap();
        assert_eq!(EXIT_DROPS.load(Ordering::SeqCst), 1);
    }
}
