use alloc::rc::Rc;
use core::any;

use log::debug;

use crate::Registry;

/// A guard that reclaims every allocation in a [`Registry`] when it is dropped.
///
/// Each [`Tracked`][`crate::Tracked`] type keeps one of these in thread-local storage, so the
/// type's registry is torn down when the thread exits. A hook can also be held in a scope to tear
/// down an explicit registry at a well-defined point.
pub struct ShutdownHook<T> {
    registry: Rc<Registry<T>>,
}

impl<T> ShutdownHook<T> {
    /// Arms a hook for the registry.
    ///
    /// SAFETY: Once the hook is dropped, no handle into the registry may be dereferenced, indexed,
    /// or iterated. See [`Registry::shutdown`].
    pub unsafe fn arm(registry: Rc<Registry<T>>) -> Self {
        debug!("armed shutdown hook for {}", any::type_name::<T>());
        Self { registry }
    }

    /// Returns the registry the hook tears down.
    pub fn registry(&self) -> &Rc<Registry<T>> {
        &self.registry
    }
}

impl<T> Drop for ShutdownHook<T> {
    fn drop(&mut self) {
        unsafe { self.registry.shutdown() };
    }
}
