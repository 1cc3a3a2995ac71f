use alloc::{
    boxed::Box,
    rc::Rc,
};
use core::{
    fmt::Debug,
    mem,
    ops::{
        Deref,
        Index,
    },
    ptr::{
        self,
        NonNull,
    },
};

use log::warn;

#[cfg(feature = "std")]
use crate::Tracked;
use crate::{
    RangeIter,
    Registry,
    RegistryError,
    Shape,
};

/// A reference-counted handle to a heap allocation tracked by a [`Registry`].
///
/// `N` is the static array length of the allocation. A length of zero (the default) means the
/// handle refers to a single value.
///
/// Cloning a handle adds a reference to its allocation, and dropping a handle removes one and runs
/// the registry's collector, which frees every allocation whose reference count reached zero.
/// Handles may also be reassigned to another allocation with [`Handle::assign`] or
/// [`Handle::assign_raw`]. Reassignment does not collect the allocation it leaves behind; that
/// happens on the next drop or explicit collection, unless the `eager-collect` feature is enabled.
///
/// Handles only give shared access to their value. Use [`Cell`][`core::cell::Cell`] or
/// [`RefCell`][`core::cell::RefCell`] for mutation.
///
/// Reference cycles between handles are never collected.
pub struct Handle<T, const N: usize = 0> {
    address: Option<NonNull<T>>,
    registry: Rc<Registry<T>>,
    // The registry generation `address` was tracked in.
    generation: usize,
}

impl<T, const N: usize> Handle<T, N> {
    const SHAPE: Shape = Shape::of_length(N);

    // Records are identified by address, which zero-sized values do not have.
    const ADDRESSABLE: () = assert!(
        mem::size_of::<T>() != 0,
        "zero-sized types cannot be tracked by address"
    );

    const NON_EMPTY_ARRAY: () = assert!(N > 0, "array handles must have a non-zero length");

    /// Creates a handle that refers to nothing.
    pub fn null_in(registry: &Rc<Registry<T>>) -> Self {
        Self {
            address: None,
            registry: registry.clone(),
            generation: registry.generation(),
        }
    }

    /// Creates a handle that takes shared ownership of a raw allocation.
    ///
    /// If the address is already tracked by the registry, the handle adds a reference to the
    /// existing record. A null address creates a null handle.
    ///
    /// SAFETY: A non-null `address` must come from [`Box::into_raw`] on a `Box<T>` if `N` is zero,
    /// or on a `Box<[T; N]>` (or a `Box<[T]>` of length `N`) cast to `*mut T` otherwise. Ownership
    /// of the allocation passes to the registry.
    pub unsafe fn from_raw_in(address: *mut T, registry: &Rc<Registry<T>>) -> Self {
        let () = Self::ADDRESSABLE;
        let address = NonNull::new(address);
        if let Some(address) = address {
            registry.track(address, Self::SHAPE);
        }
        Self {
            address,
            registry: registry.clone(),
            generation: registry.generation(),
        }
    }

    /// Moves an array to the heap and creates a handle to it.
    pub fn from_array_in(array: [T; N], registry: &Rc<Registry<T>>) -> Self {
        Self::from_boxed_array_in(Box::new(array), registry)
    }

    /// Creates a handle that takes ownership of a boxed array.
    pub fn from_boxed_array_in(array: Box<[T; N]>, registry: &Rc<Registry<T>>) -> Self {
        let () = Self::NON_EMPTY_ARRAY;
        unsafe { Self::from_raw_in(Box::into_raw(array).cast::<T>(), registry) }
    }

    /// Creates a handle that takes ownership of a boxed slice of exactly `N` elements.
    pub fn try_from_boxed_slice_in(
        slice: Box<[T]>,
        registry: &Rc<Registry<T>>,
    ) -> Result<Self, RegistryError> {
        let () = Self::NON_EMPTY_ARRAY;
        if slice.len() != N {
            return Err(RegistryError::LengthMismatch {
                expected: N,
                found: slice.len(),
            });
        }
        Ok(unsafe { Self::from_raw_in(Box::into_raw(slice).cast::<T>(), registry) })
    }

    /// Returns the registry that tracks this handle's allocation.
    pub fn registry(&self) -> &Rc<Registry<T>> {
        &self.registry
    }

    /// Checks if the handle refers to nothing.
    pub fn is_null(&self) -> bool {
        self.address.is_none()
    }

    /// Checks if the handle refers to an array.
    pub const fn is_array(&self) -> bool {
        Self::SHAPE.is_array()
    }

    /// Returns the static array length of the handle, or zero for a single value.
    pub const fn array_length(&self) -> usize {
        N
    }

    /// Returns the raw address of the allocation, or null.
    pub fn as_ptr(&self) -> *const T {
        self.address
            .map_or(ptr::null(), |address| address.as_ptr().cast_const())
    }

    /// Checks if two handles refer to the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.address == other.address
    }

    /// Returns the number of handles that refer to this handle's allocation, or zero for a null
    /// handle.
    pub fn reference_count(&self) -> usize {
        self.tracked_address()
            .and_then(|address| self.registry.reference_count(address.as_ptr()))
            .unwrap_or(0)
    }

    /// Returns the address of the allocation if it still counts as a reference in the registry.
    ///
    /// Handles created before a [`Registry::shutdown`] refer to no record.
    fn tracked_address(&self) -> Option<NonNull<T>> {
        self.address.filter(|_| self.generation == self.registry.generation())
    }

    /// Returns a reference to the value, or [`None`] for a null handle.
    ///
    /// For arrays, this is the first element.
    pub fn get(&self) -> Option<&T> {
        self.address.map(|address| unsafe { address.as_ref() })
    }

    /// Returns an iterator positioned at the first element of the allocation.
    ///
    /// Single values and null handles produce an empty range.
    pub fn begin(&self) -> RangeIter<'_, T> {
        let (begin, end) = self.bounds();
        unsafe { RangeIter::new(begin, begin, end) }
    }

    /// Returns an iterator positioned one past the last element of the allocation.
    pub fn end(&self) -> RangeIter<'_, T> {
        let (begin, end) = self.bounds();
        unsafe { RangeIter::new(end, begin, end) }
    }

    /// Returns an iterator over the elements of the allocation.
    pub fn iter(&self) -> RangeIter<'_, T> {
        self.begin()
    }

    fn bounds(&self) -> (*const T, *const T) {
        match self.address {
            Some(address) => {
                let begin = address.as_ptr().cast_const();
                (begin, unsafe { begin.add(N) })
            }
            None => (ptr::null(), ptr::null()),
        }
    }

    /// Points the handle at a raw allocation, returning that address.
    ///
    /// The previous allocation loses a reference. The new address gains one, and is registered
    /// with the handle's shape if it is not tracked yet.
    ///
    /// Panics if the handle's current allocation is not tracked by its registry. A handle left over
    /// from a [`Registry::shutdown`] gives up nothing and becomes a live handle again.
    ///
    /// SAFETY: The same requirements as [`Handle::from_raw_in`].
    pub unsafe fn assign_raw(&mut self, address: *mut T) -> *mut T {
        let () = Self::ADDRESSABLE;
        self.release_current();
        self.address = NonNull::new(address);
        self.generation = self.registry.generation();
        if let Some(address) = self.address {
            self.registry.track(address, Self::SHAPE);
        }
        self.collect_after_assignment();
        address
    }

    /// Points the handle at the allocation of another handle from the same registry.
    ///
    /// Panics if the handles belong to different registries, or if either allocation is not
    /// tracked.
    pub fn assign(&mut self, other: &Self) -> &mut Self {
        assert!(
            Rc::ptr_eq(&self.registry, &other.registry),
            "cannot assign a handle from a different registry"
        );
        self.release_current();
        if let Some(address) = other.tracked_address() {
            self.registry
                .retain(address.as_ptr())
                .unwrap_or_else(|err| panic!("cannot assign handle: {err}"));
        }
        self.address = other.address;
        self.generation = other.generation;
        self.collect_after_assignment();
        self
    }

    fn release_current(&self) {
        if let Some(address) = self.tracked_address() {
            self.registry
                .release(address.as_ptr())
                .unwrap_or_else(|err| panic!("cannot reassign handle: {err}"));
        }
    }

    #[inline]
    fn collect_after_assignment(&self) {
        #[cfg(feature = "eager-collect")]
        self.registry.collect();
    }
}

impl<T> Handle<T> {
    /// Moves a value to the heap and creates a handle to it.
    pub fn new_in(value: T, registry: &Rc<Registry<T>>) -> Self {
        unsafe { Self::from_raw_in(Box::into_raw(Box::new(value)), registry) }
    }
}

#[cfg(feature = "std")]
impl<T> Handle<T>
where
    T: Tracked,
{
    /// Moves a value to the heap and creates a handle to it in the type's registry.
    pub fn new(value: T) -> Self {
        Self::new_in(value, &T::registry())
    }
}

#[cfg(feature = "std")]
impl<T, const N: usize> Handle<T, N>
where
    T: Tracked,
{
    /// Creates a handle in the type's registry that refers to nothing.
    pub fn null() -> Self {
        Self::null_in(&T::registry())
    }

    /// Creates a handle in the type's registry that takes shared ownership of a raw allocation.
    ///
    /// SAFETY: The same requirements as [`Handle::from_raw_in`].
    pub unsafe fn from_raw(address: *mut T) -> Self {
        Self::from_raw_in(address, &T::registry())
    }

    /// Moves an array to the heap and creates a handle to it in the type's registry.
    pub fn from_array(array: [T; N]) -> Self {
        Self::from_array_in(array, &T::registry())
    }

    /// Creates a handle in the type's registry that takes ownership of a boxed array.
    pub fn from_boxed_array(array: Box<[T; N]>) -> Self {
        Self::from_boxed_array_in(array, &T::registry())
    }

    /// Creates a handle in the type's registry that takes ownership of a boxed slice of exactly
    /// `N` elements.
    pub fn try_from_boxed_slice(slice: Box<[T]>) -> Result<Self, RegistryError> {
        Self::try_from_boxed_slice_in(slice, &T::registry())
    }

    /// Runs the collector on the type's registry.
    ///
    /// Returns `true` if at least one allocation was freed.
    pub fn collect() -> bool {
        T::registry().collect()
    }

    /// Returns the number of allocations tracked in the type's registry.
    pub fn registry_size() -> usize {
        T::registry().len()
    }

    /// Frees every allocation in the type's registry.
    ///
    /// SAFETY: The same requirements as [`Registry::shutdown`].
    pub unsafe fn shutdown() -> usize {
        T::registry().shutdown()
    }
}

#[cfg(feature = "std")]
impl<T, const N: usize> Default for Handle<T, N>
where
    T: Tracked,
{
    fn default() -> Self {
        Self::null()
    }
}

impl<T, const N: usize> Clone for Handle<T, N> {
    /// Creates another handle to the same allocation.
    ///
    /// Panics if the allocation is not tracked by the handle's registry. Cloning a handle left over
    /// from a [`Registry::shutdown`] gives another such handle, which counts as no reference.
    fn clone(&self) -> Self {
        if let Some(address) = self.tracked_address() {
            self.registry
                .retain(address.as_ptr())
                .unwrap_or_else(|err| panic!("cannot copy handle: {err}"));
        }
        Self {
            address: self.address,
            registry: self.registry.clone(),
            generation: self.generation,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if Rc::ptr_eq(&self.registry, &source.registry) {
            self.assign(source);
        } else {
            *self = source.clone();
        }
    }
}

impl<T, const N: usize> Drop for Handle<T, N> {
    fn drop(&mut self) {
        if let Some(address) = self.tracked_address() {
            if let Err(err) = self.registry.release(address.as_ptr()) {
                warn!("dropped a handle with no record: {err}");
            }
        }
        self.registry.collect();
    }
}

impl<T, const N: usize> Deref for Handle<T, N> {
    type Target = T;

    /// Panics if the handle is null.
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced a null handle"),
        }
    }
}

impl<T, const N: usize> Index<usize> for Handle<T, N> {
    type Output = T;

    /// Panics if the handle is null or the index is out of bounds. A handle to a single value has
    /// one element.
    fn index(&self, index: usize) -> &Self::Output {
        let length = if N == 0 { 1 } else { N };
        assert!(
            index < length,
            "index {index} is out of bounds for a handle of length {length}"
        );
        match self.address {
            Some(address) => unsafe { &*address.as_ptr().add(index) },
            None => panic!("indexed a null handle"),
        }
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a Handle<T, N> {
    type Item = &'a T;
    type IntoIter = RangeIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.begin()
    }
}

impl<T, const N: usize> Debug for Handle<T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Handle")
            .field("address", &self.as_ptr())
            .field("array_length", &N)
            .field("generation", &self.generation)
            .field("reference_count", &self.reference_count())
            .finish()
    }
}
