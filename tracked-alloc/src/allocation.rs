use alloc::boxed::Box;
use core::{
    fmt::Debug,
    ptr::{
        self,
        NonNull,
    },
};

use log::trace;

/// The shape of a tracked allocation, which determines how it is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A single value allocated with [`Box<T>`].
    Scalar,
    /// A contiguous array of the given number of values, allocated with [`Box<[T]>`].
    Array(usize),
}

impl Shape {
    /// Returns the shape of an allocation with `length` array elements.
    ///
    /// A length of zero describes a single value.
    pub const fn of_length(length: usize) -> Self {
        if length == 0 {
            Self::Scalar
        } else {
            Self::Array(length)
        }
    }

    /// Checks if the allocation is an array.
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Returns the number of array elements, or zero for a single value.
    pub const fn array_length(&self) -> usize {
        match self {
            Self::Scalar => 0,
            Self::Array(length) => *length,
        }
    }
}

/// A record describing one heap allocation owned by a [`Registry`][`crate::Registry`].
///
/// Two records are equal if and only if they describe the same address.
///
/// Records are [`Clone`] but not [`Copy`]:
/// ```compile_fail
/// fn copyable<T: Copy>() {}
/// copyable::<tracked_alloc::TrackedAllocation<u32>>();
/// ```
pub struct TrackedAllocation<T> {
    address: NonNull<T>,
    reference_count: usize,
    shape: Shape,
}

impl<T> TrackedAllocation<T> {
    /// Creates a record with a single reference.
    pub(crate) fn new(address: NonNull<T>, shape: Shape) -> Self {
        Self {
            address,
            reference_count: 1,
            shape,
        }
    }

    /// Returns the address of the allocation.
    pub fn address(&self) -> NonNull<T> {
        self.address
    }

    /// Returns the number of live handles referring to the allocation.
    pub fn reference_count(&self) -> usize {
        self.reference_count
    }

    /// Returns the shape of the allocation.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Checks if the allocation is an array.
    pub fn is_array(&self) -> bool {
        self.shape.is_array()
    }

    /// Returns the number of array elements, or zero for a single value.
    pub fn array_length(&self) -> usize {
        self.shape.array_length()
    }

    pub(crate) fn key(&self) -> usize {
        self.address.as_ptr() as usize
    }

    pub(crate) fn retain(&mut self) -> usize {
        self.reference_count += 1;
        self.reference_count
    }

    /// Drops one reference. The count never goes below zero.
    pub(crate) fn release(&mut self) -> usize {
        self.reference_count = self.reference_count.saturating_sub(1);
        self.reference_count
    }

    pub(crate) fn clear_references(&mut self) {
        self.reference_count = 0;
    }

    /// Releases the allocation in the mode recorded by its shape.
    ///
    /// SAFETY: The address must have come from [`Box::into_raw`] on a `Box<T>` (scalar) or on a
    /// boxed array or slice of exactly the recorded length (array), and must not be released
    /// twice. Only the record removed from its registry may be released, never a clone or a
    /// snapshot from [`Registry::find`][`crate::Registry::find`] or
    /// [`Registry::entries`][`crate::Registry::entries`]. No reference into the allocation may
    /// outlive this call.
    pub(crate) unsafe fn deallocate(self) {
        trace!(
            "freeing {:?} allocation at {:p}",
            self.shape,
            self.address.as_ptr()
        );
        match self.shape {
            Shape::Scalar => drop(Box::from_raw(self.address.as_ptr())),
            Shape::Array(length) => drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                self.address.as_ptr(),
                length,
            ))),
        }
    }
}

// Only the record removed from its registry may be deallocated, so copies are explicit.
impl<T> Clone for TrackedAllocation<T> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            reference_count: self.reference_count,
            shape: self.shape,
        }
    }
}

impl<T> PartialEq for TrackedAllocation<T> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl<T> Eq for TrackedAllocation<T> {}

impl<T> Debug for TrackedAllocation<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrackedAllocation")
            .field("address", &self.address)
            .field("reference_count", &self.reference_count)
            .field("shape", &self.shape)
            .finish()
    }
}
