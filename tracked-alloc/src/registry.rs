use alloc::vec::Vec;
use core::{
    any,
    cell::{
        Cell,
        RefCell,
    },
    fmt::{
        Debug,
        Display,
    },
    mem,
    ptr::NonNull,
};

use hashbrown::HashMap;
use log::trace;

use crate::{
    RegistryError,
    Shape,
    TrackedAllocation,
};

/// The records of a [`Registry`], in insertion order, with an index from address to slot.
///
/// Every record in `slots` has exactly one entry in `index`, and vice versa.
pub(crate) struct Entries<T> {
    pub(crate) slots: Vec<TrackedAllocation<T>>,
    index: HashMap<usize, usize>,
}

impl<T> Entries<T> {
    fn with_capacity(size: usize) -> Self {
        Self {
            slots: Vec::with_capacity(size),
            index: HashMap::with_capacity(size),
        }
    }

    fn slot(&self, address: usize) -> Option<usize> {
        self.index.get(&address).copied()
    }

    fn get_mut(&mut self, address: usize) -> Result<&mut TrackedAllocation<T>, RegistryError> {
        match self.slot(address) {
            Some(slot) => Ok(&mut self.slots[slot]),
            None => Err(RegistryError::Untracked(address)),
        }
    }

    fn insert(&mut self, entry: TrackedAllocation<T>) -> bool {
        if self.index.contains_key(&entry.key()) {
            return false;
        }
        self.index.insert(entry.key(), self.slots.len());
        self.slots.push(entry);
        true
    }

    /// Removes the record in `slot`, keeping the remaining records in insertion order.
    pub(crate) fn remove_slot(&mut self, slot: usize) -> TrackedAllocation<T> {
        let entry = self.slots.remove(slot);
        self.index.remove(&entry.key());
        for (slot, moved) in self.slots.iter().enumerate().skip(slot) {
            self.index.insert(moved.key(), slot);
        }
        entry
    }
}

/// A container that tracks heap allocations of a given type and how many handles refer to each.
///
/// A registry is shared (through an [`Rc`][`alloc::rc::Rc`]) by every [`Handle`][`crate::Handle`]
/// that refers to one of its allocations. Handles keep the reference counts up to date, and the
/// collector releases allocations whose count has reached zero.
///
/// There is at most one record per address. Records are kept in insertion order, which is only
/// observable through [`Registry::entries`] and [`Registry::listing`].
///
/// This data type is not thread safe. It is also not reentrant while borrowed internally, but it
/// never holds an internal borrow while running user code, so destructors of tracked values may
/// freely drop handles into the same registry.
pub struct Registry<T> {
    pub(crate) entries: RefCell<Entries<T>>,
    generation: Cell<usize>,
}

impl<T> Registry<T> {
    /// Creates a new registry.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a new registry with room for `size` records.
    pub fn with_capacity(size: usize) -> Self {
        Self {
            entries: RefCell::new(Entries::with_capacity(size)),
            generation: Cell::new(0),
        }
    }

    /// Returns the number of shutdowns the registry has gone through.
    ///
    /// Handles remember the generation their allocation was tracked in, and never touch records of
    /// a later generation, even at a reused address.
    pub fn generation(&self) -> usize {
        self.generation.get()
    }

    pub(crate) fn next_generation(&self) -> usize {
        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);
        generation
    }

    /// Checks if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of allocations tracked by the registry.
    pub fn len(&self) -> usize {
        self.entries.borrow().slots.len()
    }

    /// Returns a copy of the record for `address`, if it is tracked.
    pub fn find(&self, address: *const T) -> Option<TrackedAllocation<T>> {
        let entries = self.entries.borrow();
        entries
            .slot(address as usize)
            .map(|slot| entries.slots[slot].clone())
    }

    /// Checks if the registry has a record for `address`.
    pub fn contains(&self, address: *const T) -> bool {
        self.entries.borrow().slot(address as usize).is_some()
    }

    /// Returns the reference count recorded for `address`, if it is tracked.
    pub fn reference_count(&self, address: *const T) -> Option<usize> {
        self.find(address).map(|entry| entry.reference_count())
    }

    /// Returns a copy of every record, in insertion order.
    pub fn entries(&self) -> Vec<TrackedAllocation<T>> {
        self.entries.borrow().slots.clone()
    }

    /// Returns a diagnostic listing of the registry that can be displayed.
    pub fn listing(&self) -> Listing<'_, T> {
        Listing { registry: self }
    }

    /// Inserts a record.
    ///
    /// Returns whether or not the record was inserted. If the address is already tracked, no
    /// insertion occurs.
    pub(crate) fn insert(&self, entry: TrackedAllocation<T>) -> bool {
        self.entries.borrow_mut().insert(entry)
    }

    /// Removes the record for `address` without releasing the allocation.
    pub(crate) fn remove(&self, address: *const T) -> Option<TrackedAllocation<T>> {
        let mut entries = self.entries.borrow_mut();
        let slot = entries.slot(address as usize)?;
        Some(entries.remove_slot(slot))
    }

    /// Adds a reference to a tracked allocation, returning the new count.
    pub(crate) fn retain(&self, address: *const T) -> Result<usize, RegistryError> {
        let count = self.entries.borrow_mut().get_mut(address as usize)?.retain();
        trace!("retained {address:p}, {count} reference(s)");
        Ok(count)
    }

    /// Drops a reference to a tracked allocation, returning the new count.
    ///
    /// The count saturates at zero. The allocation is not released here; that is left to the
    /// collector.
    pub(crate) fn release(&self, address: *const T) -> Result<usize, RegistryError> {
        let count = self.entries.borrow_mut().get_mut(address as usize)?.release();
        trace!("released {address:p}, {count} reference(s)");
        Ok(count)
    }

    /// Adds a reference to `address`, inserting a fresh record with the given shape if it is not
    /// tracked yet. Returns the new count.
    pub(crate) fn track(&self, address: NonNull<T>, shape: Shape) -> usize {
        match self.retain(address.as_ptr()) {
            Ok(count) => count,
            Err(_) => {
                self.insert(TrackedAllocation::new(address, shape));
                trace!("tracking {shape:?} allocation at {address:p}");
                1
            }
        }
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Registry<T> {
    fn drop(&mut self) {
        // Handles share ownership of the registry, so no handle refers to any of these records.
        let entries = mem::take(&mut self.entries.get_mut().slots);
        for entry in entries {
            unsafe { entry.deallocate() }
        }
    }
}

impl<T> Debug for Registry<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.entries().iter()).finish()
    }
}

/// A diagnostic listing of a [`Registry`], showing the address, reference count, and value of
/// each record.
///
/// For arrays, only the first element is shown.
pub struct Listing<'r, T> {
    registry: &'r Registry<T>,
}

impl<T> Display for Listing<'_, T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Take a snapshot, so formatting a value never runs while the registry is borrowed.
        let entries = self.registry.entries();
        writeln!(
            f,
            "Registry<{}> ({} entries):",
            any::type_name::<T>(),
            entries.len()
        )?;
        if entries.is_empty() {
            return writeln!(f, "  Registry is empty!");
        }
        writeln!(f, "  address reference_count value")?;
        for entry in entries {
            // SAFETY: Every record refers to a live allocation until the collector removes it.
            let value = unsafe { entry.address().as_ref() };
            writeln!(
                f,
                "  [{:p}] {} {:?}",
                entry.address(),
                entry.reference_count(),
                value
            )?;
        }
        Ok(())
    }
}
