use std::{
    cell::Cell,
    rc::Rc,
};

use tracked_alloc::{
    Handle,
    Registry,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// A shared counter for how many times a value is deallocated.
struct DropCounter<'c>(&'c Cell<u32>);

impl<'c> Drop for DropCounter<'c> {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

#[test]
fn copy_then_destroy_frees_on_last_reference() {
    init_logging();
    let drop_counter = Cell::new(0);
    let registry = Rc::new(Registry::new());

    let a = Handle::new_in(DropCounter(&drop_counter), &registry);
    assert_eq!(registry.reference_count(a.as_ptr()), Some(1));
    let b = a.clone();
    assert_eq!(registry.reference_count(a.as_ptr()), Some(2));

    drop(b);
    assert_eq!(registry.reference_count(a.as_ptr()), Some(1));
    assert_eq!(drop_counter.get(), 0);

    let address = a.as_ptr();
    drop(a);
    assert_eq!(drop_counter.get(), 1);
    assert_eq!(registry.find(address), None);
    assert!(registry.is_empty());
}

#[test]
fn array_of_five_is_freed_as_an_array() {
    init_logging();
    let drop_counter = Cell::new(0);
    let registry = Rc::new(Registry::new());
    let handle = Handle::<_, 5>::from_boxed_array_in(
        Box::new([
            DropCounter(&drop_counter),
            DropCounter(&drop_counter),
            DropCounter(&drop_counter),
            DropCounter(&drop_counter),
            DropCounter(&drop_counter),
        ]),
        &registry,
    );
    assert_eq!(registry.len(), 1);
    assert_eq!(handle.iter().count(), 5);

    drop(handle);
    assert_eq!(drop_counter.get(), 5);
    assert!(registry.is_empty());
}

#[test]
fn reassigning_away_from_an_aliased_allocation_keeps_it() {
    init_logging();
    let drop_counter = Cell::new(0);
    let registry = Rc::new(Registry::new());
    let mut a = Handle::new_in(DropCounter(&drop_counter), &registry);
    let b = a.clone();
    let old = a.as_ptr();

    let fresh = Box::into_raw(Box::new(DropCounter(&drop_counter)));
    unsafe { a.assign_raw(fresh) };
    assert_eq!(registry.reference_count(old), Some(1));
    assert_eq!(registry.reference_count(fresh), Some(1));
    assert_eq!(drop_counter.get(), 0);

    drop(b);
    assert_eq!(drop_counter.get(), 1);
    drop(a);
    assert_eq!(drop_counter.get(), 2);
    assert!(registry.is_empty());
}

#[test]
fn listing_reports_every_record() {
    init_logging();
    let registry = Rc::new(Registry::new());
    let a = Handle::new_in(String::from("first"), &registry);
    let _b = a.clone();
    let _c = Handle::new_in(String::from("second"), &registry);

    let listing = registry.listing().to_string();
    assert!(listing.contains("alloc::string::String"));
    assert!(listing.contains(&format!("[{:p}] 2 \"first\"", a.as_ptr())));
    assert!(listing.contains("1 \"second\""));
    log::debug!("{listing}");
}
