//! Reference-counted handles over heap allocations tracked in per-type registries.
//!
//! A [`Handle<T, N>`] shares ownership of a boxed value (or a boxed array of `N` values). Every
//! allocation is recorded in a [`Registry<T>`] along with the number of handles that refer to it.
//! When a handle is dropped, the registry's collector sweeps away every allocation that no handle
//! refers to anymore.
//!
//! This is plain reference counting: reference cycles are never collected, and handles cannot be
//! shared across threads.
//!
//! # Examples
//!
//! ## Shared Ownership with an Explicit [`Registry<T>`]
//! ```
//! use std::rc::Rc;
//!
//! use tracked_alloc::{
//!     Handle,
//!     Registry,
//! };
//!
//! fn main() {
//!     let registry = Rc::new(Registry::new());
//!     let a = Handle::new_in(String::from("shared"), &registry);
//!     let b = a.clone();
//!     assert_eq!(a.reference_count(), 2);
//!     assert_eq!(registry.len(), 1);
//!
//!     drop(a);
//!     assert_eq!(*b, "shared");
//!     assert_eq!(b.reference_count(), 1);
//!
//!     drop(b);
//!     assert!(registry.is_empty());
//! }
//! ```
//!
//! ## Arrays and Range Iteration
//! ```
//! use std::rc::Rc;
//!
//! use tracked_alloc::{
//!     Handle,
//!     Registry,
//! };
//!
//! fn main() {
//!     let registry = Rc::new(Registry::new());
//!     let squares = Handle::<u32, 5>::from_array_in([0, 1, 4, 9, 16], &registry);
//!     assert_eq!(squares[3], 9);
//!     assert_eq!(squares.iter().sum::<u32>(), 30);
//!
//!     let mut iter = squares.begin();
//!     let end = squares.end();
//!     let mut count = 0;
//!     while iter != end {
//!         iter.next();
//!         count += 1;
//!     }
//!     assert_eq!(count, 5);
//! }
//! ```
//!
//! ## Reassignment and Deferred Collection
//! ```
//! use std::rc::Rc;
//!
//! use tracked_alloc::{
//!     Handle,
//!     Registry,
//! };
//!
//! fn main() {
//!     let registry = Rc::new(Registry::new());
//!     let mut a = Handle::new_in(1, &registry);
//!     let b = Handle::new_in(2, &registry);
//!
//!     // The first allocation loses its only reference, but stays until the next collection.
//!     a.assign(&b);
//!     assert_eq!(*a, 2);
//!     assert_eq!(registry.len(), if cfg!(feature = "eager-collect") { 1 } else { 2 });
//!
//!     registry.collect();
//!     assert_eq!(registry.len(), 1);
//! }
//! ```
//!
//! ## Per-Type Registries with [`Tracked`]
//! ```
//! use tracked_alloc::Handle;
//!
//! fn main() {
//!     let a = Handle::new(42i64);
//!     let b = a.clone();
//!     assert_eq!(Handle::<i64>::registry_size(), 1);
//!     println!("{}", a.registry().listing());
//!
//!     drop(a);
//!     drop(b);
//!     assert_eq!(Handle::<i64>::registry_size(), 0);
//! }
//! ```
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod allocation;
mod collector;
pub mod handle;
pub mod iter;
pub mod registry;
mod registry_error;
pub mod shutdown;
#[cfg(feature = "std")]
pub mod tracked;

pub use allocation::{
    Shape,
    TrackedAllocation,
};
pub use handle::Handle;
pub use iter::RangeIter;
pub use registry::{
    Listing,
    Registry,
};
pub use registry_error::RegistryError;
pub use shutdown::ShutdownHook;
#[cfg(feature = "std")]
pub use tracked::Tracked;
