//! Procedural macro for deriving the [`tracked_alloc::Tracked`] interface, which gives a type its
//! own per-thread registry of tracked allocations.
//!
//! # Example
//! ```
//! use std::cell::Cell;
//!
//! use tracked_alloc::Handle;
//! use tracked_alloc_derive::Tracked;
//!
//! #[derive(Tracked)]
//! struct Node {
//!     next: Option<Handle<Node>>,
//!     visits: Cell<u32>,
//! }
//!
//! fn main() {
//!     let tail = Handle::new(Node {
//!         next: None,
//!         visits: Cell::new(0),
//!     });
//!     let head = Handle::new(Node {
//!         next: Some(tail.clone()),
//!         visits: Cell::new(0),
//!     });
//!     assert_eq!(Handle::<Node>::registry_size(), 2);
//!     assert_eq!(tail.reference_count(), 2);
//!
//!     let next = head.next.as_ref().unwrap();
//!     next.visits.set(next.visits.get() + 1);
//!     assert_eq!(tail.visits.get(), 1);
//!
//!     // Dropping the head releases its reference to the tail.
//!     drop(head);
//!     assert_eq!(tail.reference_count(), 1);
//!     assert_eq!(Handle::<Node>::registry_size(), 1);
//! }
//! ```

#![no_std]

extern crate proc_macro;

mod parse;

use parse::Input;
use proc_macro::TokenStream;
use proc_macro2::{
    Ident,
    Span,
};
use proc_macro_crate::{
    crate_name,
    FoundCrate,
};
use quote::quote;
use syn::{
    parse_macro_input,
    Error,
};

#[proc_macro_derive(Tracked)]
pub fn derive_tracked(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as Input);
    let ident = input.ident;

    let call_site = Span::call_site();
    let crate_token = match crate_name("tracked-alloc") {
        Ok(FoundCrate::Itself) => quote!(crate),
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, call_site);
            quote!(#ident)
        }
        Err(_) => {
            return Error::new(call_site, "tracked-alloc must be a dependency in `Cargo.toml`")
                .to_compile_error()
                .into()
        }
    };

    TokenStream::from(quote! {
        #crate_token::impl_tracked!(#ident);
    })
}
