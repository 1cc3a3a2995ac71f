use proc_macro2::Ident;
use syn::{
    parse::{
        Parse,
        ParseStream,
    },
    spanned::Spanned,
    DeriveInput,
    Error,
    Result,
};

pub struct Input {
    pub ident: Ident,
}

impl Parse for Input {
    fn parse(input: ParseStream) -> Result<Self> {
        let derive_input = DeriveInput::parse(input)?;
        // Each type needs its own static registry, which generic types cannot have.
        if !derive_input.generics.params.is_empty() {
            return Err(Error::new(
                derive_input.generics.span(),
                "Tracked cannot be derived for generic types; use an explicit registry instead",
            ));
        }

        Ok(Input {
            ident: derive_input.ident,
        })
    }
}
