//! Procedural macros used by `handrec`.
//!
//! Do not use this crate directly, use `handrec` instead.

use proc_macro::{Span, TokenStream};
use quote::quote;
use syn::{parse::Error, ItemFn};

/// Runs the annotated `main` function on a worker thread while the GUI event loop occupies the
/// main thread.
///
/// Logging is initialized before the function is invoked. The function must return
/// `anyhow::Result<()>`, and the process exits with status 1 if it returns an error.
#[proc_macro_attribute]
pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    match expand_main(args, item.clone()) {
        Ok(tokens) => tokens,
        Err(err) => {
            // Emit the `compile_error!` invocation alongside the original item to keep IDEs
            // working.
            let mut error = item;
            error.extend(TokenStream::from(err.to_compile_error()));
            error
        }
    }
}

fn expand_main(args: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    if !args.is_empty() {
        return Err(Error::new(
            Span::call_site().into(),
            "`#[handrec::main]` does not accept arguments",
        ));
    }

    let item = syn::parse::<ItemFn>(item)?;

    if item.sig.ident != "main" {
        return Err(Error::new(
            item.sig.ident.span(),
            "`#[handrec::main]` must be applied to a function called `main`",
        ));
    }
    if !item.sig.inputs.is_empty() {
        return Err(Error::new_spanned(
            &item.sig.inputs,
            "`#[handrec::main]` function must not take any arguments",
        ));
    }

    Ok(quote! {
        fn main() {
            #item

            ::handrec::init_logger!();

            ::handrec::run(main);
        }
    }
    .into())
}
