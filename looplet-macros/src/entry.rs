use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::spanned::Spanned;

use crate::parse::{is_test_attribute, lift_inner_attrs};

pub(crate) fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    expand_entry(args, item, false)
}

pub(crate) fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    expand_entry(args, item, true)
}

/// Both macros share one expansion: strip `async` from the annotated
/// function, wrap its body in an `async move` block, and drive that block on
/// a fresh event loop. `#[looplet::test]` additionally emits the standard
/// `#[test]` attribute.
fn expand_entry(args: TokenStream, item: TokenStream, is_test: bool) -> TokenStream {
    let func: syn::ItemFn = match syn::parse2(item.clone()) {
        Ok(func) => func,
        // Not a function: emit the input unchanged next to the error so IDE
        // features keep working on the original item.
        Err(err) => return recover(item, err),
    };

    match validate(&func, &args, is_test) {
        Ok(()) => expand(func, is_test),
        // Expand anyway: a best-effort item plus the error beats a bare
        // compile_error! for completions and go-to-definition.
        Err(err) => recover(expand(func, is_test), err),
    }
}

fn validate(func: &syn::ItemFn, args: &TokenStream, is_test: bool) -> Result<(), syn::Error> {
    if func.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            func.sig.fn_token,
            "the `async` keyword is missing from the function declaration",
        ));
    }

    // The runtime has exactly one (single-threaded) flavor, so the only
    // valid attribute argument list is the empty one.
    if let Some(first) = args.clone().into_iter().next() {
        let macro_name = if is_test {
            "looplet::test"
        } else {
            "looplet::main"
        };
        return Err(syn::Error::new(
            first.span(),
            format!(
                "#[{macro_name}] accepts no arguments; the runtime is single-threaded and has a single flavor"
            ),
        ));
    }

    if !is_test && func.sig.ident == "main" && !func.sig.inputs.is_empty() {
        return Err(syn::Error::new_spanned(
            &func.sig.ident,
            "the main function cannot accept arguments",
        ));
    }

    if is_test {
        if let Some(attr) = func.attrs.iter().find(|attr| is_test_attribute(attr)) {
            let msg = "second test attribute is supplied, consider removing or changing the order of your test attributes";
            return Err(syn::Error::new_spanned(attr, msg));
        }
    }

    Ok(())
}

fn expand(func: syn::ItemFn, is_test: bool) -> TokenStream {
    let syn::ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = func;
    sig.asyncness = None;

    let attrs = lift_inner_attrs(attrs);
    let test_attr = is_test.then(|| quote!(#[::core::prelude::v1::test]));

    // Anchor the driver to the body so type mismatches point at user code
    // rather than at the macro.
    let driver = quote_spanned! {block.span()=>
        #[allow(clippy::expect_used, clippy::needless_return)]
        {
            return looplet::runtime::Builder::new()
                .build()
                .block_on(body)
                .expect("event loop terminated abnormally");
        }
    };

    quote! {
        #(#attrs)*
        #test_attr
        #vis #sig {
            // `async move` so test parameters are captured by value, keeping
            // the root future 'static.
            let body = async move #block;
            #driver
        }
    }
}

fn recover(mut tokens: TokenStream, err: syn::Error) -> TokenStream {
    tokens.extend(err.into_compile_error());
    tokens
}
