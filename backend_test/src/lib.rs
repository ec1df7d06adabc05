use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into one run on Rocket's test runtime,
/// injecting dependencies from a fresh in-memory server.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::store::MemoryStore`, `crate::notify::RecordingSink` and
/// `crate::engine::clock::ManualClock`. Each test gets its own server, so the
/// store and clock start empty and at the same instant every time.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        return syn::Error::new(
            TokenStream2::from(args).span(),
            "`backend_test` takes no arguments",
        )
        .into_compile_error()
        .into();
    }

    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the harness fields to inject and reject invalid function signatures.
    let fields = match check_sig(&item_fn.sig) {
        Ok(fields) => fields,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    quote! {
        #[rocket::async_test]
        async fn #name() {
            /// The test itself.
            #item_fn

            let harness = crate::test_harness().await;
            #new_name(#(harness.#fields),*).await;
        }
    }
    .into()
}

/// Ensure the wrapped test is async and map each parameter to a harness field.
fn check_sig(sig: &Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut fields: Vec<TokenStream2> = vec![];
    let mut seen = vec![];

    for input in &sig.inputs {
        let field = match input {
            FnArg::Typed(pat_type) if matches!(&*pat_type.pat, Pat::Ident(_)) => {
                match &*pat_type.ty {
                    Type::Path(type_path) => type_path
                        .path
                        .segments
                        .last()
                        .and_then(|segment| match segment.ident.to_string().as_str() {
                            "Client" => Some("client"),
                            "MemoryStore" => Some("store"),
                            "RecordingSink" => Some("events"),
                            "ManualClock" => Some("clock"),
                            _ => None,
                        }),
                    _ => None,
                }
            }
            _ => None,
        };

        match field {
            Some(field) if seen.contains(&field) => {
                return Err(syn::Error::new(
                    input.span(),
                    format!("Test cannot accept more than one `{field}`"),
                ));
            }
            Some(field) => {
                seen.push(field);
                let ident = format_ident!("{}", field);
                fields.push(quote! { #ident });
            }
            None => {
                return Err(syn::Error::new(
                    input.span(),
                    "Expected one of `Client`, `MemoryStore`, `RecordingSink` or `ManualClock`",
                ));
            }
        }
    }

    Ok(fields)
}
