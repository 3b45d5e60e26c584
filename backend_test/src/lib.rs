use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies.
///
/// Injectable dependencies are a fresh `crate::store::MemoryStore` and a
/// [`rocket::local::asynchronous::Client`] for a server built over that same
/// store, so a test may seed or inspect the store directly and drive the API
/// through the client.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        let args = TokenStream2::from(args);
        return syn::Error::new(args.span(), "`backend_test` takes no arguments")
            .into_compile_error()
            .into();
    }
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract injected parameters and reject invalid function signatures.
    let injected = match check_sig(&item_fn.sig) {
        Ok(injected) => injected,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let test_args = injected.iter().map(|arg| match arg {
        Injected::Store => quote! { store.clone() },
        Injected::Client => quote! { rocket_client },
    });
    let build_client = injected
        .iter()
        .any(|arg| matches!(arg, Injected::Client))
        .then(|| {
            quote! {
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::rocket_for_store(store.clone()),
                )
                .await
                .unwrap();
            }
        });

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// The test itself.
            #item_fn

            log4rs_test_utils::test_logging::init_logging_once_for(
                [env!("CARGO_CRATE_NAME")],
                None,
                None,
            );

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let store = crate::store::MemoryStore::new();
                #build_client
                #new_name(#(#test_args),*).await
            });
        }
    }
    .into()
}

enum Injected {
    Store,
    Client,
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: &Signature) -> Result<Vec<Injected>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut injected = vec![];
    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                let kind = match type_path.path.segments.last() {
                    Some(segment) if segment.ident == "MemoryStore" => Some(Injected::Store),
                    Some(segment) if segment.ident == "Client" => Some(Injected::Client),
                    _ => None,
                };
                if let Some(kind) = kind {
                    if injected.iter().any(|seen| std::mem::discriminant(seen) == std::mem::discriminant(&kind)) {
                        return Err(syn::Error::new(
                            input.span(),
                            "Each dependency can only be injected once",
                        ));
                    }
                    injected.push(kind);
                    continue;
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `store_ident: MemoryStore` or `client_ident: Client`",
        ));
    }

    Ok(injected)
}
