//! Procedural macros for the courier mediator.
//!
//! - `#[derive(Request)]` - implements `Request<T>` for each declared result type
//!
//! Handlers need no macro: any `async fn(Q) -> Result<R, E>` (or
//! `async fn(Arc<Owner>, Q) -> Result<R, E>`) is already a handler.

mod request;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `Request<T>` for every `#[request(result = "T")]` attribute.
///
/// A type may answer with several result types; each pairing is routed
/// separately.
///
/// # Example
///
/// ```rust,ignore
/// use courier::Request;
///
/// #[derive(Clone, Request)]
/// #[request(result = "OrderId")]
/// #[request(result = "OrderSummary")]
/// pub struct CreateOrder {
///     pub sku: String,
///     pub quantity: u32,
/// }
/// ```
///
/// Use `#[request(crate = "path")]` when `courier_core` is only reachable
/// through a re-export.
#[proc_macro_derive(Request, attributes(request))]
pub fn derive_request(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match request::derive_request(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
