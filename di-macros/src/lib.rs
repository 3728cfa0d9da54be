//! Compile-time dependency injection macros for rehome.
//!
//! - `#[derive(Context)]` exposes every field of a root struct through `FromRef`
//! - `#[derive(FromContext)]` builds a component by resolving each of its fields
//!   from the root
//!
//! Generated code refers to `crate::FromRef`, so the consuming crate must
//! re-export the trait at its root.

use proc_macro::TokenStream;

mod context;
mod fields;
mod from_context;

/// Derives `FromRef<Root>` for the type of every named field of `Root`.
///
/// ```ignore
/// #[derive(Context, Clone)]
/// pub struct Context {
///     pub store: AppStore,
///     pub config: Arc<Config>,
/// }
///
/// // impl FromRef<Context> for AppStore { ... }
/// // impl FromRef<Context> for Arc<Config> { ... }
/// ```
///
/// Field types must be `Clone` and distinct from each other.
#[proc_macro_derive(Context)]
pub fn derive_context(input: TokenStream) -> TokenStream {
    context::derive_context_impl(input)
}

/// Derives `FromRef<Context>` for a component whose fields can all be
/// resolved from the context.
///
/// ```ignore
/// #[derive(FromContext, Clone)]
/// pub struct IdempotencyGuard {
///     store: AppStore,
/// }
/// ```
///
/// The root type defaults to `Context` in the scope of the derive and can be
/// overridden:
///
/// ```ignore
/// #[derive(FromContext)]
/// #[from_context(Context = "TestContext")]
/// pub struct Checker {
///     store: AppStore,
/// }
/// ```
#[proc_macro_derive(FromContext, attributes(from_context))]
pub fn derive_from_context(input: TokenStream) -> TokenStream {
    from_context::derive_from_context_impl(input)
}
