#![allow(clippy::needless_doctest_main)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]

//! Attribute macros for the looplet runtime.

mod entry;
mod parse;

/// Marks an async function to be executed on a fresh event loop. This macro
/// sets up an `EventLoop` without requiring the user to touch `Builder`
/// directly.
///
/// The runtime is single-threaded by design; there are no flavor options.
/// Applications that need configured capacities should use
/// `looplet::runtime::Builder` instead.
///
/// # Function arguments
///
/// Function arguments are NOT allowed.
///
/// # Usage
///
/// ```no_run
/// #[looplet::main]
/// async fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// Equivalent code not using `#[looplet::main]`
///
/// ```no_run
/// fn main() {
///     looplet::runtime::Builder::new()
///         .build()
///         .block_on(async {
///             println!("Hello world");
///         })
///         .expect("event loop terminated abnormally")
/// }
/// ```
#[proc_macro_attribute]
pub fn main(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::main(args.into(), item.into()).into()
}

/// Marks an async function to be executed on a fresh event loop, suitable
/// for the test environment. Each test gets its own loop.
///
/// # Usage
///
/// ```no_run
/// #[looplet::test]
/// async fn my_test() {
///     assert!(true);
/// }
/// ```
///
/// Equivalent code not using `#[looplet::test]`
///
/// ```no_run
/// #[test]
/// fn my_test() {
///     looplet::runtime::Builder::new()
///         .build()
///         .block_on(async {
///             assert!(true);
///         })
///         .expect("event loop terminated abnormally")
/// }
/// ```
#[proc_macro_attribute]
pub fn test(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::test(args.into(), item.into()).into()
}
