use proc_macro::TokenStream;

mod injectable;
mod instrumentable;

/// Derive macro for making a struct injectable from the DI container
///
/// Field rules:
/// - `Arc<T>` / `Arc<dyn Trait>`: required, resolved with `Container::get`
///   or `Container::get_trait`
/// - `Option<Arc<T>>`: `None` when the container has no `T`
/// - `#[inject(default)]`: `Default::default()`, never looked up
///
/// # Example
/// ```ignore
/// use suitekit::DeriveInjectable as Injectable;
///
/// #[derive(Injectable)]
/// pub struct UserService {
///     repository: Arc<UserRepository>,
///     audit: Option<Arc<AuditLog>>,
///     #[inject(default)]
///     greetings: AtomicUsize,
/// }
/// ```
#[proc_macro_derive(Injectable, attributes(inject))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    injectable::derive_injectable(input)
}

/// Derive macro that opts a component into mock/spy instrumentation
///
/// The struct declares its component kind and marks the field holding its
/// `MethodTable<Self>` with `#[methods]`. A field literally named `methods`
/// is picked up without the marker.
///
/// # Example
/// ```ignore
/// use suitekit::DeriveInstrumentable as Instrumentable;
///
/// #[derive(Instrumentable)]
/// #[instrumentable(kind = "repository")]
/// pub struct UserRepository {
///     #[methods]
///     table: MethodTable<Self>,
/// }
/// ```
#[proc_macro_derive(Instrumentable, attributes(instrumentable, methods))]
pub fn derive_instrumentable(input: TokenStream) -> TokenStream {
    instrumentable::derive_instrumentable(input)
}
