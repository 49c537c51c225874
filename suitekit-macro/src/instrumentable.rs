use darling::{ast, FromDeriveInput, FromField};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, DeriveInput, Ident};

#[derive(FromField)]
#[darling(forward_attrs(methods))]
struct InstrumentableField {
    ident: Option<Ident>,
    attrs: Vec<Attribute>,
}

#[derive(FromDeriveInput)]
#[darling(attributes(instrumentable), supports(struct_named))]
struct InstrumentableArgs {
    ident: Ident,
    generics: syn::Generics,
    data: ast::Data<(), InstrumentableField>,
    kind: String,
}

pub fn derive_instrumentable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let args = match InstrumentableArgs::from_derive_input(&input) {
        Ok(args) => args,
        Err(err) => return TokenStream::from(err.write_errors()),
    };

    match generate_instrumentable_impl(&args) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn generate_instrumentable_impl(args: &InstrumentableArgs) -> syn::Result<TokenStream2> {
    let struct_name = &args.ident;
    let (impl_generics, ty_generics, where_clause) = args.generics.split_for_impl();

    let kind = match args.kind.as_str() {
        "service" => quote!(Service),
        "repository" => quote!(Repository),
        "controller" => quote!(Controller),
        "component" => quote!(Component),
        other => {
            return Err(syn::Error::new_spanned(
                struct_name,
                format!(
                    "unknown component kind `{other}`; expected one of service, repository, controller, component"
                ),
            ))
        }
    };

    let fields = match &args.data {
        ast::Data::Struct(fields) => &fields.fields,
        ast::Data::Enum(_) => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "#[derive(Instrumentable)] can only be applied to structs",
            ))
        }
    };

    let marked = fields
        .iter()
        .find(|field| field.attrs.iter().any(|attr| attr.path().is_ident("methods")))
        .or_else(|| {
            fields
                .iter()
                .find(|field| field.ident.as_ref().is_some_and(|ident| ident == "methods"))
        });

    let methods_field = match marked.and_then(|field| field.ident.as_ref()) {
        Some(ident) => ident,
        None => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "#[derive(Instrumentable)] needs a `MethodTable<Self>` field marked with #[methods]",
            ))
        }
    };

    Ok(quote! {
        impl #impl_generics ::suitekit::Instrumentable for #struct_name #ty_generics #where_clause {
            const KIND: ::suitekit::ComponentKind = ::suitekit::ComponentKind::#kind;

            fn methods(&self) -> &::suitekit::MethodTable<Self> {
                &self.#methods_field
            }
        }
    })
}
