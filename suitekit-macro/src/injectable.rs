use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, GenericArgument, PathArguments, Type};

pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

/// How one field is obtained from the container
enum Resolution {
    Required(Type),
    Optional(Type),
    Default,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            struct_name,
            "#[derive(Injectable)] can only be applied to structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            struct_name,
            "#[derive(Injectable)] only supports structs with named fields",
        ));
    };

    let mut initializers = Vec::with_capacity(fields.named.len());
    for field in &fields.named {
        let name = &field.ident;
        let value = match resolution(field)? {
            Resolution::Required(ty) => resolve(&ty, quote!(?)),
            Resolution::Optional(ty) => resolve(&ty, quote!(.ok())),
            Resolution::Default => quote!(::std::default::Default::default()),
        };
        initializers.push(quote!(#name: #value));
    }

    Ok(quote! {
        impl #impl_generics ::suitekit::Injectable for #struct_name #ty_generics #where_clause {
            fn inject(container: &::suitekit::Container) -> ::suitekit::Result<Self> {
                Ok(Self {
                    #(#initializers),*
                })
            }
        }
    })
}

fn resolve(ty: &Type, finish: TokenStream2) -> TokenStream2 {
    match ty {
        Type::TraitObject(_) => quote!(container.get_trait::<#ty>()#finish),
        _ => quote!(container.get::<#ty>()#finish),
    }
}

fn resolution(field: &Field) -> syn::Result<Resolution> {
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("inject")) {
        let mut default = false;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("default") {
                default = true;
                Ok(())
            } else {
                Err(meta.error("expected `default`"))
            }
        })?;
        if default {
            return Ok(Resolution::Default);
        }
    }

    if let Some(inner) = generic_argument(&field.ty, "Arc") {
        return Ok(Resolution::Required(inner));
    }
    if let Some(inner) = generic_argument(&field.ty, "Option").and_then(|ty| generic_argument(&ty, "Arc")) {
        return Ok(Resolution::Optional(inner));
    }

    Err(syn::Error::new_spanned(
        &field.ty,
        "injectable fields must be `Arc<T>`, `Option<Arc<T>>`, or marked #[inject(default)]",
    ))
}

/// `T` out of `Wrapper<T>` when the last path segment is `wrapper`
fn generic_argument(ty: &Type, wrapper: &str) -> Option<Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner.clone()),
        _ => None,
    }
}
