use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, Ident, LitStr, Path, Result, Token};

#[derive(Default)]
struct ModelAttrs {
    collection: Option<LitStr>,
    database: Option<LitStr>,
    indexes: Option<Path>,
}

impl ModelAttrs {
    fn parse(input: &DeriveInput) -> Result<Self> {
        let mut attrs = ModelAttrs::default();

        for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("model")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("collection") {
                    attrs.collection = Some(meta.value()?.parse()?);
                    Ok(())
                } else if meta.path.is_ident("database") {
                    attrs.database = Some(meta.value()?.parse()?);
                    Ok(())
                } else if meta.path.is_ident("indexes") {
                    let function: LitStr = meta.value()?.parse()?;
                    attrs.indexes = Some(function.parse()?);
                    Ok(())
                } else {
                    Err(meta.error("unknown model attribute, expected `collection`, `database` or `indexes`"))
                }
            })?;
        }

        Ok(attrs)
    }
}

fn identity_field(input: &DeriveInput) -> Result<&Field> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(input, "Model can only be derived for structs"));
    };

    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            input,
            "Model can only be derived for structs with named fields",
        ));
    };

    let mut marked = Vec::new();
    for field in &fields.named {
        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("model")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    marked.push(field);
                    Ok(())
                } else {
                    Err(meta.error("unknown model field attribute, expected `id`"))
                }
            })?;
        }
    }

    match marked.as_slice() {
        [field] => Ok(*field),
        [] => fields
            .named
            .iter()
            .find(|field| field.ident.as_ref().is_some_and(|ident| ident == "id"))
            .ok_or_else(|| {
                syn::Error::new_spanned(
                    input,
                    "Model requires an identity field named `id` or marked with `#[model(id)]`",
                )
            }),
        _ => Err(syn::Error::new_spanned(
            input,
            "only one field can be marked with `#[model(id)]`",
        )),
    }
}

/// Checks that the identity field is stored under the `_id` key.
fn check_identity_key(field: &Field) -> Result<()> {
    let mut stored_as_id = false;

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if meta.input.peek(Token![=]) {
                    let key: LitStr = meta.value()?.parse()?;
                    stored_as_id = key.value() == "_id";
                } else {
                    let mut directions = Vec::new();
                    meta.parse_nested_meta(|direction| {
                        let key: LitStr = direction.value()?.parse()?;
                        directions.push(key.value() == "_id");
                        Ok(())
                    })?;
                    stored_as_id = directions.len() == 2 && directions.iter().all(|id| *id);
                }
            } else if meta.input.peek(Token![=]) {
                meta.value()?.parse::<syn::Expr>()?;
            } else if meta.input.peek(syn::token::Paren) {
                meta.input.parse::<proc_macro2::TokenTree>()?;
            }
            Ok(())
        })?;
    }

    if stored_as_id {
        Ok(())
    } else {
        Err(syn::Error::new_spanned(
            field,
            "the identity field must be stored as `_id`, add `#[serde(rename = \"_id\")]`",
        ))
    }
}

pub(crate) fn expand_model(input: &DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let model_name = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let attrs = ModelAttrs::parse(input)?;
    let field = identity_field(input)?;
    check_identity_key(field)?;
    let id = &field.ident;

    let collection = attrs
        .collection
        .map(|collection| quote! { let settings = settings.collection(#collection); });
    let database = attrs
        .database
        .map(|database| quote! { let settings = settings.database_alias(#database); });
    let indexes = attrs
        .indexes
        .map(|indexes| quote! { let settings = settings.indexes(#indexes()); });

    Ok(quote! {
        impl #impl_generics ::docmap::model::Model for #name #ty_generics #where_clause {
            fn id(&self) -> ::core::option::Option<&::docmap::bson::oid::ObjectId> {
                self.#id.as_ref()
            }

            fn settings() -> ::docmap::model::ModelSettings {
                let settings = ::docmap::model::ModelSettings::new();
                #collection
                #database
                #indexes
                settings
            }

            fn model_name() -> &'static str {
                #model_name
            }
        }
    })
}

pub(crate) fn expand_embedded_document(input: &DeriveInput) -> TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    quote! {
        impl #impl_generics ::docmap::model::EmbeddedDocument for #name #ty_generics #where_clause {}
    }
}
