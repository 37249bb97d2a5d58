//! Procedural macros for the docmap project.
//!
//! - `#[derive(Model)]` implements `docmap::model::Model` for a struct with named fields.
//!   The identity is the field marked `#[model(id)]`, or the field named `id`, and must
//!   be an `Option<ObjectId>` stored under `_id` with `#[serde(rename = "_id")]`.
//!   Container attributes configure the model settings:
//!
//!   ```ignore
//!   #[derive(Debug, Clone, Serialize, Deserialize, Model)]
//!   #[model(collection = "users", database = "main", indexes = "user_indexes")]
//!   pub struct User {
//!       #[serde(rename = "_id", alias = "id", skip_serializing_if = "Option::is_none", default)]
//!       pub id: Option<ObjectId>,
//!       pub email: String,
//!   }
//!
//!   fn user_indexes() -> Vec<IndexSpec> {
//!       vec![IndexSpec::builder().ascending("email").unique(true).build()]
//!   }
//!   ```
//!
//! - `#[derive(EmbeddedDocument)]` implements `docmap::model::EmbeddedDocument`.

#[allow(unused_extern_crates)]
extern crate self as docmap_macros;

mod model;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    model::expand_model(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[proc_macro_derive(EmbeddedDocument)]
pub fn derive_embedded_document(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    model::expand_embedded_document(&input).into()
}
