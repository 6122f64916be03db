use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod entity;
mod search;
mod types;

use entity::ParsedEntity;
use search::ParsedDescriptor;

/// Derives `EntityMetadata` and registers the entity for discovery.
///
/// ```text
/// #[derive(Entity)]
/// #[declaro(table = "EMPLOYEE")]
/// struct Employee {
///     #[declaro(id, generated = "sequence", sequence = "EMP_SEQ")]
///     id: i64,
///     #[declaro(column = "EMP_NAME")]
///     name: String,
///     #[declaro(relation(kind = "many_to_one"))]
///     department: Option<Department>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(declaro))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match ParsedEntity::from_input(&input) {
        Ok(parsed) => parsed.emit().into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derives `SearchDescriptor` from `#[declaro(condition(..))]` and `#[declaro(subquery(..))]`
/// markers.
///
/// A sub-query type is expanded into the declaration, so descriptors must not nest into a cycle.
/// Direct self-nesting is rejected here; a cycle through other descriptor types overflows the
/// stack on the first `search_declaration()` call.
///
/// ```text
/// #[derive(Serialize, SearchDescriptor)]
/// #[declaro(index = "Employee", not_null_field(field = "email"))]
/// struct EmployeeQuery {
///     #[declaro(condition(op = "and", boost = 2))]
///     name: Option<String>,
///     #[declaro(condition(field = "age", op = "gte", join = "or"))]
///     min_age: Option<i32>,
/// }
/// ```
#[proc_macro_derive(SearchDescriptor, attributes(declaro))]
pub fn derive_search_descriptor(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match ParsedDescriptor::from_input(&input) {
        Ok(parsed) => parsed.emit().into(),
        Err(err) => err.to_compile_error().into(),
    }
}
