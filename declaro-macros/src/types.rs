use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{GenericArgument, PathArguments, Type, TypePath};

fn last_ident_str(path: &TypePath) -> Option<String> {
    path.path.segments.last().map(|seg| seg.ident.to_string())
}

/// Extract the type name from a Type (e.g., "Department" from `crate::Department`)
pub(crate) fn extract_type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => last_ident_str(path),
        Type::Reference(reference) => extract_type_name(&reference.elem),
        _ => None,
    }
}

/// First type argument of `Wrapper<T>` when the last path segment is one of `wrappers`.
fn unwrap_generic<'a>(ty: &'a Type, wrappers: &[&str]) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if !wrappers.iter().any(|wrapper| segment.ident == *wrapper) {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    }
}

pub(crate) fn unwrap_option(ty: &Type) -> Option<&Type> {
    unwrap_generic(ty, &["Option"])
}

/// Strips `Option`, `Box` and collection wrappers down to the element type.
pub(crate) fn element_type(ty: &Type) -> &Type {
    match unwrap_generic(ty, &["Option", "Box", "Vec", "HashSet", "BTreeSet"]) {
        Some(inner) => element_type(inner),
        None => ty,
    }
}

/// Expression building the `ValueType` of a Rust field type.
pub(crate) fn value_type_tokens(ty: &Type) -> TokenStream2 {
    if let Some(inner) = unwrap_option(ty) {
        let inner = value_type_tokens(inner);
        return quote! { ::declaro::types::ValueType::optional(#inner) };
    }
    if let Some(inner) = unwrap_generic(ty, &["Box"]) {
        return value_type_tokens(inner);
    }
    if let Some(inner) = unwrap_generic(ty, &["Vec", "HashSet", "BTreeSet"]) {
        if extract_type_name(inner).as_deref() == Some("u8") {
            return quote! { ::declaro::types::ValueType::Bytes };
        }
        let inner = value_type_tokens(inner);
        return quote! { ::declaro::types::ValueType::list(#inner) };
    }

    let name = extract_type_name(ty).unwrap_or_default();
    match name.as_str() {
        "bool" => quote! { ::declaro::types::ValueType::Bool },
        "i8" | "i16" | "i32" | "u8" | "u16" => quote! { ::declaro::types::ValueType::Int32 },
        "i64" | "u32" | "u64" | "isize" | "usize" => quote! { ::declaro::types::ValueType::Int64 },
        "f32" => quote! { ::declaro::types::ValueType::Float32 },
        "f64" => quote! { ::declaro::types::ValueType::Float64 },
        "String" | "str" => quote! { ::declaro::types::ValueType::Text },
        "DateTime" | "NaiveDateTime" | "NaiveDate" | "SystemTime" => quote! { ::declaro::types::ValueType::DateTime },
        "Value" => quote! { ::declaro::types::ValueType::Json },
        _ => quote! { ::declaro::types::ValueType::named(#name) },
    }
}
