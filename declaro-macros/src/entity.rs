use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::spanned::Spanned;
use syn::{Attribute, Data, DeriveInput, Error, Field, Fields, Ident, LitBool, LitStr, Result};

use crate::types::{element_type, extract_type_name, value_type_tokens};

pub(crate) struct ParsedEntity {
    name: Ident,
    table: Option<String>,
    extension_table: Option<String>,
    fields: Vec<ParsedField>,
}

struct ParsedField {
    name: String,
    value_type: TokenStream2,
    column: Option<String>,
    data_type: Option<TokenStream2>,
    id: bool,
    generation: Option<TokenStream2>,
    sequence: Option<String>,
    auto_fetch: bool,
    version: bool,
    nullable: Option<bool>,
    not_updateable: bool,
    relation: Option<RelationSpec>,
}

struct RelationSpec {
    target: String,
    kind: TokenStream2,
    mapped_by: Option<String>,
    join_table: Option<String>,
}

fn generation_tokens(lit: &LitStr) -> Result<TokenStream2> {
    let tokens = match lit.value().trim().to_ascii_lowercase().as_str() {
        "auto" => quote! { ::declaro::types::GenerationType::Auto },
        "identity" => quote! { ::declaro::types::GenerationType::Identity },
        "sequence" => quote! { ::declaro::types::GenerationType::Sequence },
        "table" => quote! { ::declaro::types::GenerationType::Table },
        other => {
            return Err(Error::new(
                lit.span(),
                format!("unknown generation `{other}`, expected auto, identity, sequence or table"),
            ));
        }
    };
    Ok(tokens)
}

fn relation_kind_tokens(lit: &LitStr) -> Result<TokenStream2> {
    let tokens = match lit.value().trim().to_ascii_lowercase().as_str() {
        "one_to_one" => quote! { ::declaro::types::RelationKind::OneToOne },
        "many_to_one" | "belongs_to" => quote! { ::declaro::types::RelationKind::ManyToOne },
        "one_to_many" | "has_many" => quote! { ::declaro::types::RelationKind::OneToMany },
        "many_to_many" => quote! { ::declaro::types::RelationKind::ManyToMany },
        other => return Err(Error::new(lit.span(), format!("unknown relation kind `{other}`"))),
    };
    Ok(tokens)
}

fn data_type_tokens(lit: &LitStr) -> Result<TokenStream2> {
    let tokens = match lit.value().trim().to_ascii_lowercase().as_str() {
        "boolean" | "bool" => quote! { ::declaro::types::DataType::Boolean },
        "int" | "integer" => quote! { ::declaro::types::DataType::Int },
        "long" | "bigint" => quote! { ::declaro::types::DataType::Long },
        "float" => quote! { ::declaro::types::DataType::Float },
        "double" => quote! { ::declaro::types::DataType::Double },
        "string" | "varchar" => quote! { ::declaro::types::DataType::String },
        "date" => quote! { ::declaro::types::DataType::Date },
        "date_time" | "datetime" | "timestamp" => quote! { ::declaro::types::DataType::DateTime },
        "clob" => quote! { ::declaro::types::DataType::Clob },
        "blob" => quote! { ::declaro::types::DataType::Blob },
        other => return Err(Error::new(lit.span(), format!("unknown data type `{other}`"))),
    };
    Ok(tokens)
}

impl ParsedEntity {
    pub(crate) fn from_input(input: &DeriveInput) -> Result<Self> {
        // inventory registration needs a concrete type to name
        if !input.generics.params.is_empty() {
            return Err(Error::new(input.generics.span(), "Entity cannot be derived for generic structs"));
        }

        let mut table = None;
        let mut extension_table = None;

        for attr in &input.attrs {
            if attr.path().is_ident("declaro") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("table") {
                        let value: LitStr = meta.value()?.parse()?;
                        table = Some(value.value());
                    } else if meta.path.is_ident("extension_table") {
                        let value: LitStr = meta.value()?.parse()?;
                        extension_table = Some(value.value());
                    } else {
                        return Err(meta.error("unsupported entity attribute, expected `table` or `extension_table`"));
                    }
                    Ok(())
                })?;
            }
        }

        let fields = match &input.data {
            Data::Struct(data) => match &data.fields {
                Fields::Named(named) => {
                    let mut parsed = Vec::new();
                    for field in &named.named {
                        if let Some(field) = ParsedField::from_field(field)? {
                            parsed.push(field);
                        }
                    }
                    parsed
                }
                _ => return Err(Error::new(input.ident.span(), "Entity requires named fields")),
            },
            _ => return Err(Error::new(input.ident.span(), "Entity can only be derived for structs")),
        };

        if fields.iter().filter(|field| field.id).count() > 1 {
            return Err(Error::new(input.ident.span(), "Entity allows at most one #[declaro(id)] field"));
        }

        Ok(Self {
            name: input.ident.clone(),
            table,
            extension_table,
            fields,
        })
    }

    pub(crate) fn emit(&self) -> TokenStream2 {
        let name = &self.name;
        let name_str = name.to_string();

        let table = self.table.as_ref().map(|table| quote! { .table(#table) });
        let extension_table = self
            .extension_table
            .as_ref()
            .map(|table| quote! { .extension_table(#table) });
        let fields = self.fields.iter().map(ParsedField::to_tokens);

        quote! {
            impl ::declaro::entity::EntityMetadata for #name {
                fn entity_declaration() -> ::declaro::entity::EntityDeclaration {
                    ::declaro::entity::EntityDeclaration::new(#name_str)
                        #table
                        #extension_table
                        #(.field(#fields))*
                }
            }

            ::declaro::inventory::submit! {
                ::declaro::registry::EntityRegistration {
                    type_id: || ::std::any::TypeId::of::<#name>(),
                    type_name: #name_str,
                    declaration_fn: <#name as ::declaro::entity::EntityMetadata>::entity_declaration,
                }
            }
        }
    }
}

impl ParsedField {
    /// `None` for fields marked `#[declaro(skip)]`.
    fn from_field(field: &Field) -> Result<Option<Self>> {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| Error::new(field.span(), "Entity requires named fields"))?;

        let mut parsed = Self {
            name: ident.to_string(),
            value_type: value_type_tokens(&field.ty),
            column: None,
            data_type: None,
            id: false,
            generation: None,
            sequence: None,
            auto_fetch: false,
            version: false,
            nullable: None,
            not_updateable: false,
            relation: None,
        };
        let mut skip = false;

        for attr in &field.attrs {
            if attr.path().is_ident("declaro") {
                parsed.parse_field_attr(attr, field, &mut skip)?;
            }
        }

        if parsed.id && parsed.version {
            return Err(Error::new(ident.span(), "a field cannot be both #[declaro(id)] and #[declaro(version)]"));
        }
        if parsed.sequence.is_some() && parsed.generation.is_none() {
            parsed.generation = Some(quote! { ::declaro::types::GenerationType::Sequence });
        }

        Ok((!skip).then_some(parsed))
    }

    fn parse_field_attr(&mut self, attr: &Attribute, field: &Field, skip: &mut bool) -> Result<()> {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                *skip = true;
            } else if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                self.name = value.value();
            } else if meta.path.is_ident("id") {
                if self.id {
                    return Err(meta.error("field already marked as #[declaro(id)]"));
                }
                self.id = true;
            } else if meta.path.is_ident("generated") {
                let value: LitStr = meta.value()?.parse()?;
                self.generation = Some(generation_tokens(&value)?);
            } else if meta.path.is_ident("sequence") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().trim().is_empty() {
                    return Err(meta.error("sequence name must not be blank"));
                }
                self.sequence = Some(value.value());
            } else if meta.path.is_ident("column") {
                let value: LitStr = meta.value()?.parse()?;
                self.column = Some(value.value());
            } else if meta.path.is_ident("data_type") {
                let value: LitStr = meta.value()?.parse()?;
                self.data_type = Some(data_type_tokens(&value)?);
            } else if meta.path.is_ident("version") {
                self.version = true;
            } else if meta.path.is_ident("nullable") {
                self.nullable = Some(parse_optional_bool(&meta)?);
            } else if meta.path.is_ident("not_updateable") {
                self.not_updateable = true;
            } else if meta.path.is_ident("auto_fetch") {
                self.auto_fetch = true;
            } else if meta.path.is_ident("relation") {
                self.relation = Some(parse_relation(&meta, field)?);
            } else {
                return Err(meta.error("unsupported field attribute"));
            }
            Ok(())
        })
    }

    fn to_tokens(&self) -> TokenStream2 {
        let name = &self.name;
        let value_type = &self.value_type;

        let mut chain = vec![quote! { ::declaro::entity::FieldDeclaration::new(#name, #value_type) }];
        if let Some(column) = &self.column {
            chain.push(quote! { .column(#column) });
        }
        if let Some(data_type) = &self.data_type {
            chain.push(quote! { .data_type(#data_type) });
        }
        if self.id {
            chain.push(quote! { .id() });
        }
        if let Some(generation) = &self.generation {
            chain.push(quote! { .generated(#generation) });
        }
        if let Some(sequence) = &self.sequence {
            chain.push(quote! { .sequence(#sequence) });
        }
        if self.auto_fetch {
            chain.push(quote! { .auto_fetch() });
        }
        if self.version {
            chain.push(quote! { .version() });
        }
        if let Some(nullable) = self.nullable {
            chain.push(quote! { .nullable(#nullable) });
        }
        if self.not_updateable {
            chain.push(quote! { .not_updateable() });
        }
        if let Some(relation) = &self.relation {
            let target = &relation.target;
            let kind = &relation.kind;
            let mapped_by = relation.mapped_by.as_ref().map(|field| quote! { .mapped_by(#field) });
            let join_table = relation.join_table.as_ref().map(|table| quote! { .join_table(#table) });
            chain.push(quote! {
                .relation(
                    ::declaro::entity::RelationDeclaration::new(#target, #kind)
                        #mapped_by
                        #join_table
                )
            });
        }

        quote! { #(#chain)* }
    }
}

/// `flag` or `flag = true/false`.
fn parse_optional_bool(meta: &ParseNestedMeta<'_>) -> Result<bool> {
    if meta.input.peek(syn::Token![=]) {
        let value: LitBool = meta.value()?.parse()?;
        Ok(value.value)
    } else {
        Ok(true)
    }
}

fn parse_relation(meta: &ParseNestedMeta<'_>, field: &Field) -> Result<RelationSpec> {
    let mut target = extract_type_name(element_type(&field.ty));
    let mut kind = quote! { ::declaro::types::RelationKind::ManyToOne };
    let mut mapped_by = None;
    let mut join_table = None;

    if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|item| {
            if item.path.is_ident("target") {
                let value: LitStr = item.value()?.parse()?;
                target = Some(value.value());
            } else if item.path.is_ident("kind") {
                let value: LitStr = item.value()?.parse()?;
                kind = relation_kind_tokens(&value)?;
            } else if item.path.is_ident("mapped_by") {
                let value: LitStr = item.value()?.parse()?;
                mapped_by = Some(value.value());
            } else if item.path.is_ident("join_table") {
                let value: LitStr = item.value()?.parse()?;
                join_table = Some(value.value());
            } else {
                return Err(item.error("unsupported relation option, expected target, kind, mapped_by or join_table"));
            }
            Ok(())
        })?;
    }

    let target = target.ok_or_else(|| meta.error("unable to infer relation target, add `target = \"...\"`"))?;
    Ok(RelationSpec {
        target,
        kind,
        mapped_by,
        join_table,
    })
}
