use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::spanned::Spanned;
use syn::{Data, DeriveInput, Error, Field, Fields, Ident, LitInt, LitStr, Result, Type};

use crate::types::{element_type, extract_type_name, unwrap_option};

pub(crate) struct ParsedDescriptor {
    name: Ident,
    index: Option<String>,
    ignore_score: bool,
    null_fields: Vec<NullCheckSpec>,
    not_null_fields: Vec<NullCheckSpec>,
    properties: Vec<PropertySpec>,
}

struct NullCheckSpec {
    field: String,
    boost: u32,
    join: TokenStream2,
}

struct ConditionSpec {
    field: Option<String>,
    op: TokenStream2,
    join: TokenStream2,
    boost: u32,
    min_match: Option<String>,
}

struct PropertySpec {
    name: String,
    condition: Option<ConditionSpec>,
    subquery: Option<(TokenStream2, Type)>,
}

fn join_tokens(lit: &LitStr) -> Result<TokenStream2> {
    let tokens = match lit.value().trim().to_ascii_lowercase().as_str() {
        "and" | "must" => quote! { ::declaro::search::JoinOperator::And },
        "or" | "should" => quote! { ::declaro::search::JoinOperator::Or },
        "not" | "must_not" => quote! { ::declaro::search::JoinOperator::Not },
        other => {
            return Err(Error::new(
                lit.span(),
                format!("unknown join operator `{other}`, expected and, or or not"),
            ));
        }
    };
    Ok(tokens)
}

fn operator_tokens(lit: &LitStr) -> Result<TokenStream2> {
    let tokens = match lit.value().trim().to_ascii_lowercase().as_str() {
        "eq" => quote! { ::declaro::search::ConditionOperator::Eq },
        "lt" => quote! { ::declaro::search::ConditionOperator::Lt },
        "lte" => quote! { ::declaro::search::ConditionOperator::Lte },
        "gt" => quote! { ::declaro::search::ConditionOperator::Gt },
        "gte" => quote! { ::declaro::search::ConditionOperator::Gte },
        "and" => quote! { ::declaro::search::ConditionOperator::And },
        "or" => quote! { ::declaro::search::ConditionOperator::Or },
        other => return Err(Error::new(lit.span(), format!("unknown condition operator `{other}`"))),
    };
    Ok(tokens)
}

fn default_join() -> TokenStream2 {
    quote! { ::declaro::search::JoinOperator::And }
}

fn parse_null_check(meta: &ParseNestedMeta<'_>) -> Result<NullCheckSpec> {
    let mut field = None;
    let mut boost = 0u32;
    let mut join = default_join();

    meta.parse_nested_meta(|item| {
        if item.path.is_ident("field") {
            let value: LitStr = item.value()?.parse()?;
            field = Some(value.value());
        } else if item.path.is_ident("boost") {
            let value: LitInt = item.value()?.parse()?;
            boost = value.base10_parse()?;
        } else if item.path.is_ident("join") {
            let value: LitStr = item.value()?.parse()?;
            join = join_tokens(&value)?;
        } else {
            return Err(item.error("unsupported null check option, expected field, boost or join"));
        }
        Ok(())
    })?;

    let field = field.ok_or_else(|| meta.error("null checks require `field = \"...\"`"))?;
    Ok(NullCheckSpec { field, boost, join })
}

fn parse_condition(meta: &ParseNestedMeta<'_>) -> Result<ConditionSpec> {
    let mut spec = ConditionSpec {
        field: None,
        op: quote! { ::declaro::search::ConditionOperator::Eq },
        join: default_join(),
        boost: 0,
        min_match: None,
    };
    if !meta.input.peek(syn::token::Paren) {
        return Ok(spec);
    }

    meta.parse_nested_meta(|item| {
        if item.path.is_ident("field") {
            let value: LitStr = item.value()?.parse()?;
            spec.field = Some(value.value());
        } else if item.path.is_ident("op") {
            let value: LitStr = item.value()?.parse()?;
            spec.op = operator_tokens(&value)?;
        } else if item.path.is_ident("join") {
            let value: LitStr = item.value()?.parse()?;
            spec.join = join_tokens(&value)?;
        } else if item.path.is_ident("boost") {
            let value: LitInt = item.value()?.parse()?;
            spec.boost = value.base10_parse()?;
        } else if item.path.is_ident("min_match") {
            let value: LitStr = item.value()?.parse()?;
            spec.min_match = Some(value.value());
        } else {
            return Err(item.error("unsupported condition option, expected field, op, join, boost or min_match"));
        }
        Ok(())
    })?;
    Ok(spec)
}

impl ParsedDescriptor {
    pub(crate) fn from_input(input: &DeriveInput) -> Result<Self> {
        if !input.generics.params.is_empty() {
            return Err(Error::new(
                input.generics.span(),
                "SearchDescriptor cannot be derived for generic structs",
            ));
        }

        let mut parsed = Self {
            name: input.ident.clone(),
            index: None,
            ignore_score: false,
            null_fields: Vec::new(),
            not_null_fields: Vec::new(),
            properties: Vec::new(),
        };

        for attr in &input.attrs {
            if attr.path().is_ident("declaro") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("index") {
                        let value: LitStr = meta.value()?.parse()?;
                        parsed.index = Some(value.value());
                    } else if meta.path.is_ident("ignore_score") {
                        parsed.ignore_score = true;
                    } else if meta.path.is_ident("null_field") {
                        parsed.null_fields.push(parse_null_check(&meta)?);
                    } else if meta.path.is_ident("not_null_field") {
                        parsed.not_null_fields.push(parse_null_check(&meta)?);
                    } else {
                        return Err(meta.error(
                            "unsupported descriptor attribute, expected index, ignore_score, null_field or not_null_field",
                        ));
                    }
                    Ok(())
                })?;
            }
        }

        let fields = match &input.data {
            Data::Struct(data) => match &data.fields {
                Fields::Named(named) => &named.named,
                _ => return Err(Error::new(input.ident.span(), "SearchDescriptor requires named fields")),
            },
            _ => {
                return Err(Error::new(
                    input.ident.span(),
                    "SearchDescriptor can only be derived for structs",
                ));
            }
        };

        for field in fields {
            if let Some(property) = PropertySpec::from_field(field)? {
                property.reject_self_reference(&parsed.name)?;
                parsed.properties.push(property);
            }
        }

        Ok(parsed)
    }

    pub(crate) fn emit(&self) -> TokenStream2 {
        let name = &self.name;
        let name_str = name.to_string();

        let index = self.index.as_ref().map(|index| quote! { .index(#index) });
        let ignore_score = self.ignore_score.then(|| quote! { .ignore_score() });
        let null_fields = self.null_fields.iter().map(|check| check.to_tokens(quote! { null_field }));
        let not_null_fields = self.not_null_fields.iter().map(|check| check.to_tokens(quote! { not_null_field }));
        let properties = self.properties.iter().map(PropertySpec::to_tokens);

        quote! {
            impl ::declaro::search::SearchDescriptor for #name {
                fn search_declaration() -> ::declaro::search::SearchQueryDeclaration {
                    ::declaro::search::SearchQueryDeclaration::new(#name_str)
                        #index
                        #ignore_score
                        #(#null_fields)*
                        #(#not_null_fields)*
                        #(.property(#properties))*
                }
            }
        }
    }
}

impl NullCheckSpec {
    fn to_tokens(&self, method: TokenStream2) -> TokenStream2 {
        let field = &self.field;
        let boost = self.boost;
        let join = &self.join;
        quote! {
            .#method(::declaro::search::NullCheck::new(#field).boost(#boost).join(#join))
        }
    }
}

impl PropertySpec {
    /// `None` for fields carrying neither a condition nor a sub-query marker.
    fn from_field(field: &Field) -> Result<Option<Self>> {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| Error::new(field.span(), "SearchDescriptor requires named fields"))?;

        let mut name = ident.to_string();
        let mut condition = None;
        let mut subquery = None;

        for attr in &field.attrs {
            if !attr.path().is_ident("declaro") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let value: LitStr = meta.value()?.parse()?;
                    name = value.value();
                } else if meta.path.is_ident("condition") {
                    condition = Some(parse_condition(&meta)?);
                } else if meta.path.is_ident("subquery") {
                    let mut join = default_join();
                    if meta.input.peek(syn::token::Paren) {
                        meta.parse_nested_meta(|item| {
                            if item.path.is_ident("join") {
                                let value: LitStr = item.value()?.parse()?;
                                join = join_tokens(&value)?;
                                Ok(())
                            } else {
                                Err(item.error("unsupported subquery option, expected join"))
                            }
                        })?;
                    }
                    let nested = unwrap_option(&field.ty).unwrap_or(&field.ty).clone();
                    subquery = Some((join, nested));
                } else {
                    return Err(meta.error("unsupported property attribute, expected condition, subquery or rename"));
                }
                Ok(())
            })?;
        }

        if condition.is_none() && subquery.is_none() {
            return Ok(None);
        }
        Ok(Some(Self {
            name,
            condition,
            subquery,
        }))
    }

    /// A descriptor nested in itself would expand its declaration without end.
    fn reject_self_reference(&self, descriptor: &Ident) -> Result<()> {
        let Some((_, nested)) = &self.subquery else {
            return Ok(());
        };
        match extract_type_name(element_type(nested)) {
            Some(name) if name == "Self" || *descriptor == name => Err(Error::new(
                nested.span(),
                format!("sub-query `{}` of {descriptor} cannot nest the descriptor itself", self.name),
            )),
            _ => Ok(()),
        }
    }

    fn to_tokens(&self) -> TokenStream2 {
        let name = &self.name;
        let condition = self.condition.as_ref().map(|spec| {
            let op = &spec.op;
            let join = &spec.join;
            let boost = spec.boost;
            let field = spec.field.as_ref().map(|field| quote! { .field(#field) });
            let min_match = spec.min_match.as_ref().map(|min_match| quote! { .min_match(#min_match) });
            quote! {
                .condition(
                    ::declaro::search::SearchCondition::new()
                        .op(#op)
                        .join(#join)
                        .boost(#boost)
                        #field
                        #min_match
                )
            }
        });
        let subquery = self.subquery.as_ref().map(|(join, nested)| {
            quote! {
                .subquery(::declaro::search::SubqueryDeclaration::new(
                    #join,
                    <#nested as ::declaro::search::SearchDescriptor>::search_declaration(),
                ))
            }
        });

        quote! {
            ::declaro::search::PropertyDeclaration::new(#name)
                #condition
                #subquery
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_parses_conditions_and_subqueries() {
        let input: DeriveInput = parse_quote! {
            #[declaro(index = "Employee", ignore_score)]
            struct EmployeeQuery {
                #[declaro(condition(field = "dept", op = "gte", join = "or", boost = 2, min_match = "1"))]
                department: Option<String>,
                #[declaro(subquery)]
                location: Option<LocationQuery>,
                untracked: String,
            }
        };

        let parsed = ParsedDescriptor::from_input(&input).expect("parses");
        assert_eq!(parsed.index.as_deref(), Some("Employee"));
        assert!(parsed.ignore_score);
        assert_eq!(parsed.properties.len(), 2);

        let condition = parsed.properties[0].condition.as_ref().expect("condition");
        assert_eq!(condition.field.as_deref(), Some("dept"));
        assert_eq!(condition.boost, 2);
        assert_eq!(condition.min_match.as_deref(), Some("1"));
        assert!(parsed.properties[1].subquery.is_some());
    }

    #[test]
    fn test_rejects_descriptor_nested_in_itself() {
        let direct: DeriveInput = parse_quote! {
            #[declaro(index = "Employee")]
            struct TreeQuery {
                #[declaro(subquery(join = "or"))]
                parent: Option<Box<TreeQuery>>,
            }
        };
        let err = ParsedDescriptor::from_input(&direct).err().expect("self reference");
        assert!(err.to_string().contains("cannot nest the descriptor itself"));

        let via_self: DeriveInput = parse_quote! {
            struct TreeQuery {
                #[declaro(subquery)]
                children: Vec<Self>,
            }
        };
        assert!(ParsedDescriptor::from_input(&via_self).is_err());
    }

    #[test]
    fn test_rejects_unknown_join_operator() {
        let input: DeriveInput = parse_quote! {
            struct Query {
                #[declaro(condition(join = "xor"))]
                name: Option<String>,
            }
        };
        let err = ParsedDescriptor::from_input(&input).err().expect("bad join");
        assert!(err.to_string().contains("unknown join operator `xor`"));
    }
}
