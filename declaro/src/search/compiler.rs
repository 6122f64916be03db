use log::{debug, trace};
use serde::Serialize;
use serde_json::Value;

use super::clause::QueryClause;
use super::declaration::{ConditionOperator, JoinOperator, SearchCondition, SearchQueryDeclaration};
use super::index::{IndexDetails, IndexFieldDetails};
use crate::errors::{MetadataError, MetadataResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullMode {
    /// Field must be absent: `missing`.
    Null,
    /// Field must be present: `exists`.
    NotNull,
}

/// Field comparison bound to one descriptor property.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafCondition {
    pub field: String,
    pub property: String,
    pub operator: ConditionOperator,
    pub boost: u32,
    pub min_match: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NullCheckCondition {
    pub field: String,
    pub mode: NullMode,
    pub boost: u32,
}

/// Nested descriptor held by `property`, compiled to its own groups.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQueryCondition {
    pub property: String,
    pub groups: Vec<JoinGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Leaf(LeafCondition),
    NullCheck(NullCheckCondition),
    SubQuery(SubQueryCondition),
}

/// Conditions sharing one join operator, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinGroup {
    pub operator: JoinOperator,
    pub conditions: Vec<ConditionNode>,
}

#[derive(Default)]
struct GroupsBuilder {
    groups: Vec<JoinGroup>,
}

impl GroupsBuilder {
    fn add(&mut self, operator: JoinOperator, node: ConditionNode) {
        match self.groups.iter_mut().find(|group| group.operator == operator) {
            Some(group) => group.conditions.push(node),
            None => self.groups.push(JoinGroup {
                operator,
                conditions: vec![node],
            }),
        }
    }

    fn finish(mut self) -> Vec<JoinGroup> {
        self.groups.sort_by_key(|group| group.operator);
        self.groups
    }
}

/// Compiled form of a search descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSearchQuery {
    name: String,
    index_type: String,
    ignore_score: bool,
    groups: Vec<JoinGroup>,
}

impl CompiledSearchQuery {
    pub fn compile(declaration: &SearchQueryDeclaration) -> MetadataResult<Self> {
        trace!("compiling search descriptor {}", declaration.name);

        let index_type = declaration
            .index_type
            .as_deref()
            .map(str::trim)
            .filter(|index| !index.is_empty())
            .ok_or_else(|| {
                MetadataError::invalid_argument(format!(
                    "specified type is not marked as search query - {}",
                    declaration.name
                ))
            })?
            .to_string();

        if declaration.properties.is_empty()
            && declaration.null_fields.is_empty()
            && declaration.not_null_fields.is_empty()
        {
            return Err(MetadataError::state(format!(
                "no properties found in search query type - {}",
                declaration.name
            )));
        }

        let mut groups = GroupsBuilder::default();
        for (checks, mode) in [
            (&declaration.null_fields, NullMode::Null),
            (&declaration.not_null_fields, NullMode::NotNull),
        ] {
            for check in checks {
                groups.add(
                    check.join_operator,
                    ConditionNode::NullCheck(NullCheckCondition {
                        field: check.field.clone(),
                        mode,
                        boost: check.boost,
                    }),
                );
            }
        }
        compile_properties(declaration, &mut groups)?;

        let compiled = Self {
            name: declaration.name.clone(),
            index_type,
            ignore_score: declaration.ignore_score,
            groups: groups.finish(),
        };
        debug!(
            "compiled search descriptor {} against index {} ({} groups)",
            compiled.name,
            compiled.index_type,
            compiled.groups.len()
        );
        Ok(compiled)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_type(&self) -> &str {
        &self.index_type
    }

    pub fn ignore_score(&self) -> bool {
        self.ignore_score
    }

    pub fn groups(&self) -> &[JoinGroup] {
        &self.groups
    }

    /// Evaluates the compiled conditions against the JSON form of a descriptor instance.
    pub fn build_query(&self, instance: &Value, index: &IndexDetails) -> MetadataResult<QueryClause> {
        if !instance.is_object() {
            return Err(MetadataError::invalid_argument(format!(
                "instance of search descriptor {} must serialize to an object",
                self.name
            )));
        }

        let clause = evaluate_groups(&self.groups, instance, index)?;
        Ok(if self.ignore_score {
            QueryClause::ConstantScore(Box::new(clause))
        } else {
            clause
        })
    }

    pub fn build_query_for<T: Serialize>(&self, instance: &T, index: &IndexDetails) -> MetadataResult<QueryClause> {
        let value = serde_json::to_value(instance)?;
        self.build_query(&value, index)
    }
}

fn compile_properties(declaration: &SearchQueryDeclaration, groups: &mut GroupsBuilder) -> MetadataResult<()> {
    for property in &declaration.properties {
        if let Some(subquery) = &property.subquery {
            let nested = compile_nested(&subquery.declaration)?;
            groups.add(
                subquery.join_operator,
                ConditionNode::SubQuery(SubQueryCondition {
                    property: property.name.clone(),
                    groups: nested,
                }),
            );
        }

        if let Some(condition) = &property.condition {
            groups.add(condition.join_operator, ConditionNode::Leaf(leaf(&property.name, condition)));
        }
    }
    Ok(())
}

/// Nested descriptors contribute only their property conditions.
fn compile_nested(declaration: &SearchQueryDeclaration) -> MetadataResult<Vec<JoinGroup>> {
    if declaration.properties.is_empty() {
        return Err(MetadataError::state(format!(
            "no properties found in sub-query type - {}",
            declaration.name
        )));
    }

    let mut groups = GroupsBuilder::default();
    compile_properties(declaration, &mut groups)?;
    Ok(groups.finish())
}

fn leaf(property: &str, condition: &SearchCondition) -> LeafCondition {
    let field = condition
        .field
        .as_deref()
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .unwrap_or(property);
    let min_match = condition
        .min_match
        .as_deref()
        .map(str::trim)
        .filter(|min_match| !min_match.is_empty())
        .map(str::to_string);

    LeafCondition {
        field: field.to_string(),
        property: property.to_string(),
        operator: condition.op,
        boost: condition.boost,
        min_match,
    }
}

fn evaluate_groups(groups: &[JoinGroup], instance: &Value, index: &IndexDetails) -> MetadataResult<QueryClause> {
    let mut occurrences = Vec::with_capacity(groups.len());

    for group in groups {
        let mut clauses = Vec::with_capacity(group.conditions.len());
        for node in &group.conditions {
            if let Some(clause) = evaluate_node(node, instance, index)? {
                clauses.push(clause);
            }
        }
        if !clauses.is_empty() {
            occurrences.push((group.operator, clauses));
        }
    }

    Ok(QueryClause::Bool(occurrences))
}

fn evaluate_node(node: &ConditionNode, instance: &Value, index: &IndexDetails) -> MetadataResult<Option<QueryClause>> {
    match node {
        ConditionNode::NullCheck(check) => {
            lookup_field(index, &check.field, "null check")?;
            let field = check.field.clone();
            Ok(Some(match check.mode {
                NullMode::Null => QueryClause::Missing { field },
                NullMode::NotNull => QueryClause::Exists { field },
            }))
        }
        ConditionNode::Leaf(leaf) => {
            let field = lookup_field(index, &leaf.field, &leaf.property)?;
            Ok(property_value(instance, &leaf.property).map(|value| leaf_clause(leaf, field, value)))
        }
        ConditionNode::SubQuery(subquery) => {
            let Some(nested) = property_value(instance, &subquery.property) else {
                return Ok(None);
            };
            if !nested.is_object() {
                return Err(MetadataError::state(format!(
                    "sub-query property '{}' does not hold an object",
                    subquery.property
                )));
            }
            evaluate_groups(&subquery.groups, nested, index).map(Some)
        }
    }
}

fn lookup_field<'i>(index: &'i IndexDetails, field: &str, property: &str) -> MetadataResult<&'i IndexFieldDetails> {
    index.get_field(field).ok_or_else(|| {
        MetadataError::state(format!(
            "invalid index field name '{field}' specified in search query property - {property}"
        ))
    })
}

fn property_value<'v>(instance: &'v Value, property: &str) -> Option<&'v Value> {
    instance.get(property).filter(|value| !value.is_null())
}

fn leaf_clause(leaf: &LeafCondition, details: &IndexFieldDetails, value: &Value) -> QueryClause {
    let value = if details.lowercases_values() {
        lower_case(value)
    } else {
        value.clone()
    };
    let field = leaf.field.clone();

    if details.is_exact() {
        return match (leaf.operator.range_key(), value) {
            (Some(bound), value) => QueryClause::Range { field, bound, value },
            (None, Value::Array(values)) => QueryClause::Terms { field, values },
            (None, value) => QueryClause::Term { field, value },
        };
    }

    QueryClause::Match {
        field,
        query: value,
        require_all: leaf.operator == ConditionOperator::And,
        minimum_should_match: leaf.min_match.clone(),
        boost: (leaf.boost > 0).then_some(leaf.boost),
    }
}

fn lower_case(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(text.to_lowercase()),
        Value::Array(items) => Value::Array(items.iter().map(lower_case).collect()),
        other => other.clone(),
    }
}
