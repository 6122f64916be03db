use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::MetadataError;

/// Comparison applied by a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    #[default]
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Every token of an analyzed value must match.
    And,
    /// Any token of an analyzed value may match.
    Or,
}

impl ConditionOperator {
    /// Range bound name, for the four range operators.
    pub const fn range_key(self) -> Option<&'static str> {
        match self {
            ConditionOperator::Lt => Some("lt"),
            ConditionOperator::Lte => Some("lte"),
            ConditionOperator::Gt => Some("gt"),
            ConditionOperator::Gte => Some("gte"),
            ConditionOperator::Eq | ConditionOperator::And | ConditionOperator::Or => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ConditionOperator::Eq => "eq",
            ConditionOperator::Lt => "lt",
            ConditionOperator::Lte => "lte",
            ConditionOperator::Gt => "gt",
            ConditionOperator::Gte => "gte",
            ConditionOperator::And => "and",
            ConditionOperator::Or => "or",
        }
    }
}

impl FromStr for ConditionOperator {
    type Err = MetadataError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "eq" => Ok(ConditionOperator::Eq),
            "lt" => Ok(ConditionOperator::Lt),
            "lte" => Ok(ConditionOperator::Lte),
            "gt" => Ok(ConditionOperator::Gt),
            "gte" => Ok(ConditionOperator::Gte),
            "and" => Ok(ConditionOperator::And),
            "or" => Ok(ConditionOperator::Or),
            other => Err(MetadataError::configuration(format!("unknown condition operator `{other}`"))),
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical combinator grouping conditions. Ordering is the order groups are emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JoinOperator {
    #[default]
    #[serde(alias = "must")]
    And,
    #[serde(alias = "should")]
    Or,
    #[serde(alias = "must_not")]
    Not,
}

impl JoinOperator {
    pub const ALL: [JoinOperator; 3] = [JoinOperator::And, JoinOperator::Or, JoinOperator::Not];

    /// Boolean-occurrence key the search backend expects for this group.
    pub const fn backend_key(self) -> &'static str {
        match self {
            JoinOperator::And => "must",
            JoinOperator::Or => "should",
            JoinOperator::Not => "must_not",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            JoinOperator::And => "and",
            JoinOperator::Or => "or",
            JoinOperator::Not => "not",
        }
    }
}

impl FromStr for JoinOperator {
    type Err = MetadataError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "and" | "must" => Ok(JoinOperator::And),
            "or" | "should" => Ok(JoinOperator::Or),
            "not" | "must_not" => Ok(JoinOperator::Not),
            other => Err(MetadataError::configuration(format!("unknown join operator `{other}`"))),
        }
    }
}

impl fmt::Display for JoinOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class-level null or not-null check on an index field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullCheck {
    pub field: String,
    #[serde(default)]
    pub boost: u32,
    #[serde(default, rename = "join", alias = "join_operator")]
    pub join_operator: JoinOperator,
}

impl NullCheck {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            boost: 0,
            join_operator: JoinOperator::And,
        }
    }

    pub fn boost(mut self, boost: u32) -> Self {
        self.boost = boost;
        self
    }

    pub fn join(mut self, join_operator: JoinOperator) -> Self {
        self.join_operator = join_operator;
        self
    }
}

/// Condition marker on a descriptor property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SearchCondition {
    /// Index field; defaults to the property name when absent or blank.
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub op: ConditionOperator,
    #[serde(default, rename = "join", alias = "join_operator")]
    pub join_operator: JoinOperator,
    #[serde(default)]
    pub boost: u32,
    #[serde(default)]
    pub min_match: Option<String>,
}

impl SearchCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn op(mut self, op: ConditionOperator) -> Self {
        self.op = op;
        self
    }

    pub fn join(mut self, join_operator: JoinOperator) -> Self {
        self.join_operator = join_operator;
        self
    }

    pub fn boost(mut self, boost: u32) -> Self {
        self.boost = boost;
        self
    }

    pub fn min_match(mut self, min_match: impl Into<String>) -> Self {
        self.min_match = Some(min_match.into());
        self
    }
}

/// Sub-query marker: the property holds a nested descriptor evaluated as its own bool clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubqueryDeclaration {
    #[serde(default, rename = "join", alias = "join_operator")]
    pub join_operator: JoinOperator,
    pub declaration: Box<SearchQueryDeclaration>,
}

impl SubqueryDeclaration {
    pub fn new(join_operator: JoinOperator, declaration: SearchQueryDeclaration) -> Self {
        Self {
            join_operator,
            declaration: Box::new(declaration),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDeclaration {
    pub name: String,
    #[serde(default)]
    pub condition: Option<SearchCondition>,
    #[serde(default)]
    pub subquery: Option<SubqueryDeclaration>,
}

impl PropertyDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: None,
            subquery: None,
        }
    }

    pub fn condition(mut self, condition: SearchCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn subquery(mut self, subquery: SubqueryDeclaration) -> Self {
        self.subquery = Some(subquery);
        self
    }
}

/// Search descriptor declaration, emitted by `#[derive(SearchDescriptor)]` or read from a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQueryDeclaration {
    pub name: String,
    /// Index the descriptor targets. Types without one are not search queries.
    #[serde(default, rename = "index", alias = "index_type")]
    pub index_type: Option<String>,
    #[serde(default)]
    pub ignore_score: bool,
    #[serde(default)]
    pub null_fields: Vec<NullCheck>,
    #[serde(default)]
    pub not_null_fields: Vec<NullCheck>,
    #[serde(default)]
    pub properties: Vec<PropertyDeclaration>,
}

impl SearchQueryDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index_type: None,
            ignore_score: false,
            null_fields: Vec::new(),
            not_null_fields: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn index(mut self, index_type: impl Into<String>) -> Self {
        self.index_type = Some(index_type.into());
        self
    }

    pub fn ignore_score(mut self) -> Self {
        self.ignore_score = true;
        self
    }

    pub fn null_field(mut self, check: NullCheck) -> Self {
        self.null_fields.push(check);
        self
    }

    pub fn not_null_field(mut self, check: NullCheck) -> Self {
        self.not_null_fields.push(check);
        self
    }

    pub fn property(mut self, property: PropertyDeclaration) -> Self {
        self.properties.push(property);
        self
    }

    /// Property carrying a condition marker.
    pub fn condition(self, property: impl Into<String>, condition: SearchCondition) -> Self {
        self.property(PropertyDeclaration::new(property).condition(condition))
    }
}
