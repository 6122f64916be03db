use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

use super::declaration::JoinOperator;

/// One node of a compiled clause tree, in the document-search query language.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryClause {
    Term {
        field: String,
        value: Value,
    },
    Terms {
        field: String,
        values: Vec<Value>,
    },
    Range {
        field: String,
        bound: &'static str,
        value: Value,
    },
    Match {
        field: String,
        query: Value,
        require_all: bool,
        minimum_should_match: Option<String>,
        boost: Option<u32>,
    },
    Missing {
        field: String,
    },
    Exists {
        field: String,
    },
    /// Non-empty groups only, in join-operator order.
    Bool(Vec<(JoinOperator, Vec<QueryClause>)>),
    ConstantScore(Box<QueryClause>),
}

impl QueryClause {
    pub fn to_value(&self) -> Value {
        match self {
            QueryClause::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            QueryClause::Terms { field, values } => json!({ "terms": { field.as_str(): values } }),
            QueryClause::Range { field, bound, value } => {
                json!({ "range": { field.as_str(): { *bound: value } } })
            }
            QueryClause::Match {
                field,
                query,
                require_all,
                minimum_should_match,
                boost,
            } => {
                let mut options = Map::new();
                options.insert("query".into(), query.clone());
                if *require_all {
                    options.insert("operator".into(), Value::from("and"));
                }
                if let Some(min_match) = minimum_should_match {
                    options.insert("minimum_should_match".into(), Value::from(min_match.as_str()));
                }
                if let Some(boost) = boost {
                    options.insert("boost".into(), Value::from(*boost));
                }
                json!({ "match": { field.as_str(): options } })
            }
            QueryClause::Missing { field } => json!({ "missing": { "field": field } }),
            QueryClause::Exists { field } => json!({ "exists": { "field": field } }),
            QueryClause::Bool(groups) => {
                let occurrences: Map<String, Value> = groups
                    .iter()
                    .map(|(operator, clauses)| {
                        let clauses = clauses.iter().map(QueryClause::to_value).collect();
                        (operator.backend_key().to_string(), Value::Array(clauses))
                    })
                    .collect();
                json!({ "bool": occurrences })
            }
            QueryClause::ConstantScore(filter) => json!({ "constant_score": { "filter": filter.to_value() } }),
        }
    }

    /// Request body accepted by the search endpoint.
    pub fn to_request_body(&self) -> Value {
        json!({ "query": self.to_value() })
    }

    pub fn is_empty_bool(&self) -> bool {
        matches!(self, QueryClause::Bool(groups) if groups.is_empty())
    }
}

impl Serialize for QueryClause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
