use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Storage type of an index field as the search backend sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexDataType {
    #[default]
    String,
    Long,
    Integer,
    Short,
    Byte,
    Double,
    Float,
    Boolean,
    Date,
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    /// Tokenized at index time; queried with full-text matching.
    #[default]
    Analyzed,
    /// Stored verbatim; queried with exact terms.
    NotAnalyzed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IndexFieldDetails {
    #[serde(default)]
    pub data_type: IndexDataType,
    #[serde(default)]
    pub index_type: IndexType,
    /// String values are stored lower-cased.
    #[serde(default)]
    pub ignore_case: bool,
}

impl IndexFieldDetails {
    /// Analyzed string field.
    pub fn text() -> Self {
        Self::default()
    }

    /// Not-analyzed string field.
    pub fn keyword() -> Self {
        Self {
            index_type: IndexType::NotAnalyzed,
            ..Self::default()
        }
    }

    pub fn of(data_type: IndexDataType) -> Self {
        Self {
            data_type,
            ..Self::default()
        }
    }

    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    /// Values are compared verbatim: anything other than an analyzed string.
    pub fn is_exact(&self) -> bool {
        self.data_type != IndexDataType::String || self.index_type == IndexType::NotAnalyzed
    }

    pub fn lowercases_values(&self) -> bool {
        self.data_type == IndexDataType::String && self.ignore_case
    }
}

/// Live field metadata of one index, consulted while evaluating compiled queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDetails {
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, IndexFieldDetails>,
}

impl IndexDetails {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, details: IndexFieldDetails) -> Self {
        self.fields.insert(name.into(), details);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&IndexFieldDetails> {
        self.fields.get(name)
    }
}
