use serde::Serialize;

use super::{SortOrder, TypeRef};
use crate::types::ValueType;

/// Concrete collection built for a collection-returning method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStrategy {
    Vec,
    HashSet,
    Custom(String),
}

/// Binds one entity field to an output property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultField {
    /// `None` for single-field scalar projections.
    pub property: Option<String>,
    pub property_type: ValueType,
    pub entity_field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderByField {
    pub field: String,
    pub order: SortOrder,
}

/// Compiled metadata for one query method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySchema {
    pub(super) method: String,
    #[serde(serialize_with = "serialize_type_ref")]
    pub(super) return_type: TypeRef,
    pub(super) collection: Option<CollectionStrategy>,
    pub(super) result_fields: Vec<ResultField>,
    pub(super) order_by: Vec<OrderByField>,
    pub(super) extended_field_param: Option<usize>,
}

fn serialize_type_ref<S: serde::Serializer>(value: &TypeRef, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.name())
}

impl QuerySchema {
    /// `Repository.method` this schema was compiled from.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Element type of the result (unwrapped from any collection).
    pub fn return_type(&self) -> &TypeRef {
        &self.return_type
    }

    pub fn collection(&self) -> Option<&CollectionStrategy> {
        self.collection.as_ref()
    }

    pub fn result_fields(&self) -> &[ResultField] {
        &self.result_fields
    }

    pub fn order_by(&self) -> &[OrderByField] {
        &self.order_by
    }

    /// Index of the parameter listing extension fields to fetch.
    pub fn extended_field_param(&self) -> Option<usize> {
        self.extended_field_param
    }

    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }
}
