//! # Search-condition compilation
//!
//! A search descriptor is a type whose properties carry condition markers. Its declaration is
//! compiled once into a [`CompiledSearchQuery`], a tree of [`JoinGroup`]s holding
//! [`ConditionNode`]s. Each call to [`CompiledSearchQuery::build_query`] evaluates that tree
//! against a descriptor instance and the live [`IndexDetails`], producing a [`QueryClause`].
//!
//! ## Clause shapes
//!
//! | Field kind                      | Operator        | Clause                                  |
//! |---------------------------------|-----------------|-----------------------------------------|
//! | exact (non-string, not analyzed)| `Eq`, array     | `{"terms": {f: [..]}}`                  |
//! | exact                           | `Eq`, scalar    | `{"term": {f: v}}`                      |
//! | exact                           | `Lt`..`Gte`     | `{"range": {f: {"gte": v}}}`            |
//! | analyzed string                 | any             | `{"match": {f: {"query": v, ..}}}`      |
//! | null / not-null check           | n/a             | `{"missing": ..}` / `{"exists": ..}`    |
//!
//! Groups are emitted as `{"bool": {"must": [..], "should": [..], "must_not": [..]}}`.
//!
//! ```
//! use declaro::search::{
//!     CompiledSearchQuery, IndexDetails, IndexFieldDetails, SearchCondition, SearchQueryDeclaration,
//! };
//! use serde_json::json;
//!
//! let declaration = SearchQueryDeclaration::new("EmployeeQuery")
//!     .index("Employee")
//!     .condition("name", SearchCondition::new());
//! let index = IndexDetails::new("Employee").field("name", IndexFieldDetails::keyword());
//!
//! let compiled = CompiledSearchQuery::compile(&declaration).unwrap();
//! let clause = compiled.build_query(&json!({"name": "ada"}), &index).unwrap();
//! assert_eq!(clause.to_value(), json!({"bool": {"must": [{"term": {"name": "ada"}}]}}));
//! ```

mod clause;
mod compiler;
mod declaration;
mod index;

use std::any::TypeId;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::errors::MetadataResult;
use crate::registry::OnceCache;

pub use clause::QueryClause;
pub use compiler::{
    CompiledSearchQuery, ConditionNode, JoinGroup, LeafCondition, NullCheckCondition, NullMode, SubQueryCondition,
};
pub use declaration::{
    ConditionOperator, JoinOperator, NullCheck, PropertyDeclaration, SearchCondition, SearchQueryDeclaration,
    SubqueryDeclaration,
};
pub use index::{IndexDataType, IndexDetails, IndexFieldDetails, IndexType};

/// Implemented by `#[derive(SearchDescriptor)]`.
pub trait SearchDescriptor: Serialize + 'static {
    fn search_declaration() -> SearchQueryDeclaration;

    /// Compiles (once per type) and evaluates this descriptor against `index`.
    fn build_query(&self, index: &IndexDetails) -> MetadataResult<QueryClause>
    where
        Self: Sized,
    {
        SearchQueryRegistry::global().compiled::<Self>()?.build_query_for(self, index)
    }
}

/// Compiled search descriptors keyed by Rust type or by declared name.
#[derive(Default)]
pub struct SearchQueryRegistry {
    by_type: OnceCache<TypeId, CompiledSearchQuery>,
    by_name: OnceCache<String, CompiledSearchQuery>,
}

static GLOBAL_SEARCH_REGISTRY: Lazy<SearchQueryRegistry> = Lazy::new(SearchQueryRegistry::new);

impl SearchQueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static SearchQueryRegistry {
        &GLOBAL_SEARCH_REGISTRY
    }

    pub fn compiled<T: SearchDescriptor>(&self) -> MetadataResult<Arc<CompiledSearchQuery>> {
        self.by_type
            .get_or_try_init(TypeId::of::<T>(), || CompiledSearchQuery::compile(&T::search_declaration()))
    }

    /// Compiles and publishes a declaration under its name.
    pub fn register(&self, declaration: &SearchQueryDeclaration) -> MetadataResult<Arc<CompiledSearchQuery>> {
        self.by_name
            .get_or_try_init(declaration.name.clone(), || CompiledSearchQuery::compile(declaration))
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<CompiledSearchQuery>> {
        self.by_name.get(&name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct ByName {
        name: Option<String>,
    }

    impl SearchDescriptor for ByName {
        fn search_declaration() -> SearchQueryDeclaration {
            SearchQueryDeclaration::new("ByName")
                .index("Employee")
                .condition("name", SearchCondition::new())
        }
    }

    #[test]
    fn descriptor_types_compile_once() {
        let registry = SearchQueryRegistry::new();
        let first = registry.compiled::<ByName>().expect("compile");
        let second = registry.compiled::<ByName>().expect("compile again");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn descriptor_builds_from_instance() {
        let index = IndexDetails::new("Employee").field("name", IndexFieldDetails::keyword());
        let clause = ByName {
            name: Some("ada".into()),
        }
        .build_query(&index)
        .expect("query");
        assert_eq!(clause.to_value(), json!({"bool": {"must": [{"term": {"name": "ada"}}]}}));
    }

    #[test]
    fn registry_publishes_by_name() {
        let registry = SearchQueryRegistry::new();
        registry.register(&ByName::search_declaration()).expect("register");
        assert!(registry.lookup("ByName").is_some());
        assert!(registry.lookup("Other").is_none());
    }
}
