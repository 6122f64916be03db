//! Query-method declarations and return-shape resolution.
//!
//! A [`QueryMethod`] describes a repository finder: what it returns and which markers it
//! carries. [`ReturnShapeResolver`] turns it into a [`QuerySchema`] at registration time so
//! shape errors never surface per call.

mod resolver;
mod schema;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::ValueType;

pub use resolver::{QuerySchemaCache, ReturnShapeResolver};
pub use schema::{CollectionStrategy, OrderByField, QuerySchema, ResultField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Container a collection-typed return or parameter is declared with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    /// Ordered sequence, or any generic collection a `Vec` satisfies.
    List,
    /// Set-like container a `HashSet` satisfies.
    Set,
    /// A concrete container type the caller names.
    Custom { name: String, default_constructible: bool },
}

/// Shape of a bean a query can project into.
#[derive(Debug, Clone, PartialEq)]
pub struct BeanShape {
    pub name: String,
    pub properties: Vec<BeanProperty>,
    /// Whether a sample instance can be built to validate explicit mappings.
    pub constructible: bool,
    /// Bean carries dynamically named extension fields.
    pub dynamic_result: bool,
}

impl BeanShape {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            constructible: true,
            dynamic_result: false,
        }
    }

    pub fn property(mut self, property: BeanProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn not_constructible(mut self) -> Self {
        self.constructible = false;
        self
    }

    pub fn dynamic_result(mut self) -> Self {
        self.dynamic_result = true;
        self
    }

    pub fn find_property(&self, name: &str) -> Option<&BeanProperty> {
        self.properties.iter().find(|property| property.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeanProperty {
    pub name: String,
    pub value_type: ValueType,
    /// Field-selection marker: `Some(None)` selects the field named like the property.
    pub field: Option<Option<String>>,
}

impl BeanProperty {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            field: None,
        }
    }

    /// Marks the property as a result field bound to the entity field of the same name.
    pub fn selected(mut self) -> Self {
        self.field = Some(None);
        self
    }

    /// Marks the property as a result field bound to `field`.
    pub fn selects(mut self, field: impl Into<String>) -> Self {
        self.field = Some(Some(field.into()));
        self
    }

    /// Entity field this property selects, if marked.
    pub fn selected_field(&self) -> Option<&str> {
        self.field.as_ref().map(|field| match field.as_deref() {
            Some(name) if !name.trim().is_empty() => name.trim(),
            _ => self.name.as_str(),
        })
    }
}

/// A type referenced from a method signature.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Value(ValueType),
    Bean(Arc<BeanShape>),
}

impl TypeRef {
    pub fn entity(name: impl Into<String>) -> Self {
        TypeRef::Value(ValueType::named(name))
    }

    pub fn bean(shape: BeanShape) -> Self {
        TypeRef::Bean(Arc::new(shape))
    }

    pub fn name(&self) -> String {
        match self {
            TypeRef::Value(ValueType::Named(name)) => name.clone(),
            TypeRef::Value(other) => other.to_string(),
            TypeRef::Bean(shape) => shape.name.clone(),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            TypeRef::Value(value_type) => value_type.clone(),
            TypeRef::Bean(shape) => ValueType::named(shape.name.clone()),
        }
    }

    pub fn as_bean(&self) -> Option<&BeanShape> {
        match self {
            TypeRef::Bean(shape) => Some(shape),
            TypeRef::Value(_) => None,
        }
    }

    pub fn is_dynamic_result(&self) -> bool {
        self.as_bean().is_some_and(|shape| shape.dynamic_result)
    }
}

impl From<ValueType> for TypeRef {
    fn from(value: ValueType) -> Self {
        TypeRef::Value(value)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Declared type of a return value or parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    Unit,
    Plain(TypeRef),
    Collection { container: Container, type_args: Vec<TypeRef> },
}

impl DeclaredType {
    pub fn plain(type_ref: impl Into<TypeRef>) -> Self {
        DeclaredType::Plain(type_ref.into())
    }

    pub fn list_of(element: impl Into<TypeRef>) -> Self {
        DeclaredType::Collection {
            container: Container::List,
            type_args: vec![element.into()],
        }
    }

    pub fn set_of(element: impl Into<TypeRef>) -> Self {
        DeclaredType::Collection {
            container: Container::Set,
            type_args: vec![element.into()],
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, DeclaredType::Collection { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMapping {
    pub property: String,
    pub entity_field: String,
}

/// Result-mapping marker. Without explicit mappings the bean's own field markers are used.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResultMarker {
    #[serde(default)]
    pub mappings: Vec<ResultMapping>,
}

impl SearchResultMarker {
    pub fn mapping(mut self, property: impl Into<String>, entity_field: impl Into<String>) -> Self {
        self.mappings.push(ResultMapping {
            property: property.into(),
            entity_field: entity_field.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByFieldMarker {
    pub name: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// Ordering marker: explicit field/direction pairs win over the bare ascending name list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderByMarker {
    #[serde(default)]
    pub fields: Vec<OrderByFieldMarker>,
    #[serde(default)]
    pub names: Vec<String>,
}

impl OrderByMarker {
    pub fn ascending<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: Vec::new(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, order: SortOrder) -> Self {
        self.fields.push(OrderByFieldMarker {
            name: name.into(),
            order,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodParam {
    pub name: String,
    pub declared_type: DeclaredType,
    /// Parameter supplies the extension field names to fetch.
    pub extended_field_names: bool,
}

impl MethodParam {
    pub fn new(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            extended_field_names: false,
        }
    }

    pub fn extended_field_names(mut self) -> Self {
        self.extended_field_names = true;
        self
    }
}

/// One finder method of a repository.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMethod {
    pub repository: String,
    pub name: String,
    /// Declared by the generic CRUD repository contract rather than the concrete repository.
    pub crud_contract: bool,
    pub return_type: DeclaredType,
    /// Field-selection marker: the method returns this single entity field.
    pub field: Option<String>,
    pub search_result: Option<SearchResultMarker>,
    pub order_by: Option<OrderByMarker>,
    pub params: Vec<MethodParam>,
}

impl QueryMethod {
    pub fn new(repository: impl Into<String>, name: impl Into<String>, return_type: DeclaredType) -> Self {
        Self {
            repository: repository.into(),
            name: name.into(),
            crud_contract: false,
            return_type,
            field: None,
            search_result: None,
            order_by: None,
            params: Vec::new(),
        }
    }

    pub fn crud_contract(mut self) -> Self {
        self.crud_contract = true;
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn search_result(mut self, marker: SearchResultMarker) -> Self {
        self.search_result = Some(marker);
        self
    }

    pub fn order_by(mut self, marker: OrderByMarker) -> Self {
        self.order_by = Some(marker);
        self
    }

    pub fn param(mut self, param: MethodParam) -> Self {
        self.params.push(param);
        self
    }

    /// `Repository.method`, used in every error raised for this method.
    pub fn description(&self) -> String {
        format!("{}.{}", self.repository, self.name)
    }
}

/// A repository: its entity, repository-wide markers and finder methods.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryDeclaration {
    pub name: String,
    pub entity: String,
    /// Inherited by methods that carry no result-mapping marker of their own.
    pub search_result: Option<SearchResultMarker>,
    /// Inherited by methods that carry no ordering marker of their own.
    pub order_by: Option<OrderByMarker>,
    pub methods: Vec<QueryMethod>,
}

impl RepositoryDeclaration {
    pub fn new(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            search_result: None,
            order_by: None,
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, method: QueryMethod) -> Self {
        self.methods.push(method);
        self
    }
}
