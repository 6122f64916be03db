//! TOML manifests: entity, index, repository and search-descriptor declarations in one file.
//!
//! ```toml
//! [[entities]]
//! name = "Employee"
//! fields = [
//!     { name = "id", type = "i64", id = true },
//!     { name = "name", type = "String" },
//! ]
//!
//! [[repositories]]
//! name = "EmployeeRepository"
//! entity = "Employee"
//!
//! [[repositories.methods]]
//! name = "findAll"
//! returns = "Vec<Employee>"
//! order_by = { names = ["name"] }
//! ```
//!
//! Return and parameter types use Rust syntax. `()` is the unit return, `Vec<T>` / `List<T>`
//! and `HashSet<T>` / `Set<T>` are the built-in containers, any other generic is a custom
//! container. Type names matching a `[[beans]]` entry resolve to that bean.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{EntityDeclaration, EntityDetails};
use crate::errors::{MetadataError, MetadataResult};
use crate::query::{
    BeanProperty, BeanShape, Container, DeclaredType, MethodParam, OrderByMarker, QueryMethod, QuerySchema,
    QuerySchemaCache, RepositoryDeclaration, SearchResultMarker, TypeRef,
};
use crate::registry::EntityRegistry;
use crate::search::{CompiledSearchQuery, IndexDetails, QueryClause, SearchQueryDeclaration, SearchQueryRegistry};
use crate::types::ValueType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub entities: Vec<EntityDeclaration>,
    #[serde(default)]
    pub indexes: Vec<IndexDetails>,
    #[serde(default)]
    pub beans: Vec<BeanManifest>,
    /// Custom containers that cannot be default-constructed.
    #[serde(default)]
    pub opaque_containers: Vec<String>,
    #[serde(default)]
    pub repositories: Vec<RepositoryManifest>,
    #[serde(default)]
    pub search_queries: Vec<SearchQueryDeclaration>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeanManifest {
    pub name: String,
    #[serde(default = "default_true")]
    pub constructible: bool,
    #[serde(default)]
    pub dynamic_result: bool,
    #[serde(default)]
    pub properties: Vec<BeanPropertyManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeanPropertyManifest {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Marks the property as a result field; blank selects the field of the same name.
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryManifest {
    pub name: String,
    pub entity: String,
    #[serde(default)]
    pub search_result: Option<SearchResultMarker>,
    #[serde(default)]
    pub order_by: Option<OrderByMarker>,
    #[serde(default)]
    pub methods: Vec<MethodManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodManifest {
    pub name: String,
    pub returns: String,
    /// Declared by the generic CRUD contract.
    #[serde(default)]
    pub crud: bool,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub search_result: Option<SearchResultMarker>,
    #[serde(default)]
    pub order_by: Option<OrderByMarker>,
    #[serde(default)]
    pub params: Vec<ParamManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamManifest {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
    #[serde(default)]
    pub extended_field_names: bool,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();
        trace!("loading manifest {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> MetadataResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Bean shapes by name.
    fn bean_shapes(&self) -> MetadataResult<HashMap<String, Arc<BeanShape>>> {
        let mut shapes = HashMap::with_capacity(self.beans.len());
        for bean in &self.beans {
            let mut shape = BeanShape::new(bean.name.clone());
            shape.constructible = bean.constructible;
            shape.dynamic_result = bean.dynamic_result;
            for property in &bean.properties {
                let declared = BeanProperty::new(property.name.clone(), property.value_type.clone());
                shape = shape.property(match &property.field {
                    Some(field) => declared.selects(field.clone()),
                    None => declared,
                });
            }
            if shapes.insert(bean.name.clone(), Arc::new(shape)).is_some() {
                return Err(MetadataError::configuration(format!("bean {} is declared more than once", bean.name)));
            }
        }
        Ok(shapes)
    }

    /// Repository declarations with every type string resolved.
    pub fn repository_declarations(&self) -> MetadataResult<Vec<RepositoryDeclaration>> {
        let resolver = TypeResolver {
            beans: self.bean_shapes()?,
            opaque_containers: &self.opaque_containers,
        };

        self.repositories
            .iter()
            .map(|repository| {
                let mut declaration = RepositoryDeclaration::new(repository.name.clone(), repository.entity.clone());
                declaration.search_result = repository.search_result.clone();
                declaration.order_by = repository.order_by.clone();
                for method in &repository.methods {
                    declaration = declaration.method(resolver.method(&repository.name, method)?);
                }
                Ok(declaration)
            })
            .collect()
    }

    /// Repository, method and search-query names key the compile caches, so each must be unique.
    fn check_unique_names(&self) -> MetadataResult<()> {
        let mut repositories = HashSet::with_capacity(self.repositories.len());
        for repository in &self.repositories {
            if !repositories.insert(repository.name.as_str()) {
                return Err(MetadataError::configuration(format!(
                    "repository {} is declared more than once",
                    repository.name
                )));
            }
            let mut methods = HashSet::with_capacity(repository.methods.len());
            for method in &repository.methods {
                if !methods.insert(method.name.as_str()) {
                    return Err(MetadataError::configuration(format!(
                        "method {}.{} is declared more than once",
                        repository.name, method.name
                    )));
                }
            }
        }

        let mut searches = HashSet::with_capacity(self.search_queries.len());
        for declaration in &self.search_queries {
            if !searches.insert(declaration.name.as_str()) {
                return Err(MetadataError::configuration(format!(
                    "search query {} is declared more than once",
                    declaration.name
                )));
            }
        }
        Ok(())
    }

    /// Registers every entity, resolves every query method and compiles every search descriptor.
    pub fn compile(&self) -> MetadataResult<CompiledManifest> {
        let entities = EntityRegistry::new();
        let mut seen = HashSet::with_capacity(self.entities.len());
        for declaration in &self.entities {
            if !seen.insert(declaration.name.as_str()) {
                return Err(MetadataError::configuration(format!(
                    "entity {} is declared more than once",
                    declaration.name
                )));
            }
            entities.register(declaration)?;
        }

        self.check_unique_names()?;

        let schema_cache = QuerySchemaCache::new();
        let mut schemas = Vec::new();
        for repository in self.repository_declarations()? {
            let entity = entities.lookup(&repository.entity).ok_or_else(|| {
                MetadataError::mapping(format!(
                    "repository {} manages unknown entity {}",
                    repository.name, repository.entity
                ))
            })?;
            schemas.extend(schema_cache.resolve_repository(&entity, &repository)?);
        }

        let search = SearchQueryRegistry::new();
        let search_queries = self
            .search_queries
            .iter()
            .map(|declaration| search.register(declaration))
            .collect::<MetadataResult<Vec<_>>>()?;

        let entities = self
            .entities
            .iter()
            .filter_map(|declaration| entities.lookup(&declaration.name))
            .collect::<Vec<_>>();

        debug!(
            "compiled manifest: {} entities, {} query methods, {} search descriptors",
            entities.len(),
            schemas.len(),
            search_queries.len()
        );

        Ok(CompiledManifest {
            entities,
            schemas,
            search_queries,
            indexes: self.indexes.iter().map(|index| (index.name.clone(), index.clone())).collect(),
        })
    }
}

struct TypeResolver<'m> {
    beans: HashMap<String, Arc<BeanShape>>,
    opaque_containers: &'m [String],
}

impl TypeResolver<'_> {
    fn method(&self, repository: &str, method: &MethodManifest) -> MetadataResult<QueryMethod> {
        let mut query = QueryMethod::new(repository, method.name.clone(), self.declared_type(&method.returns)?);
        query.crud_contract = method.crud;
        query.field = method.field.clone();
        query.search_result = method.search_result.clone();
        query.order_by = method.order_by.clone();
        for param in &method.params {
            let mut declared = MethodParam::new(param.name.clone(), self.declared_type(&param.declared_type)?);
            declared.extended_field_names = param.extended_field_names;
            query = query.param(declared);
        }
        Ok(query)
    }

    fn declared_type(&self, raw: &str) -> MetadataResult<DeclaredType> {
        let raw = raw.trim();
        if raw == "()" {
            return Ok(DeclaredType::Unit);
        }

        let Some((outer, args)) = split_generic(raw) else {
            return Ok(DeclaredType::Plain(self.type_ref(raw)?));
        };

        let container = match outer {
            // optional wrappers are transparent to return shapes
            "Option" => {
                return match args.as_slice() {
                    [inner] if self.beans.contains_key(*inner) => Ok(DeclaredType::Plain(self.type_ref(inner)?)),
                    _ => Ok(DeclaredType::Plain(self.type_ref(raw)?)),
                };
            }
            "Vec" | "List" | "Collection" | "Iterable" => Container::List,
            "HashSet" | "BTreeSet" | "Set" => Container::Set,
            custom => Container::Custom {
                name: custom.to_string(),
                default_constructible: !self.opaque_containers.iter().any(|name| name == custom),
            },
        };
        let type_args = args
            .into_iter()
            .map(|arg| self.type_ref(arg))
            .collect::<MetadataResult<Vec<_>>>()?;
        Ok(DeclaredType::Collection { container, type_args })
    }

    fn type_ref(&self, raw: &str) -> MetadataResult<TypeRef> {
        match self.beans.get(raw) {
            Some(shape) => Ok(TypeRef::Bean(Arc::clone(shape))),
            None => Ok(TypeRef::Value(raw.parse()?)),
        }
    }
}

/// `Outer<A, B>` into `("Outer", ["A", "B"])`, splitting only on top-level commas.
fn split_generic(raw: &str) -> Option<(&str, Vec<&str>)> {
    let open = raw.find('<')?;
    let inner = raw.strip_suffix('>')?.get(open + 1..)?;
    let outer = raw[..open].trim();

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in inner.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(inner[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() || !args.is_empty() {
        args.push(last);
    }
    Some((outer, args))
}

/// Everything a manifest compiles to.
#[derive(Debug)]
pub struct CompiledManifest {
    pub entities: Vec<Arc<EntityDetails>>,
    pub schemas: Vec<Arc<QuerySchema>>,
    pub search_queries: Vec<Arc<CompiledSearchQuery>>,
    pub indexes: BTreeMap<String, IndexDetails>,
}

impl CompiledManifest {
    pub fn entity(&self, name: &str) -> Option<&EntityDetails> {
        self.entities.iter().find(|entity| entity.entity_type() == name).map(Arc::as_ref)
    }

    /// Schema of `Repository.method`.
    pub fn schema(&self, repository: &str, method: &str) -> Option<&QuerySchema> {
        let description = format!("{repository}.{method}");
        self.schemas
            .iter()
            .find(|schema| schema.method() == description)
            .map(Arc::as_ref)
    }

    pub fn search_query(&self, name: &str) -> Option<&CompiledSearchQuery> {
        self.search_queries.iter().find(|query| query.name() == name).map(Arc::as_ref)
    }

    /// Evaluates the named descriptor against the index it targets.
    pub fn build_search(&self, descriptor: &str, instance: &Value) -> MetadataResult<QueryClause> {
        let query = self.search_query(descriptor).ok_or_else(|| {
            MetadataError::invalid_argument(format!("no search descriptor named {descriptor} in manifest"))
        })?;
        let index = self.indexes.get(query.index_type()).ok_or_else(|| {
            MetadataError::mapping(format!(
                "search descriptor {} targets undeclared index {}",
                descriptor,
                query.index_type()
            ))
        })?;
        query.build_query(instance, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CollectionStrategy;
    use serde_json::json;

    const MANIFEST: &str = r#"
        opaque_containers = ["Opaque"]

        [[entities]]
        name = "Employee"
        table = "EMPLOYEE"
        fields = [
            { name = "id", type = "i64", id = true, generation = "sequence", sequence = "EMP_SEQ" },
            { name = "name", type = "String", column = "EMP_NAME" },
            { name = "salary", type = "Option<f64>" },
        ]

        [[beans]]
        name = "Summary"
        properties = [
            { name = "fullName", type = "String", field = "name" },
            { name = "salary", type = "f64", field = "" },
            { name = "note", type = "String" },
        ]

        [[indexes]]
        name = "Employee"
        [indexes.fields.name]
        index_type = "not_analyzed"
        ignore_case = true

        [[repositories]]
        name = "EmployeeRepository"
        entity = "Employee"

        [[repositories.methods]]
        name = "findAll"
        returns = "Vec<Employee>"
        order_by = { fields = [{ name = "salary", order = "desc" }] }

        [[repositories.methods]]
        name = "findNames"
        returns = "HashSet<String>"
        field = "name"

        [[repositories.methods]]
        name = "findSummaries"
        returns = "Vec<Summary>"
        search_result = {}

        [[search_queries]]
        name = "ByName"
        index = "Employee"
        properties = [{ name = "name", condition = { op = "eq" } }]
    "#;

    #[test]
    fn compiles_every_section() {
        let compiled = Manifest::from_toml_str(MANIFEST).expect("parse").compile().expect("compile");

        let employee = compiled.entity("Employee").expect("entity");
        assert_eq!(employee.table_name(), "EMPLOYEE");
        assert_eq!(compiled.schemas.len(), 3);

        let all = compiled.schema("EmployeeRepository", "findAll").expect("findAll");
        assert_eq!(all.collection(), Some(&CollectionStrategy::Vec));
        assert_eq!(all.result_fields().len(), 3);

        let names = compiled.schema("EmployeeRepository", "findNames").expect("findNames");
        assert_eq!(names.collection(), Some(&CollectionStrategy::HashSet));
        assert_eq!(names.result_fields()[0].property, None);

        let summaries = compiled.schema("EmployeeRepository", "findSummaries").expect("findSummaries");
        let bound: Vec<&str> = summaries.result_fields().iter().map(|f| f.entity_field.as_str()).collect();
        assert_eq!(bound, ["name", "salary"]);
    }

    #[test]
    fn builds_search_from_manifest() {
        let compiled = Manifest::from_toml_str(MANIFEST).expect("parse").compile().expect("compile");
        let clause = compiled.build_search("ByName", &json!({"name": "ADA"})).expect("search");
        assert_eq!(clause.to_value(), json!({"bool": {"must": [{"term": {"name": "ada"}}]}}));
        assert!(compiled.build_search("Missing", &json!({})).is_err());
    }

    #[test]
    fn unit_and_opaque_returns_fail_compilation() {
        for returns in ["()", "Opaque<Employee>", "Map<String, Employee>"] {
            let manifest = MANIFEST.replace("\"HashSet<String>\"", &format!("\"{returns}\""));
            let err = Manifest::from_toml_str(&manifest).expect("parse").compile().expect_err(returns);
            assert!(err.is_configuration(), "{returns}: {err}");
        }
    }

    #[test]
    fn unknown_repository_entity_is_mapping_error() {
        let manifest = MANIFEST.replace("entity = \"Employee\"", "entity = \"Manager\"");
        let err = Manifest::from_toml_str(&manifest).expect("parse").compile().expect_err("unknown entity");
        assert!(err.is_mapping());
    }

    #[test]
    fn optional_bean_return_keeps_bean_shape() {
        let manifest = MANIFEST.replace(
            "[[search_queries]]",
            "[[repositories.methods]]\nname = \"findSummary\"\nreturns = \"Option<Summary>\"\nsearch_result = {}\n\n[[search_queries]]",
        );
        let compiled = Manifest::from_toml_str(&manifest).expect("parse").compile().expect("compile");

        let summary = compiled.schema("EmployeeRepository", "findSummary").expect("findSummary");
        assert!(!summary.is_collection());
        let bound: Vec<(Option<&str>, &str)> = summary
            .result_fields()
            .iter()
            .map(|f| (f.property.as_deref(), f.entity_field.as_str()))
            .collect();
        assert_eq!(bound, [(Some("fullName"), "name"), (Some("salary"), "salary")]);
    }

    #[test]
    fn optional_value_return_stays_optional() {
        let resolver = TypeResolver {
            beans: HashMap::new(),
            opaque_containers: &[],
        };
        assert_eq!(
            resolver.declared_type("Option<i64>").expect("declared"),
            DeclaredType::Plain(TypeRef::Value(ValueType::optional(ValueType::Int64)))
        );
    }

    #[test]
    fn malformed_manifest_is_reported() {
        let err = Manifest::from_toml_str("[[entities]]\nname = 3").expect_err("bad toml");
        assert!(matches!(err, MetadataError::Manifest(_)));
    }

    #[test]
    fn splits_generics_at_top_level() {
        assert_eq!(split_generic("Vec<Employee>"), Some(("Vec", vec!["Employee"])));
        assert_eq!(
            split_generic("Map<String, Vec<i32>>"),
            Some(("Map", vec!["String", "Vec<i32>"]))
        );
        assert_eq!(split_generic("Vec<>"), Some(("Vec", vec![])));
        assert_eq!(split_generic("Employee"), None);
    }
}
