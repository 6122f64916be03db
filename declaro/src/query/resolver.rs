use std::sync::Arc;

use log::{debug, trace};

use super::schema::{CollectionStrategy, OrderByField, QuerySchema, ResultField};
use super::{
    Container, DeclaredType, OrderByMarker, QueryMethod, RepositoryDeclaration, SearchResultMarker, SortOrder,
    TypeRef,
};
use crate::entity::EntityDetails;
use crate::errors::{MetadataError, MetadataResult};
use crate::registry::OnceCache;
use crate::types::ValueType;

/// Accumulates bindings for one method, validating each against the entity.
struct SchemaBuilder<'a> {
    entity: &'a EntityDetails,
    method: String,
    result_fields: Vec<ResultField>,
    order_by: Vec<OrderByField>,
}

impl<'a> SchemaBuilder<'a> {
    fn new(entity: &'a EntityDetails, method: String) -> Self {
        Self {
            entity,
            method,
            result_fields: Vec::new(),
            order_by: Vec::new(),
        }
    }

    fn add_result_field(
        &mut self,
        property: Option<&str>,
        property_type: ValueType,
        entity_field: &str,
    ) -> MetadataResult<()> {
        let (root, nested) = match entity_field.split_once('.') {
            Some((root, _)) => (root, true),
            None => (entity_field, false),
        };

        let field = self.entity.field(root).ok_or_else(|| {
            MetadataError::mapping(format!(
                "invalid entity field '{}' used as result field of finder method - {}",
                entity_field, self.method
            ))
        })?;

        if !nested && !property_type.is_assignable_from(field.value_type()) {
            return Err(MetadataError::mapping(format!(
                "result property '{}' of type {} cannot hold entity field '{}' of type {} in finder method - {}",
                property.unwrap_or("<return>"),
                property_type,
                entity_field,
                field.value_type(),
                self.method
            )));
        }

        self.result_fields.push(ResultField {
            property: property.map(str::to_string),
            property_type,
            entity_field: entity_field.to_string(),
        });
        Ok(())
    }

    fn add_order_by(&mut self, field: &str, order: SortOrder) -> MetadataResult<()> {
        if !self.entity.has_field(field) {
            return Err(MetadataError::mapping(format!(
                "invalid field '{}' specified in order-by marker of finder method - {}",
                field, self.method
            )));
        }
        self.order_by.push(OrderByField {
            field: field.to_string(),
            order,
        });
        Ok(())
    }
}

/// Resolves query methods of repositories bound to one entity.
pub struct ReturnShapeResolver<'a> {
    entity: &'a EntityDetails,
    repository: Option<&'a RepositoryDeclaration>,
}

impl<'a> ReturnShapeResolver<'a> {
    pub fn new(entity: &'a EntityDetails) -> Self {
        Self {
            entity,
            repository: None,
        }
    }

    /// Methods inherit result-mapping and ordering markers from `repository`.
    pub fn with_repository(mut self, repository: &'a RepositoryDeclaration) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn resolve(&self, method: &QueryMethod) -> MetadataResult<QuerySchema> {
        let description = method.description();
        trace!("resolving return shape of {description}");

        let mut builder = SchemaBuilder::new(self.entity, description);
        let (element, collection) = self.unwrap_return_type(method)?;
        let return_type = self.fetch_result_fields(method, element, &mut builder)?;
        self.fetch_order_details(method, &mut builder)?;
        let extended_field_param = self.extended_field_param(method, &return_type)?;

        debug!(
            "resolved {} -> {} ({} result fields, {} order fields)",
            builder.method,
            return_type,
            builder.result_fields.len(),
            builder.order_by.len()
        );

        Ok(QuerySchema {
            method: builder.method,
            return_type,
            collection,
            result_fields: builder.result_fields,
            order_by: builder.order_by,
            extended_field_param,
        })
    }

    fn unwrap_return_type(&self, method: &QueryMethod) -> MetadataResult<(TypeRef, Option<CollectionStrategy>)> {
        match &method.return_type {
            DeclaredType::Unit => Err(MetadataError::configuration(format!(
                "found unit-returning finder method '{}' in repository: {}",
                method.name, method.repository
            ))),
            DeclaredType::Plain(type_ref) => Ok((type_ref.clone(), None)),
            DeclaredType::Collection { container, type_args } => {
                let strategy = match container {
                    Container::List => CollectionStrategy::Vec,
                    Container::Set => CollectionStrategy::HashSet,
                    Container::Custom {
                        name,
                        default_constructible: true,
                    } => CollectionStrategy::Custom(name.clone()),
                    Container::Custom { name, .. } => {
                        return Err(MetadataError::configuration(format!(
                            "unsupported collection return type {} found on finder '{}' of repository: {}",
                            name, method.name, method.repository
                        )));
                    }
                };

                match type_args.as_slice() {
                    [element] => Ok((element.clone(), Some(strategy))),
                    _ => Err(MetadataError::configuration(format!(
                        "collection return type with {} type arguments found on finder '{}' of repository: {}",
                        type_args.len(),
                        method.name,
                        method.repository
                    ))),
                }
            }
        }
    }

    fn search_result<'m>(&'m self, method: &'m QueryMethod) -> Option<&'m SearchResultMarker> {
        method
            .search_result
            .as_ref()
            .or_else(|| self.repository.and_then(|repository| repository.search_result.as_ref()))
    }

    fn order_by_marker<'m>(&'m self, method: &'m QueryMethod) -> Option<&'m OrderByMarker> {
        method
            .order_by
            .as_ref()
            .or_else(|| self.repository.and_then(|repository| repository.order_by.as_ref()))
    }

    /// Binds result fields and returns the resolved element type.
    fn fetch_result_fields(
        &self,
        method: &QueryMethod,
        element: TypeRef,
        builder: &mut SchemaBuilder<'_>,
    ) -> MetadataResult<TypeRef> {
        // entity projection takes priority over every other marker
        if element.name() == self.entity.entity_type() || method.crud_contract {
            for field in self.entity.table_owned_fields() {
                builder.add_result_field(Some(field.name()), field.value_type().clone(), field.name())?;
            }
            return Ok(TypeRef::entity(self.entity.entity_type()));
        }

        if let Some(field) = &method.field {
            builder.add_result_field(None, element.value_type(), field)?;
            return Ok(element);
        }

        if let Some(marker) = self.search_result(method) {
            if marker.mappings.is_empty() {
                let bean = element.as_bean().ok_or_else(|| {
                    MetadataError::mapping(format!(
                        "result-mapping marker on {} requires a bean return type, found {}",
                        builder.method, element
                    ))
                })?;
                for property in &bean.properties {
                    if let Some(field) = property.selected_field() {
                        builder.add_result_field(Some(&property.name), property.value_type.clone(), field)?;
                    }
                }
            } else {
                self.bind_explicit_mappings(marker, &element, builder).map_err(|err| {
                    MetadataError::mapping_caused_by(
                        format!("an error occurred while parsing result mappings of {}", builder.method),
                        err,
                    )
                })?;
            }
            return Ok(element);
        }

        Err(MetadataError::unsupported(format!(
            "failed to determine return details of finder method: {}",
            builder.method
        )))
    }

    fn bind_explicit_mappings(
        &self,
        marker: &SearchResultMarker,
        element: &TypeRef,
        builder: &mut SchemaBuilder<'_>,
    ) -> MetadataResult<()> {
        let bean = element.as_bean().ok_or_else(|| {
            MetadataError::state(format!("return type {element} has no properties to map"))
        })?;
        if !bean.constructible {
            return Err(MetadataError::state(format!(
                "failed to create sample instance of result bean {}",
                bean.name
            )));
        }

        for mapping in &marker.mappings {
            let property = bean.find_property(&mapping.property).ok_or_else(|| {
                MetadataError::state(format!(
                    "unknown property '{}' on result bean {}",
                    mapping.property, bean.name
                ))
            })?;
            builder.add_result_field(Some(&property.name), property.value_type.clone(), &mapping.entity_field)?;
        }
        Ok(())
    }

    fn fetch_order_details(&self, method: &QueryMethod, builder: &mut SchemaBuilder<'_>) -> MetadataResult<()> {
        let Some(marker) = self.order_by_marker(method) else {
            return Ok(());
        };

        if !marker.fields.is_empty() {
            for field in &marker.fields {
                builder.add_order_by(&field.name, field.order)?;
            }
        } else {
            for name in &marker.names {
                builder.add_order_by(name, SortOrder::Asc)?;
            }
        }
        Ok(())
    }

    /// Index of the parameter supplying extension field names, if this method can use one.
    fn extended_field_param(&self, method: &QueryMethod, return_type: &TypeRef) -> MetadataResult<Option<usize>> {
        if self.entity.extended_table().is_none() {
            return Ok(None);
        }
        if return_type.name() != self.entity.entity_type() && !return_type.is_dynamic_result() {
            return Ok(None);
        }

        let description = method.description();
        for (idx, param) in method.params.iter().enumerate() {
            if !param.extended_field_names {
                continue;
            }

            let DeclaredType::Collection { type_args, .. } = &param.declared_type else {
                return Err(MetadataError::configuration(format!(
                    "non collection param at index {idx} is declared as extended-field-names - {description}"
                )));
            };

            return match type_args.as_slice() {
                [TypeRef::Value(ValueType::Text)] => Ok(Some(idx)),
                _ => Err(MetadataError::configuration(format!(
                    "non String collection param at index {idx} is declared as extended-field-names - {description}"
                ))),
            };
        }
        Ok(None)
    }
}

/// Memoised schemas keyed by (repository, method).
#[derive(Default)]
pub struct QuerySchemaCache {
    schemas: OnceCache<(String, String), QuerySchema>,
}

impl QuerySchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(&self, resolver: &ReturnShapeResolver<'_>, method: &QueryMethod) -> MetadataResult<Arc<QuerySchema>> {
        self.schemas
            .get_or_try_init((method.repository.clone(), method.name.clone()), || resolver.resolve(method))
    }

    pub fn get(&self, repository: &str, method: &str) -> Option<Arc<QuerySchema>> {
        self.schemas.get(&(repository.to_string(), method.to_string()))
    }

    /// Resolves every method of `repository`, stopping at the first failure.
    pub fn resolve_repository(
        &self,
        entity: &EntityDetails,
        repository: &RepositoryDeclaration,
    ) -> MetadataResult<Vec<Arc<QuerySchema>>> {
        if entity.entity_type() != repository.entity {
            return Err(MetadataError::invalid_argument(format!(
                "repository {} manages {}, not {}",
                repository.name,
                repository.entity,
                entity.entity_type()
            )));
        }

        let resolver = ReturnShapeResolver::new(entity).with_repository(repository);
        repository
            .methods
            .iter()
            .map(|method| self.schema(&resolver, method))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityDeclaration, FieldDeclaration, RelationDeclaration};
    use crate::query::{BeanProperty, BeanShape, MethodParam};
    use crate::types::RelationKind;

    fn employee(extension_table: bool) -> EntityDetails {
        let mut declaration = EntityDeclaration::new("Employee")
            .field(FieldDeclaration::new("id", ValueType::Int64).id())
            .field(FieldDeclaration::new("name", ValueType::Text))
            .field(FieldDeclaration::new("salary", ValueType::optional(ValueType::Float64)))
            .field(
                FieldDeclaration::new("department", ValueType::named("Department"))
                    .relation(RelationDeclaration::new("Department", RelationKind::ManyToOne)),
            )
            .field(
                FieldDeclaration::new("projects", ValueType::list(ValueType::named("Project")))
                    .relation(RelationDeclaration::new("Project", RelationKind::ManyToMany).join_table("EMP_PROJECT")),
            )
            .field(
                FieldDeclaration::new("reports", ValueType::list(ValueType::named("Employee"))).relation(
                    RelationDeclaration::new("Employee", RelationKind::OneToMany).mapped_by("manager"),
                ),
            );
        if extension_table {
            declaration = declaration.extension_table("EMPLOYEE_EXT");
        }
        EntityDetails::from_declaration(&declaration).expect("entity")
    }

    fn method(return_type: DeclaredType) -> QueryMethod {
        QueryMethod::new("EmployeeRepository", "find", return_type)
    }

    fn summary_bean() -> BeanShape {
        BeanShape::new("EmployeeSummary")
            .property(BeanProperty::new("fullName", ValueType::Text).selects("name"))
            .property(BeanProperty::new("salary", ValueType::Float64).selected())
            .property(BeanProperty::new("note", ValueType::Text))
    }

    #[test]
    fn unit_return_is_rejected() {
        let entity = employee(false);
        let err = ReturnShapeResolver::new(&entity)
            .resolve(&method(DeclaredType::Unit))
            .expect_err("unit");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("EmployeeRepository"));
    }

    #[test]
    fn entity_return_binds_table_owned_fields_in_order() {
        let entity = employee(false);
        let schema = ReturnShapeResolver::new(&entity)
            .resolve(&method(DeclaredType::plain(TypeRef::entity("Employee"))))
            .expect("schema");

        let bound: Vec<&str> = schema.result_fields().iter().map(|f| f.entity_field.as_str()).collect();
        assert_eq!(bound, ["id", "name", "salary", "department"]);
        assert!(schema.result_fields().iter().all(|f| f.property.as_deref() == Some(f.entity_field.as_str())));
        assert!(schema.collection().is_none());
    }

    #[test]
    fn collection_returns_pick_a_strategy() {
        let entity = employee(false);
        let resolver = ReturnShapeResolver::new(&entity);

        let list = resolver.resolve(&method(DeclaredType::list_of(TypeRef::entity("Employee")))).expect("list");
        assert_eq!(list.collection(), Some(&CollectionStrategy::Vec));
        assert_eq!(list.return_type().name(), "Employee");

        let set = resolver.resolve(&method(DeclaredType::set_of(TypeRef::entity("Employee")))).expect("set");
        assert_eq!(set.collection(), Some(&CollectionStrategy::HashSet));

        let custom = resolver
            .resolve(&method(DeclaredType::Collection {
                container: Container::Custom {
                    name: "SortedBag".into(),
                    default_constructible: true,
                },
                type_args: vec![TypeRef::entity("Employee")],
            }))
            .expect("custom");
        assert_eq!(custom.collection(), Some(&CollectionStrategy::Custom("SortedBag".into())));

        let err = resolver
            .resolve(&method(DeclaredType::Collection {
                container: Container::Custom {
                    name: "Opaque".into(),
                    default_constructible: false,
                },
                type_args: vec![TypeRef::entity("Employee")],
            }))
            .expect_err("not constructible");
        assert!(err.is_configuration());
    }

    #[test]
    fn raw_collections_are_rejected() {
        let entity = employee(false);
        let resolver = ReturnShapeResolver::new(&entity);
        for type_args in [vec![], vec![TypeRef::entity("Employee"), TypeRef::entity("Employee")]] {
            let err = resolver
                .resolve(&method(DeclaredType::Collection {
                    container: Container::List,
                    type_args,
                }))
                .expect_err("arity");
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn crud_contract_methods_project_the_entity() {
        let entity = employee(false);
        let schema = ReturnShapeResolver::new(&entity)
            .resolve(&method(DeclaredType::plain(ValueType::Json)).crud_contract())
            .expect("crud");
        assert_eq!(schema.return_type().name(), "Employee");
        assert_eq!(schema.result_fields().len(), 4);
    }

    #[test]
    fn field_marker_projects_a_scalar() {
        let entity = employee(false);
        let schema = ReturnShapeResolver::new(&entity)
            .resolve(&method(DeclaredType::list_of(ValueType::Text)).field("name"))
            .expect("scalar");
        assert_eq!(
            schema.result_fields(),
            [ResultField {
                property: None,
                property_type: ValueType::Text,
                entity_field: "name".into(),
            }]
        );

        let err = ReturnShapeResolver::new(&entity)
            .resolve(&method(DeclaredType::plain(ValueType::Int32)).field("name"))
            .expect_err("type mismatch");
        assert!(err.is_mapping());
    }

    #[test]
    fn bean_markers_bind_selected_properties() {
        let entity = employee(false);
        let schema = ReturnShapeResolver::new(&entity)
            .resolve(
                &method(DeclaredType::list_of(TypeRef::bean(summary_bean())))
                    .search_result(SearchResultMarker::default()),
            )
            .expect("bean");

        let bound: Vec<(Option<&str>, &str)> = schema
            .result_fields()
            .iter()
            .map(|f| (f.property.as_deref(), f.entity_field.as_str()))
            .collect();
        assert_eq!(bound, [(Some("fullName"), "name"), (Some("salary"), "salary")]);
    }

    #[test]
    fn explicit_mappings_resolve_against_the_bean() {
        let entity = employee(false);
        let resolver = ReturnShapeResolver::new(&entity);
        let bean = TypeRef::bean(summary_bean());

        let schema = resolver
            .resolve(
                &method(DeclaredType::plain(bean.clone()))
                    .search_result(SearchResultMarker::default().mapping("note", "name")),
            )
            .expect("explicit");
        assert_eq!(schema.result_fields()[0].property.as_deref(), Some("note"));

        let err = resolver
            .resolve(
                &method(DeclaredType::plain(bean))
                    .search_result(SearchResultMarker::default().mapping("missing", "name")),
            )
            .expect_err("unknown property");
        assert!(err.is_mapping());
        assert!(err.to_string().contains("EmployeeRepository.find"));

        let sealed = TypeRef::bean(summary_bean().not_constructible());
        let err = resolver
            .resolve(
                &method(DeclaredType::plain(sealed)).search_result(SearchResultMarker::default().mapping("note", "name")),
            )
            .expect_err("not constructible");
        assert!(err.is_mapping());
    }

    #[test]
    fn repository_markers_are_inherited() {
        let entity = employee(false);
        let mut repository = RepositoryDeclaration::new("EmployeeRepository", "Employee");
        repository.search_result = Some(SearchResultMarker::default());
        repository.order_by = Some(OrderByMarker::ascending(["name"]));

        let schema = ReturnShapeResolver::new(&entity)
            .with_repository(&repository)
            .resolve(&method(DeclaredType::list_of(TypeRef::bean(summary_bean()))))
            .expect("inherited");
        assert_eq!(schema.result_fields().len(), 2);
        assert_eq!(schema.order_by()[0].field, "name");
    }

    #[test]
    fn unmarked_non_entity_returns_are_unsupported() {
        let entity = employee(false);
        let err = ReturnShapeResolver::new(&entity)
            .resolve(&method(DeclaredType::plain(TypeRef::bean(summary_bean()))))
            .expect_err("unsupported");
        assert!(err.is_unsupported());
        assert!(err.to_string().contains("EmployeeRepository.find"));
    }

    #[test]
    fn ordering_follows_marker_shape() {
        let entity = employee(false);
        let resolver = ReturnShapeResolver::new(&entity);
        let base = method(DeclaredType::list_of(TypeRef::entity("Employee")));

        let explicit = resolver
            .resolve(
                &base
                    .clone()
                    .order_by(OrderByMarker::ascending(["id"]).field("salary", SortOrder::Desc).field("name", SortOrder::Asc)),
            )
            .expect("explicit order");
        let order: Vec<(&str, SortOrder)> = explicit.order_by().iter().map(|o| (o.field.as_str(), o.order)).collect();
        assert_eq!(order, [("salary", SortOrder::Desc), ("name", SortOrder::Asc)]);

        let bare = resolver
            .resolve(&base.clone().order_by(OrderByMarker::ascending(["name", "id"])))
            .expect("bare order");
        assert!(bare.order_by().iter().all(|o| o.order == SortOrder::Asc));
        assert_eq!(bare.order_by().len(), 2);

        let err = resolver
            .resolve(&base.clone().order_by(OrderByMarker::ascending(["age"])))
            .expect_err("unknown order field");
        assert!(err.is_mapping());
        assert!(err.to_string().contains("age"));

        assert!(resolver.resolve(&base).expect("none").order_by().is_empty());
    }

    #[test]
    fn extended_field_param_requires_extension_table() {
        let names = MethodParam::new("fields", DeclaredType::list_of(ValueType::Text)).extended_field_names();
        let find = method(DeclaredType::list_of(TypeRef::entity("Employee")))
            .param(MethodParam::new("name", DeclaredType::plain(ValueType::Text)))
            .param(names);

        let plain = employee(false);
        assert_eq!(ReturnShapeResolver::new(&plain).resolve(&find).expect("schema").extended_field_param(), None);

        let extended = employee(true);
        assert_eq!(
            ReturnShapeResolver::new(&extended).resolve(&find).expect("schema").extended_field_param(),
            Some(1)
        );
    }

    #[test]
    fn extended_field_param_type_is_checked() {
        let entity = employee(true);
        let resolver = ReturnShapeResolver::new(&entity);
        let base = method(DeclaredType::list_of(TypeRef::entity("Employee")));

        let scalar = base
            .clone()
            .param(MethodParam::new("fields", DeclaredType::plain(ValueType::Text)).extended_field_names());
        assert!(resolver.resolve(&scalar).expect_err("scalar").is_configuration());

        let numbers = base
            .clone()
            .param(MethodParam::new("fields", DeclaredType::list_of(ValueType::Int32)).extended_field_names());
        assert!(resolver.resolve(&numbers).expect_err("numbers").is_configuration());

        assert_eq!(resolver.resolve(&base).expect("unmarked").extended_field_param(), None);
    }

    #[test]
    fn extended_field_param_ignored_for_plain_beans() {
        let entity = employee(true);
        let find = method(DeclaredType::list_of(TypeRef::bean(summary_bean())))
            .search_result(SearchResultMarker::default())
            .param(MethodParam::new("fields", DeclaredType::plain(ValueType::Text)).extended_field_names());
        assert_eq!(ReturnShapeResolver::new(&entity).resolve(&find).expect("schema").extended_field_param(), None);

        let dynamic = method(DeclaredType::list_of(TypeRef::bean(summary_bean().dynamic_result())))
            .search_result(SearchResultMarker::default())
            .param(MethodParam::new("fields", DeclaredType::set_of(ValueType::Text)).extended_field_names());
        assert_eq!(
            ReturnShapeResolver::new(&entity).resolve(&dynamic).expect("schema").extended_field_param(),
            Some(0)
        );
    }

    #[test]
    fn cache_resolves_once_per_method() {
        let entity = employee(false);
        let cache = QuerySchemaCache::new();
        let resolver = ReturnShapeResolver::new(&entity);
        let find = method(DeclaredType::plain(TypeRef::entity("Employee")));

        let first = cache.schema(&resolver, &find).expect("first");
        let second = cache.schema(&resolver, &find).expect("second");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.get("EmployeeRepository", "find").is_some());
    }
}
