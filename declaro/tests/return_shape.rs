use declaro::query::{
    BeanProperty, BeanShape, CollectionStrategy, DeclaredType, MethodParam, OrderByMarker, QueryMethod,
    RepositoryDeclaration, SearchResultMarker, SortOrder, TypeRef,
};
use declaro::types::ValueType;
use declaro::{Entity, EntityRegistry, MetadataError, QuerySchemaCache};

#[derive(Entity)]
#[declaro(table = "PRODUCT", extension_table = "PRODUCT_EXT")]
#[allow(dead_code)]
struct Product {
    #[declaro(id)]
    id: i64,
    sku: String,
    title: String,
    price: Option<f64>,
    #[declaro(relation(kind = "many_to_many", join_table = "PRODUCT_TAG"))]
    tags: Vec<Tag>,
}

#[derive(Entity)]
#[allow(dead_code)]
struct Tag {
    #[declaro(id)]
    id: i64,
}

fn listing_bean() -> BeanShape {
    BeanShape::new("ProductListing")
        .property(BeanProperty::new("sku", ValueType::Text).selected())
        .property(BeanProperty::new("headline", ValueType::Text).selects("title"))
        .property(BeanProperty::new("ranking", ValueType::Float64))
}

fn repository() -> RepositoryDeclaration {
    let mut repository = RepositoryDeclaration::new("ProductRepository", "Product");
    repository.order_by = Some(OrderByMarker::ascending(["sku"]));

    repository
        .method(QueryMethod::new(
            "ProductRepository",
            "findAll",
            DeclaredType::list_of(TypeRef::entity("Product")),
        ))
        .method(
            QueryMethod::new("ProductRepository", "findSkus", DeclaredType::set_of(ValueType::Text))
                .field("sku")
                .order_by(OrderByMarker::default().field("price", SortOrder::Desc)),
        )
        .method(
            QueryMethod::new(
                "ProductRepository",
                "findListings",
                DeclaredType::list_of(TypeRef::bean(listing_bean().dynamic_result())),
            )
            .search_result(SearchResultMarker::default())
            .param(MethodParam::new("query", DeclaredType::plain(ValueType::Text)))
            .param(MethodParam::new("extra", DeclaredType::list_of(ValueType::Text)).extended_field_names()),
        )
}

#[test]
fn repository_methods_resolve_against_derived_entity() {
    let entity = EntityRegistry::global().details::<Product>().expect("product compiles");
    let cache = QuerySchemaCache::new();
    let schemas = cache.resolve_repository(&entity, &repository()).expect("repository resolves");
    assert_eq!(schemas.len(), 3);

    let find_all = &schemas[0];
    assert_eq!(find_all.method(), "ProductRepository.findAll");
    assert_eq!(find_all.collection(), Some(&CollectionStrategy::Vec));
    let bound: Vec<&str> = find_all.result_fields().iter().map(|f| f.entity_field.as_str()).collect();
    assert_eq!(bound, ["id", "sku", "title", "price"]);
    assert_eq!(find_all.order_by()[0].field, "sku");
    assert_eq!(find_all.extended_field_param(), None);

    let skus = &schemas[1];
    assert_eq!(skus.collection(), Some(&CollectionStrategy::HashSet));
    assert_eq!(skus.result_fields()[0].property, None);
    assert_eq!(skus.order_by()[0].order, SortOrder::Desc);

    let listings = &schemas[2];
    let bound: Vec<(Option<&str>, &str)> = listings
        .result_fields()
        .iter()
        .map(|f| (f.property.as_deref(), f.entity_field.as_str()))
        .collect();
    assert_eq!(bound, [(Some("sku"), "sku"), (Some("headline"), "title")]);
    assert_eq!(listings.extended_field_param(), Some(1));

    let cached = cache.get("ProductRepository", "findListings").expect("cached");
    assert!(std::sync::Arc::ptr_eq(&cached, listings));
}

#[test]
fn repository_for_another_entity_is_rejected() {
    let tag = EntityRegistry::global().details::<Tag>().expect("tag compiles");
    let err = QuerySchemaCache::new()
        .resolve_repository(&tag, &repository())
        .expect_err("wrong entity");
    assert!(matches!(err, MetadataError::InvalidArgument { .. }));
}

#[test]
fn unresolvable_method_reports_its_name() {
    let entity = EntityRegistry::global().details::<Product>().expect("product compiles");
    let broken = RepositoryDeclaration::new("ProductRepository", "Product").method(
        QueryMethod::new("ProductRepository", "findByColour", DeclaredType::list_of(ValueType::Text)).field("colour"),
    );

    let err = QuerySchemaCache::new()
        .resolve_repository(&entity, &broken)
        .expect_err("unknown field");
    assert!(err.is_mapping());
    assert!(err.to_string().contains("colour"));
}
