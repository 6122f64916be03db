use std::sync::Arc;

use declaro::search::{IndexDataType, IndexDetails, IndexFieldDetails, JoinOperator, SearchQueryRegistry};
use declaro::{MetadataError, SearchDescriptor};
use serde::Serialize;
use serde_json::json;

fn employee_index() -> IndexDetails {
    IndexDetails::new("Employee")
        .field("name", IndexFieldDetails::text())
        .field("summary", IndexFieldDetails::text())
        .field("dept", IndexFieldDetails::keyword().ignore_case())
        .field("age", IndexFieldDetails::of(IndexDataType::Integer))
        .field("email", IndexFieldDetails::keyword())
        .field("city", IndexFieldDetails::keyword())
        .field("country", IndexFieldDetails::keyword())
        .field("skills", IndexFieldDetails::keyword().ignore_case())
}

#[derive(Serialize, SearchDescriptor, Default)]
struct LocationQuery {
    #[declaro(condition)]
    city: Option<String>,
    #[declaro(condition(join = "not"))]
    country: Option<String>,
}

#[derive(Serialize, SearchDescriptor, Default)]
#[declaro(index = "Employee", not_null_field(field = "email"))]
struct EmployeeQuery {
    #[declaro(condition(op = "and", boost = 2))]
    name: Option<String>,
    #[declaro(condition(field = "dept"))]
    department: Option<String>,
    #[declaro(condition(field = "age", op = "gte", join = "or"))]
    min_age: Option<i32>,
    #[declaro(subquery(join = "or"))]
    location: Option<LocationQuery>,
    untracked: Option<String>,
}

#[derive(Serialize, SearchDescriptor, Default)]
#[declaro(index = "Employee", ignore_score, null_field(field = "email", join = "not"))]
struct SkillQuery {
    #[declaro(condition)]
    skills: Vec<String>,
    #[declaro(condition(field = "summary", op = "or", min_match = "75%"))]
    about: Option<String>,
}

#[derive(Serialize, SearchDescriptor)]
#[declaro(index = "Employee")]
struct SummaryQuery {
    #[declaro(condition(field = "summary", op = "and", boost = 4, min_match = "3"))]
    words: Option<String>,
    #[declaro(subquery(join = "or"))]
    location: Option<LocationQuery>,
}

#[derive(Serialize, SearchDescriptor)]
#[declaro(index = "Employee")]
struct SalaryQuery {
    #[declaro(condition(field = "salary"))]
    pay: Option<f64>,
}

#[test]
fn derived_declaration_keeps_markers() {
    let declaration = EmployeeQuery::search_declaration();
    assert_eq!(declaration.name, "EmployeeQuery");
    assert_eq!(declaration.index_type.as_deref(), Some("Employee"));
    assert_eq!(declaration.not_null_fields.len(), 1);

    let names: Vec<&str> = declaration.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["name", "department", "min_age", "location"]);

    let location = declaration.properties[3].subquery.as_ref().expect("sub-query");
    assert_eq!(location.join_operator, JoinOperator::Or);
    assert_eq!(location.declaration.name, "LocationQuery");
}

#[test]
fn builds_request_body_with_nested_subquery() {
    let query = EmployeeQuery {
        name: Some("Ada Lovelace".into()),
        department: Some("R&D".into()),
        min_age: Some(30),
        location: Some(LocationQuery {
            city: Some("Paris".into()),
            country: None,
        }),
        untracked: Some("ignored".into()),
    };

    let clause = query.build_query(&employee_index()).expect("query builds");
    assert_eq!(
        clause.to_request_body(),
        json!({"query": {"bool": {
            "must": [
                {"exists": {"field": "email"}},
                {"match": {"name": {"query": "Ada Lovelace", "operator": "and", "boost": 2}}},
                {"term": {"dept": "r&d"}}
            ],
            "should": [
                {"range": {"age": {"gte": 30}}},
                {"bool": {"must": [{"term": {"city": "Paris"}}]}}
            ]
        }}})
    );
}

#[test]
fn empty_instance_keeps_only_null_checks() {
    let clause = EmployeeQuery::default().build_query(&employee_index()).expect("query builds");
    assert_eq!(clause.to_value(), json!({"bool": {"must": [{"exists": {"field": "email"}}]}}));
}

#[test]
fn ignore_score_wraps_in_constant_score() {
    let query = SkillQuery {
        skills: vec!["Rust".into(), "SQL".into()],
        about: Some("compilers and databases".into()),
    };

    let clause = query.build_query(&employee_index()).expect("query builds");
    assert_eq!(
        clause.to_value(),
        json!({"constant_score": {"filter": {"bool": {
            "must": [
                {"terms": {"skills": ["rust", "sql"]}},
                {"match": {"summary": {"query": "compilers and databases", "minimum_should_match": "75%"}}}
            ],
            "must_not": [{"missing": {"field": "email"}}]
        }}}})
    );
}

#[test]
fn match_leaf_combines_every_option() {
    let query = SummaryQuery {
        words: Some("distributed storage engines".into()),
        location: None,
    };

    let clause = query.build_query(&employee_index()).expect("query builds");
    assert_eq!(
        clause.to_value(),
        json!({"bool": {"must": [{"match": {"summary": {
            "query": "distributed storage engines",
            "operator": "and",
            "minimum_should_match": "3",
            "boost": 4
        }}}]}})
    );
}

#[test]
fn unknown_index_field_fails_even_without_value() {
    let err = SalaryQuery { pay: None }
        .build_query(&employee_index())
        .expect_err("salary is not indexed");
    assert!(err.is_state());
    assert!(
        err.to_string()
            .contains("invalid index field name 'salary' specified in search query property - pay")
    );
}

#[test]
fn descriptor_without_index_is_invalid_argument() {
    let err = LocationQuery::default()
        .build_query(&employee_index())
        .expect_err("nested-only descriptor");
    assert!(matches!(err, MetadataError::InvalidArgument { .. }));
}

#[test]
fn compiled_descriptor_is_cached_per_type() {
    let registry = SearchQueryRegistry::global();
    let first = registry.compiled::<EmployeeQuery>().expect("compiles");
    let second = registry.compiled::<EmployeeQuery>().expect("cached");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.index_type(), "Employee");
    assert!(!first.ignore_score());

    let fresh = SearchQueryRegistry::new().compiled::<EmployeeQuery>().expect("compiles");
    assert!(!Arc::ptr_eq(&first, &fresh));
    assert_eq!(*first, *fresh);
}
