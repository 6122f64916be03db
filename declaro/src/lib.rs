//! Declaro core library.
//!
//! Compiles static declarations into the metadata a persistence layer runs on: relational
//! entity metadata, query-method return shapes, and boolean clause trees for a document-search
//! backend. Declarations come from `#[derive(Entity)]` / `#[derive(SearchDescriptor)]` or from
//! TOML manifests; everything is compiled once and shared behind `Arc`.

extern crate self as declaro;

pub mod entity;
pub mod errors;
pub mod manifest;
pub mod query;
pub mod registry;
pub mod search;
pub mod types;

pub use entity::{EntityDeclaration, EntityDetails, EntityDetailsBuilder, EntityMetadata, FieldDeclaration};
pub use errors::*;
pub use manifest::{CompiledManifest, Manifest};
pub use query::{QuerySchema, QuerySchemaCache, ReturnShapeResolver};
pub use registry::{EntityRegistration, EntityRegistry, OnceCache};
pub use search::{CompiledSearchQuery, IndexDetails, QueryClause, SearchDescriptor, SearchQueryRegistry};
pub use types::{FieldDetails, ValueType};

pub use declaro_macros::{Entity, SearchDescriptor};

// Re-export inventory for auto-registration in the entity derive macro
pub use inventory;
