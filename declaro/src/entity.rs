//! Entity declarations and the compiled [`EntityDetails`] they produce.
//!
//! A declaration is plain data, emitted by `#[derive(Entity)]` or read from a manifest. It is
//! compiled once into `EntityDetails`, which is immutable after [`EntityDetailsBuilder::build`].

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::errors::{MetadataError, MetadataResult};
use crate::types::{
    DataType, FieldDetails, FieldHandle, GenerationType, JoinTableDetails, RelationDescriptor, RelationKind,
    ValueType,
};

/// Implemented by `#[derive(Entity)]`.
pub trait EntityMetadata: 'static {
    fn entity_declaration() -> EntityDeclaration;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDeclaration {
    pub name: String,
    #[serde(default)]
    pub table: Option<String>,
    /// Secondary table holding dynamically named extension fields.
    #[serde(default)]
    pub extension_table: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
    /// Late column overrides applied once during registration, keyed by field name.
    #[serde(default)]
    pub column_overrides: BTreeMap<String, String>,
}

impl EntityDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            extension_table: None,
            fields: Vec::new(),
            column_overrides: BTreeMap::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn extension_table(mut self, table: impl Into<String>) -> Self {
        self.extension_table = Some(table.into());
        self
    }

    pub fn field(mut self, field: FieldDeclaration) -> Self {
        self.fields.push(field);
        self
    }

    pub fn column_override(mut self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.column_overrides.insert(field.into(), column.into());
        self
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub data_type: Option<DataType>,
    #[serde(default)]
    pub id: bool,
    #[serde(default)]
    pub generation: Option<GenerationType>,
    #[serde(default)]
    pub sequence: Option<String>,
    #[serde(default)]
    pub auto_fetch: bool,
    #[serde(default)]
    pub version: bool,
    /// Defaults to whether the value type is optional.
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default = "default_true")]
    pub updateable: bool,
    #[serde(default)]
    pub relation: Option<RelationDeclaration>,
}

impl FieldDeclaration {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            column: None,
            data_type: None,
            id: false,
            generation: None,
            sequence: None,
            auto_fetch: false,
            version: false,
            nullable: None,
            updateable: true,
            relation: None,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    pub fn generated(mut self, generation: GenerationType) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = Some(sequence.into());
        self
    }

    pub fn auto_fetch(mut self) -> Self {
        self.auto_fetch = true;
        self
    }

    pub fn version(mut self) -> Self {
        self.version = true;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn not_updateable(mut self) -> Self {
        self.updateable = false;
        self
    }

    pub fn relation(mut self, relation: RelationDeclaration) -> Self {
        self.relation = Some(relation);
        self
    }

    fn compile(&self, owner: &str) -> MetadataResult<FieldDetails> {
        let handle = FieldHandle::new(owner, self.name.clone());
        let column = self.column.clone().unwrap_or_else(|| self.name.clone());
        let data_type = self.data_type.unwrap_or_else(|| DataType::infer(&self.value_type));
        let nullable = self
            .nullable
            .unwrap_or_else(|| !self.id && matches!(self.value_type, ValueType::Optional(_)));

        let details = if self.id {
            if self.version {
                return Err(MetadataError::configuration(format!(
                    "field '{handle}' cannot be both the id field and the version field"
                )));
            }
            FieldDetails::id(
                handle,
                column,
                data_type,
                self.value_type.clone(),
                self.generation,
                self.auto_fetch,
                self.sequence.clone(),
                nullable,
            )?
        } else {
            FieldDetails::new(
                handle,
                column,
                data_type,
                self.value_type.clone(),
                self.version,
                nullable,
                self.updateable,
            )?
        };

        Ok(match &self.relation {
            Some(relation) => details.with_relation(relation.to_descriptor()),
            None => details,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDeclaration {
    pub target: String,
    #[serde(default)]
    pub kind: RelationKind,
    #[serde(default)]
    pub mapped_by: Option<String>,
    #[serde(default)]
    pub join_table: Option<JoinTableDetails>,
}

impl RelationDeclaration {
    pub fn new(target: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            target: target.into(),
            kind,
            mapped_by: None,
            join_table: None,
        }
    }

    pub fn mapped_by(mut self, field: impl Into<String>) -> Self {
        self.mapped_by = Some(field.into());
        self
    }

    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.join_table = Some(JoinTableDetails::new(table));
        self
    }

    fn to_descriptor(&self) -> RelationDescriptor {
        let descriptor = match &self.mapped_by {
            Some(field) => RelationDescriptor::mapped_by(self.target.clone(), self.kind, field.clone()),
            None => RelationDescriptor::owned(self.target.clone(), self.kind),
        };
        match &self.join_table {
            Some(join_table) => descriptor.with_join_table(join_table.clone()),
            None => descriptor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedTableDetails {
    pub table: String,
}

/// Compiled metadata for one entity type.
#[derive(Debug, Clone)]
pub struct EntityDetails {
    entity_type: String,
    table: String,
    fields: Vec<FieldDetails>,
    positions: HashMap<String, usize>,
    id_field: Option<usize>,
    version_field: Option<usize>,
    extended_table: Option<ExtendedTableDetails>,
}

impl EntityDetails {
    pub fn from_declaration(declaration: &EntityDeclaration) -> MetadataResult<Self> {
        let mut builder = EntityDetailsBuilder::from_declaration(declaration)?;
        for (field, column) in &declaration.column_overrides {
            builder.override_column(field, column.clone())?;
        }
        Ok(builder.build())
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDetails] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDetails> {
        self.positions.get(name).map(|&idx| &self.fields[idx])
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn id_field(&self) -> Option<&FieldDetails> {
        self.id_field.map(|idx| &self.fields[idx])
    }

    pub fn version_field(&self) -> Option<&FieldDetails> {
        self.version_field.map(|idx| &self.fields[idx])
    }

    pub fn extended_table(&self) -> Option<&ExtendedTableDetails> {
        self.extended_table.as_ref()
    }

    /// Fields whose column lives in this entity's table.
    pub fn table_owned_fields(&self) -> impl Iterator<Item = &FieldDetails> {
        self.fields.iter().filter(|field| field.is_table_owned())
    }
}

/// Registration-time view of an entity, before it is published to readers.
#[derive(Debug)]
pub struct EntityDetailsBuilder {
    details: EntityDetails,
    overridden: HashSet<String>,
}

impl EntityDetailsBuilder {
    pub fn from_declaration(declaration: &EntityDeclaration) -> MetadataResult<Self> {
        trace!("compiling entity declaration {}", declaration.name);

        let mut fields = Vec::with_capacity(declaration.fields.len());
        let mut positions = HashMap::with_capacity(declaration.fields.len());
        let mut id_field = None;
        let mut version_field = None;

        for (idx, field) in declaration.fields.iter().enumerate() {
            let details = field.compile(&declaration.name)?;

            if positions.insert(field.name.clone(), idx).is_some() {
                return Err(MetadataError::configuration(format!(
                    "field '{}' is declared more than once on entity {}",
                    field.name, declaration.name
                )));
            }
            if details.is_id_field() && id_field.replace(idx).is_some() {
                return Err(MetadataError::configuration(format!(
                    "entity {} declares more than one id field",
                    declaration.name
                )));
            }
            if details.is_version_field() && version_field.replace(idx).is_some() {
                return Err(MetadataError::configuration(format!(
                    "entity {} declares more than one version field",
                    declaration.name
                )));
            }
            fields.push(details);
        }

        let table = declaration.table.clone().unwrap_or_else(|| declaration.name.clone());
        let extended_table = declaration
            .extension_table
            .as_ref()
            .map(|table| ExtendedTableDetails { table: table.clone() });

        Ok(Self {
            details: EntityDetails {
                entity_type: declaration.name.clone(),
                table,
                fields,
                positions,
                id_field,
                version_field,
                extended_table,
            },
            overridden: HashSet::new(),
        })
    }

    /// Replaces the resolved column of `field`. Allowed once per field.
    pub fn override_column(&mut self, field: &str, column: impl Into<String>) -> MetadataResult<()> {
        let idx = *self.details.positions.get(field).ok_or_else(|| {
            MetadataError::mapping(format!(
                "column override names unknown field '{}' of entity {}",
                field, self.details.entity_type
            ))
        })?;

        if !self.overridden.insert(field.to_string()) {
            return Err(MetadataError::configuration(format!(
                "column of field '{}' on entity {} is already overridden",
                field, self.details.entity_type
            )));
        }

        self.details.fields[idx].set_overridden_column(column.into());
        Ok(())
    }

    pub fn build(self) -> EntityDetails {
        debug!(
            "registered entity {} ({} fields, table {})",
            self.details.entity_type,
            self.details.fields.len(),
            self.details.table
        );
        self.details
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee() -> EntityDeclaration {
        EntityDeclaration::new("Employee")
            .table("EMPLOYEE")
            .field(
                FieldDeclaration::new("id", ValueType::Int64)
                    .id()
                    .generated(GenerationType::Sequence)
                    .sequence("EMP_SEQ"),
            )
            .field(FieldDeclaration::new("name", ValueType::Text).column("EMP_NAME"))
            .field(FieldDeclaration::new("email", ValueType::optional(ValueType::Text)))
            .field(FieldDeclaration::new("version", ValueType::Int32).version())
            .field(
                FieldDeclaration::new("projects", ValueType::list(ValueType::named("Project")))
                    .relation(RelationDeclaration::new("Project", RelationKind::ManyToMany).join_table("EMP_PROJECT")),
            )
    }

    #[test]
    fn compiles_fields_in_declaration_order() {
        let details = EntityDetails::from_declaration(&employee()).expect("entity");
        let names: Vec<&str> = details.fields().iter().map(FieldDetails::name).collect();
        assert_eq!(names, ["id", "name", "email", "version", "projects"]);
        assert_eq!(details.table_name(), "EMPLOYEE");
        assert_eq!(details.id_field().map(FieldDetails::name), Some("id"));
        assert_eq!(details.version_field().map(FieldDetails::name), Some("version"));
        assert!(details.has_field("email"));
        assert!(!details.has_field("salary"));
    }

    #[test]
    fn nullable_defaults_follow_optional_types() {
        let details = EntityDetails::from_declaration(&employee()).expect("entity");
        assert!(details.field("email").is_some_and(FieldDetails::is_nullable));
        assert!(!details.field("name").is_some_and(FieldDetails::is_nullable));
        assert_eq!(details.field("name").map(FieldDetails::column), Some("EMP_NAME"));
    }

    #[test]
    fn column_override_applies_once() {
        let mut builder = EntityDetailsBuilder::from_declaration(&employee()).expect("builder");
        builder.override_column("name", "FULL_NAME").expect("first override");
        let err = builder.override_column("name", "OTHER").expect_err("second override");
        assert!(err.is_configuration());
        assert!(builder.override_column("salary", "SAL").expect_err("unknown").is_mapping());

        let details = builder.build();
        let name = details.field("name").expect("name");
        assert_eq!(name.column(), "EMP_NAME");
        assert_eq!(name.effective_column(), "FULL_NAME");
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let declaration = EntityDeclaration::new("Dup")
            .field(FieldDeclaration::new("a", ValueType::Text))
            .field(FieldDeclaration::new("a", ValueType::Text));
        assert!(EntityDetails::from_declaration(&declaration).expect_err("dup").is_configuration());
    }

    #[test]
    fn second_id_field_is_rejected() {
        let declaration = EntityDeclaration::new("TwoIds")
            .field(FieldDeclaration::new("a", ValueType::Int64).id())
            .field(FieldDeclaration::new("b", ValueType::Int64).id());
        let err = EntityDetails::from_declaration(&declaration).expect_err("two ids");
        assert!(err.to_string().contains("TwoIds"));
    }

    #[test]
    fn table_owned_fields_skip_joined_relations() {
        let details = EntityDetails::from_declaration(&employee()).expect("entity");
        let owned: Vec<&str> = details.table_owned_fields().map(FieldDetails::name).collect();
        assert_eq!(owned, ["id", "name", "email", "version"]);
    }
}
